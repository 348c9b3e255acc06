// ─────────────────────────────────────────────────────────────────────
// Integrity-OS — Dissonance Kernel Configuration
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};
use crate::score::InhibitionLevel;

/// Runtime configuration shared by the scorer and the inhibition policy.
///
/// Both components classify scores through [`KernelConfig::classify`], so
/// a single instance keeps their thresholds from drifting apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Score at or above which the generator should express uncertainty.
    /// Default: 0.30.
    pub uncertainty_threshold: f64,

    /// Score at or above which output is rephrased and generation stops.
    /// Default: 0.65.
    pub reframe_threshold: f64,

    /// Score at or above which generation is aborted outright.
    /// Default: 0.90.
    pub abort_threshold: f64,

    /// Weight of the semantic (graph grounding) axis. Default: 0.85.
    pub w_semantic: f64,

    /// Weight of the epistemic (knowledge boundary) axis. Default: 0.10.
    pub w_epistemic: f64,

    /// Weight of the self-consistency axis. Default: 0.05.
    pub w_self: f64,

    /// Maximum number of results retained in the scorer history buffer.
    pub history_capacity: usize,

    /// Number of entries in the recent-history samples of both
    /// statistics snapshots and the policy decision log.
    pub recent_window: usize,

    /// Seed for qualifier selection. `None` draws from OS entropy.
    pub qualifier_seed: Option<u64>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            uncertainty_threshold: 0.30,
            reframe_threshold: 0.65,
            abort_threshold: 0.90,
            w_semantic: 0.85,
            w_epistemic: 0.10,
            w_self: 0.05,
            history_capacity: 1000,
            recent_window: 10,
            qualifier_seed: None,
        }
    }
}

impl KernelConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> KernelResult<()> {
        for (name, value) in [
            ("uncertainty_threshold", self.uncertainty_threshold),
            ("reframe_threshold", self.reframe_threshold),
            ("abort_threshold", self.abort_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(KernelError::Config(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if !(self.uncertainty_threshold < self.reframe_threshold
            && self.reframe_threshold < self.abort_threshold)
        {
            return Err(KernelError::Config(format!(
                "thresholds must be strictly increasing, got {} / {} / {}",
                self.uncertainty_threshold, self.reframe_threshold, self.abort_threshold
            )));
        }
        for (name, value) in [
            ("w_semantic", self.w_semantic),
            ("w_epistemic", self.w_epistemic),
            ("w_self", self.w_self),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(KernelError::Config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        let total = self.w_semantic + self.w_epistemic + self.w_self;
        if (total - 1.0).abs() > 1e-9 {
            return Err(KernelError::Config(format!(
                "w_semantic + w_epistemic + w_self must equal 1.0, got {} + {} + {} = {total}",
                self.w_semantic, self.w_epistemic, self.w_self
            )));
        }
        if self.history_capacity == 0 {
            return Err(KernelError::Config(
                "history_capacity must be >= 1".to_string(),
            ));
        }
        if self.recent_window == 0 {
            return Err(KernelError::Config(
                "recent_window must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load from JSON string. Missing fields take their defaults.
    pub fn from_json(json: &str) -> KernelResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| KernelError::Config(format!("JSON parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Map a dissonance score onto an inhibition level.
    pub fn classify(&self, score: f64) -> InhibitionLevel {
        if score >= self.abort_threshold {
            InhibitionLevel::Abort
        } else if score >= self.reframe_threshold {
            InhibitionLevel::Reframe
        } else if score >= self.uncertainty_threshold {
            InhibitionLevel::Uncertainty
        } else {
            InhibitionLevel::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(KernelConfig::default().validate().is_ok());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let config = KernelConfig {
            w_semantic: 0.5,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must equal 1.0"));
    }

    #[test]
    fn test_thresholds_must_increase() {
        let config = KernelConfig {
            reframe_threshold: 0.95,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let equal = KernelConfig {
            uncertainty_threshold: 0.65,
            ..Default::default()
        };
        assert!(equal.validate().is_err());
    }

    #[test]
    fn test_threshold_out_of_range() {
        let config = KernelConfig {
            abort_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_windows_rejected() {
        let config = KernelConfig {
            recent_window: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = KernelConfig {
            history_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_classify_boundaries() {
        let config = KernelConfig::default();
        assert_eq!(config.classify(0.0), InhibitionLevel::None);
        assert_eq!(config.classify(0.2999), InhibitionLevel::None);
        assert_eq!(config.classify(0.30), InhibitionLevel::Uncertainty);
        assert_eq!(config.classify(0.6499), InhibitionLevel::Uncertainty);
        assert_eq!(config.classify(0.65), InhibitionLevel::Reframe);
        assert_eq!(config.classify(0.8999), InhibitionLevel::Reframe);
        assert_eq!(config.classify(0.90), InhibitionLevel::Abort);
        assert_eq!(config.classify(1.0), InhibitionLevel::Abort);
    }

    #[test]
    fn test_from_json_partial() {
        let config = KernelConfig::from_json(r#"{"qualifier_seed": 7}"#).unwrap();
        assert_eq!(config.qualifier_seed, Some(7));
        assert!((config.w_semantic - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(KernelConfig::from_json(r#"{"w_self": 0.5}"#).is_err());
        assert!(KernelConfig::from_json("not json").is_err());
    }
}
