// ─────────────────────────────────────────────────────────────────────
// Integrity-OS — Observability Snapshots
// ─────────────────────────────────────────────────────────────────────
//! Statistics snapshots exposed by the scorer and the policy.
//!
//! These are plain copies taken under the owner's lock; holding one never
//! blocks scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::score::{Action, InhibitionLevel};

/// One entry in the scorer's recent-history sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub candidate: String,
    pub score: f64,
    pub level: InhibitionLevel,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScorerStatistics {
    pub total_detections: u64,
    pub inhibitions_triggered: u64,
    /// `inhibitions_triggered / total_detections`, 0 with no detections.
    pub inhibition_rate: f64,
    /// Mean score over the whole session, 0 with no detections.
    pub avg_dissonance: f64,
    pub recent_events: Vec<DetectionSummary>,
}

/// Per-action decision counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCounts {
    #[serde(rename = "continue")]
    pub proceed: u64,
    pub add_uncertainty: u64,
    pub reframe: u64,
    pub abort: u64,
}

impl ActionCounts {
    pub fn get(&self, action: Action) -> u64 {
        match action {
            Action::Continue => self.proceed,
            Action::AddUncertainty => self.add_uncertainty,
            Action::Reframe => self.reframe,
            Action::Abort => self.abort,
        }
    }

    pub fn increment(&mut self, action: Action) {
        let slot = match action {
            Action::Continue => &mut self.proceed,
            Action::AddUncertainty => &mut self.add_uncertainty,
            Action::Reframe => &mut self.reframe,
            Action::Abort => &mut self.abort,
        };
        *slot += 1;
    }

    /// Every decision other than `continue`.
    pub fn inhibitions(&self) -> u64 {
        self.add_uncertainty + self.reframe + self.abort
    }

    pub fn total(&self) -> u64 {
        self.proceed + self.inhibitions()
    }
}

/// One entry in the policy's bounded decision log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub dissonance: f64,
    pub action: Action,
    pub tokens_saved: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyStatistics {
    pub total_decisions: u64,
    pub by_action: ActionCounts,
    pub total_inhibitions: u64,
    /// `total_inhibitions / max(total_decisions, 1)`.
    pub inhibition_rate: f64,
    pub total_tokens_saved: u64,
    /// `total_tokens_saved / max(total_decisions, 1)`.
    pub avg_tokens_saved: f64,
    pub recent_decisions: Vec<DecisionRecord>,
}

/// Energy estimate for a session against a baseline token count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyMetrics {
    pub baseline_tokens: u64,
    pub actual_tokens: u64,
    pub tokens_saved: u64,
    pub baseline_energy_wh: f64,
    pub actual_energy_wh: f64,
    pub energy_saved_wh: f64,
    pub efficiency_gain_percent: f64,
}
