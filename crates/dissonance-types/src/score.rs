// ─────────────────────────────────────────────────────────────────────
// Integrity-OS — Score and Decision Types
// ─────────────────────────────────────────────────────────────────────

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Clamp a value to [lo, hi], mapping NaN to lo and Inf to nearest bound.
#[inline]
pub fn clamp_score(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        log::warn!("clamp_score: NaN detected, clamping to {lo:.4}");
        return lo;
    }
    if value.is_infinite() {
        let boundary = if value > 0.0 { hi } else { lo };
        log::warn!("clamp_score: Inf detected, clamping to {boundary:.4}");
        return boundary;
    }
    value.clamp(lo, hi)
}

/// Classification of a dissonance score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InhibitionLevel {
    None,
    Uncertainty,
    Reframe,
    Abort,
}

impl InhibitionLevel {
    /// `true` for the levels that stop generation.
    pub fn should_inhibit(self) -> bool {
        matches!(self, InhibitionLevel::Reframe | InhibitionLevel::Abort)
    }

    /// Policy action taken for this level.
    pub fn action(self) -> Action {
        match self {
            InhibitionLevel::None => Action::Continue,
            InhibitionLevel::Uncertainty => Action::AddUncertainty,
            InhibitionLevel::Reframe => Action::Reframe,
            InhibitionLevel::Abort => Action::Abort,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InhibitionLevel::None => "none",
            InhibitionLevel::Uncertainty => "uncertainty",
            InhibitionLevel::Reframe => "reframe",
            InhibitionLevel::Abort => "abort",
        }
    }
}

impl fmt::Display for InhibitionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action the generator applies after a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Continue,
    AddUncertainty,
    Reframe,
    Abort,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::Continue,
        Action::AddUncertainty,
        Action::Reframe,
        Action::Abort,
    ];

    /// `true` when generation stops and the alternative replaces output.
    pub fn halts(self) -> bool {
        matches!(self, Action::Reframe | Action::Abort)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Continue => "continue",
            Action::AddUncertainty => "add_uncertainty",
            Action::Reframe => "reframe",
            Action::Abort => "abort",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-axis contributions, each in [0, 1] before weighting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisScores {
    /// Conflict between the claim and the verified graph.
    pub semantic: f64,
    /// Claims beyond the knowledge boundary (recency, unknown entities).
    pub epistemic: f64,
    /// Self-referential contradictions in the text.
    pub self_consistency: f64,
}

impl AxisScores {
    pub fn new(semantic: f64, epistemic: f64, self_consistency: f64) -> Self {
        Self {
            semantic: clamp_score(semantic, 0.0, 1.0),
            epistemic: clamp_score(epistemic, 0.0, 1.0),
            self_consistency: clamp_score(self_consistency, 0.0, 1.0),
        }
    }
}

/// Outcome of one dissonance measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DissonanceResult {
    /// Composite dissonance: 0.0 = harmony, 1.0 = maximal conflict.
    pub score: f64,
    pub components: AxisScores,
    pub level: InhibitionLevel,
    /// `true` iff `level` is `reframe` or `abort`.
    pub should_inhibit: bool,
    pub explanation: String,
    /// The candidate text that was scored.
    pub candidate: String,
    /// Position of this result within the scoring session.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

/// Where the generator stands in its planned output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    /// Index of the token being decided on.
    pub position: usize,
    /// Total number of tokens the generator planned to emit.
    pub planned: usize,
}

impl TokenBudget {
    pub fn new(position: usize, planned: usize) -> Self {
        Self { position, planned }
    }

    /// Tokens that would still be generated without intervention.
    pub fn remaining(&self) -> usize {
        self.planned.saturating_sub(self.position)
    }
}

/// Structured decision returned to the generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub reason: String,
    /// Replacement text for `reframe`/`abort`, qualifier for
    /// `add_uncertainty`, `None` for `continue`.
    pub alternative: Option<String>,
    /// Tokens not generated because of this decision.
    pub tokens_saved: usize,
    /// `tokens_saved` as a percentage of the planned tokens, in [0, 100].
    pub energy_saved_percent: f64,
    pub timestamp: DateTime<Utc>,
}
