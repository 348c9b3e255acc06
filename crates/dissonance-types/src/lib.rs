// ─────────────────────────────────────────────────────────────────────
// Integrity-OS — Dissonance Kernel Types
// (C) 2026 Integrity-OS contributors. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Type definitions, configuration, and error hierarchy for the
//! dissonance kernel, the fact-grounding gate placed in front of a
//! text generator.

pub mod claim;
pub mod config;
pub mod error;
pub mod score;
pub mod stats;

pub use claim::Claim;
pub use config::KernelConfig;
pub use error::{KernelError, KernelResult};
pub use score::{
    clamp_score, Action, AxisScores, Decision, DissonanceResult, InhibitionLevel, TokenBudget,
};
pub use stats::{
    ActionCounts, DecisionRecord, DetectionSummary, EnergyMetrics, PolicyStatistics,
    ScorerStatistics,
};
