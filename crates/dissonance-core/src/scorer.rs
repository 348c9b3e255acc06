// ─────────────────────────────────────────────────────────────────────
// Integrity-OS — Dissonance Scorer (Three-Axis Conflict Measure)
// ─────────────────────────────────────────────────────────────────────
//! Multi-axis dissonance scorer for candidate generator output.
//!
//! Three independent signals, each clamped to [0, 1]:
//! - **Semantic**: the claim checked against the verified graph.
//! - **Epistemic**: recency markers and entities the graph does not know.
//! - **Self-consistency**: self-referential contradiction phrases.
//!
//! The score is `w_semantic * S + w_epistemic * E + w_self * C`. The
//! semantic weight dominates, so text heuristics alone cannot push a
//! claim-free candidate past the uncertainty threshold.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use dissonance_types::score::{clamp_score, AxisScores, DissonanceResult, InhibitionLevel};
use dissonance_types::stats::{DetectionSummary, ScorerStatistics};
use dissonance_types::{Claim, KernelConfig};

use crate::knowledge::KnowledgeSource;

/// Markers of claims about events newer than the graph, matched as
/// case-insensitive substrings. Any hit sets the epistemic axis to
/// [`TEMPORAL_DISSONANCE`].
pub const TEMPORAL_MARKERS: [&str; 6] = ["2025", "2026", "latest", "recent", "new", "just released"];

pub const TEMPORAL_DISSONANCE: f64 = 0.75;

/// Epistemic penalty per claim entity missing from the graph.
pub const UNKNOWN_ENTITY_PENALTY: f64 = 0.4;

/// Cap on the summed unknown-entity penalty.
pub const UNKNOWN_ENTITY_CAP: f64 = 0.9;

/// Self-contradiction phrases in priority order. The first phrase found
/// in the text decides the axis value, regardless of later matches.
pub const SELF_CONTRADICTIONS: [(&str, f64); 4] = [
    ("i have no consciousness", 0.6),
    ("i cannot monitor myself", 0.8),
    ("i always tell the truth", 0.7),
    ("i know everything", 0.9),
];

/// Semantic value when the claimed entities have no connection.
pub const NO_RELATIONSHIP: f64 = 0.95;

/// Semantic value when a connection exists under a different label.
pub const RELATION_MISMATCH: f64 = 0.70;

struct ScorerState {
    history: VecDeque<DissonanceResult>,
    total_detections: u64,
    inhibitions_triggered: u64,
    score_sum: f64,
}

impl ScorerState {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            total_detections: 0,
            inhibitions_triggered: 0,
            score_sum: 0.0,
        }
    }
}

/// Three-axis dissonance scorer.
///
/// Thread-safe: counters and history are updated together under one
/// `parking_lot::Mutex`, so concurrent calls never lose an update.
pub struct DissonanceScorer {
    config: KernelConfig,
    knowledge: Arc<dyn KnowledgeSource>,
    state: Mutex<ScorerState>,
}

impl DissonanceScorer {
    pub fn new(config: KernelConfig, knowledge: Arc<dyn KnowledgeSource>) -> Self {
        Self {
            config,
            knowledge,
            state: Mutex::new(ScorerState::new()),
        }
    }

    /// Score a candidate against the graph and record the result.
    pub fn calculate<S: AsRef<str>>(
        &self,
        candidate: &str,
        context: &[S],
        claim: Option<&Claim>,
    ) -> DissonanceResult {
        let text = scan_text(candidate, context);
        let components = AxisScores::new(
            self.semantic_dissonance(claim),
            self.epistemic_dissonance(&text, claim),
            self_consistency_dissonance(&text),
        );
        let score = clamp_score(
            self.config.w_semantic * components.semantic
                + self.config.w_epistemic * components.epistemic
                + self.config.w_self * components.self_consistency,
            0.0,
            1.0,
        );
        let level = self.config.classify(score);
        let explanation = explain(level, candidate, score);

        match level {
            InhibitionLevel::Abort => log::error!("{explanation}"),
            InhibitionLevel::Reframe => log::warn!("{explanation}"),
            _ => log::debug!("{explanation}"),
        }

        let mut state = self.state.lock();
        let result = DissonanceResult {
            score,
            components,
            level,
            should_inhibit: level.should_inhibit(),
            explanation,
            candidate: candidate.to_string(),
            sequence: state.total_detections,
            timestamp: Utc::now(),
        };
        state.total_detections += 1;
        state.score_sum += score;
        if result.should_inhibit {
            state.inhibitions_triggered += 1;
        }
        state.history.push_back(result.clone());
        if state.history.len() > self.config.history_capacity {
            state.history.pop_front();
        }
        result
    }

    /// Semantic axis: the claimed relation checked against the graph.
    ///
    /// 0 without a two-entity claim; [`NO_RELATIONSHIP`] when the graph
    /// has no path; [`RELATION_MISMATCH`] when the label differs from the
    /// requested relation; otherwise `1 - confidence`.
    pub fn semantic_dissonance(&self, claim: Option<&Claim>) -> f64 {
        let Some((a, b)) = claim.and_then(Claim::pair) else {
            return 0.0;
        };
        let relationship = self.knowledge.query_relationship(a, b);
        if !relationship.exists {
            return NO_RELATIONSHIP;
        }
        if let Some(requested) = claim.and_then(Claim::relation_label) {
            if relationship.relation_type.as_deref() != Some(requested) {
                return RELATION_MISMATCH;
            }
        }
        clamp_score(1.0 - relationship.confidence, 0.0, 1.0)
    }

    /// Epistemic axis over already-lowercased scan text.
    pub fn epistemic_dissonance(&self, text: &str, claim: Option<&Claim>) -> f64 {
        if TEMPORAL_MARKERS.iter().any(|m| text.contains(m)) {
            return TEMPORAL_DISSONANCE;
        }
        let Some(claim) = claim else {
            return 0.0;
        };
        let unknown = [claim.subject(), claim.object()]
            .into_iter()
            .flatten()
            .filter(|entity| !self.knowledge.contains_node(entity))
            .count();
        (unknown as f64 * UNKNOWN_ENTITY_PENALTY).min(UNKNOWN_ENTITY_CAP)
    }

    pub fn get_statistics(&self) -> ScorerStatistics {
        let state = self.state.lock();
        if state.total_detections == 0 {
            return ScorerStatistics::default();
        }
        let total = state.total_detections as f64;
        let skip = state.history.len().saturating_sub(self.config.recent_window);
        ScorerStatistics {
            total_detections: state.total_detections,
            inhibitions_triggered: state.inhibitions_triggered,
            inhibition_rate: state.inhibitions_triggered as f64 / total,
            avg_dissonance: state.score_sum / total,
            recent_events: state
                .history
                .iter()
                .skip(skip)
                .map(|r| DetectionSummary {
                    candidate: r.candidate.clone(),
                    score: r.score,
                    level: r.level,
                    timestamp: r.timestamp,
                })
                .collect(),
        }
    }

    /// Retained results, oldest first.
    pub fn history(&self) -> Vec<DissonanceResult> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// Start a new session: clears history and counters.
    pub fn reset_session(&self) {
        *self.state.lock() = ScorerState::new();
        log::info!("dissonance scorer session reset");
    }

    /// Read-only access to config.
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }
}

/// Context followed by the candidate, space-joined and lowercased.
fn scan_text<S: AsRef<str>>(candidate: &str, context: &[S]) -> String {
    let mut text = String::new();
    let parts = context
        .iter()
        .map(<S as AsRef<str>>::as_ref)
        .chain(std::iter::once(candidate));
    for part in parts {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(part);
    }
    text.to_lowercase()
}

/// Self-consistency axis over already-lowercased scan text.
pub fn self_consistency_dissonance(text: &str) -> f64 {
    SELF_CONTRADICTIONS
        .iter()
        .find(|(phrase, _)| text.contains(phrase))
        .map_or(0.0, |(_, severity)| *severity)
}

fn explain(level: InhibitionLevel, candidate: &str, score: f64) -> String {
    match level {
        InhibitionLevel::Abort => format!(
            "CRITICAL DISSONANCE: '{candidate}' creates an unverifiable claim (D={score:.2})"
        ),
        InhibitionLevel::Reframe => format!(
            "HIGH DISSONANCE: rephrase '{candidate}' to avoid an unverified claim (D={score:.2})"
        ),
        InhibitionLevel::Uncertainty => {
            format!("MODERATE DISSONANCE: express uncertainty about '{candidate}' (D={score:.2})")
        }
        InhibitionLevel::None => {
            format!("Low dissonance: '{candidate}' aligns with knowledge (D={score:.2})")
        }
    }
}
