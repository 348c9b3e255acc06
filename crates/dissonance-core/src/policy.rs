// ─────────────────────────────────────────────────────────────────────
// Integrity-OS — Inhibition Policy (Four-Way Output Gate)
// ─────────────────────────────────────────────────────────────────────
//! Maps a dissonance score onto the action the generator applies:
//!
//! | score                  | action            | tokens saved      |
//! |------------------------|-------------------|-------------------|
//! | `>= abort_threshold`   | `abort`           | all remaining     |
//! | `>= reframe_threshold` | `reframe`         | all remaining     |
//! | `>= uncertainty_thr.`  | `add_uncertainty` | 0                 |
//! | below                  | `continue`        | 0                 |
//!
//! The policy is a pure classifier over the score; it carries no state
//! between decisions apart from observability counters. Thresholds come
//! from the same [`KernelConfig`] the scorer uses.
//!
//! Scores are clamped to [0, 1] before use. Non-finite scores are treated
//! as maximal dissonance and abort.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dissonance_types::score::{clamp_score, Action, Decision, TokenBudget};
use dissonance_types::stats::{ActionCounts, DecisionRecord, EnergyMetrics, PolicyStatistics};
use dissonance_types::{Claim, KernelConfig};

use crate::graph::Node;
use crate::knowledge::KnowledgeSource;

/// Epistemic qualifiers offered on `add_uncertainty`.
pub const QUALIFIERS: [&str; 5] = [
    "Based on my knowledge,",
    "As far as I can verify,",
    "According to my data,",
    "To my understanding,",
    "If I'm not mistaken,",
];

/// Energy estimate per generated token, in watt-hours.
pub const ENERGY_PER_TOKEN_WH: f64 = 0.01;

const ABORT_WITHOUT_CLAIM: &str = "I cannot verify this claim in my knowledge base. \
     I'm stopping generation to avoid potential misinformation.";

const REFRAME_WITHOUT_CLAIM: &str = "Based on my knowledge, I cannot confirm this with high \
     confidence. Let me rephrase more carefully...";

struct PolicyState {
    total_decisions: u64,
    by_action: ActionCounts,
    total_tokens_saved: u64,
    recent: VecDeque<DecisionRecord>,
}

impl PolicyState {
    fn new() -> Self {
        Self {
            total_decisions: 0,
            by_action: ActionCounts::default(),
            total_tokens_saved: 0,
            recent: VecDeque::new(),
        }
    }
}

/// Threshold-driven inhibition policy.
pub struct InhibitionPolicy {
    config: KernelConfig,
    knowledge: Arc<dyn KnowledgeSource>,
    rng: Mutex<StdRng>,
    state: Mutex<PolicyState>,
}

impl InhibitionPolicy {
    /// Qualifier choice is seeded from `config.qualifier_seed` when set,
    /// from OS entropy otherwise.
    pub fn new(config: KernelConfig, knowledge: Arc<dyn KnowledgeSource>) -> Self {
        let rng = match config.qualifier_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            knowledge,
            rng: Mutex::new(rng),
            state: Mutex::new(PolicyState::new()),
        }
    }

    /// Make qualifier selection reproducible.
    pub fn with_qualifier_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    /// Decide what the generator does with the current token.
    pub fn decide(&self, score: f64, claim: Option<&Claim>, budget: TokenBudget) -> Decision {
        let score = if score.is_finite() {
            clamp_score(score, 0.0, 1.0)
        } else {
            log::warn!("non-finite dissonance score {score}, treating as 1.0");
            1.0
        };
        let remaining = budget.remaining();
        let action = self.config.classify(score).action();

        let (reason, alternative, tokens_saved) = match action {
            Action::Abort => (
                format!("Critical dissonance ({score:.2}) - unverified claim detected"),
                Some(self.abort_response(claim)),
                remaining,
            ),
            Action::Reframe => (
                format!("High dissonance ({score:.2}) - rephrasing to add verification"),
                Some(self.reframe_response(claim)),
                remaining,
            ),
            Action::AddUncertainty => (
                format!("Moderate dissonance ({score:.2}) - adding epistemic qualifier"),
                Some(self.pick_qualifier().to_string()),
                0,
            ),
            Action::Continue => (
                format!("Low dissonance ({score:.2}) - token aligns with knowledge"),
                None,
                0,
            ),
        };

        let energy_saved_percent =
            (tokens_saved as f64 / budget.planned.max(1) as f64 * 100.0).clamp(0.0, 100.0);

        let decision = Decision {
            action,
            reason,
            alternative,
            tokens_saved,
            energy_saved_percent,
            timestamp: Utc::now(),
        };

        match action {
            Action::Abort => log::error!("{} ({tokens_saved} tokens saved)", decision.reason),
            Action::Reframe => log::warn!("{} ({tokens_saved} tokens saved)", decision.reason),
            _ => log::debug!("{}", decision.reason),
        }

        let mut state = self.state.lock();
        state.total_decisions += 1;
        state.by_action.increment(action);
        state.total_tokens_saved += tokens_saved as u64;
        state.recent.push_back(DecisionRecord {
            dissonance: score,
            action,
            tokens_saved,
            timestamp: decision.timestamp,
        });
        if state.recent.len() > self.config.recent_window {
            state.recent.pop_front();
        }

        decision
    }

    fn pick_qualifier(&self) -> &'static str {
        let ix = self.rng.lock().gen_range(0..QUALIFIERS.len());
        QUALIFIERS[ix]
    }

    /// Transparency message: no verified relation, what is known about
    /// each entity, and follow-up options.
    fn abort_response(&self, claim: Option<&Claim>) -> String {
        let Some(claim) = claim else {
            return ABORT_WITHOUT_CLAIM.to_string();
        };
        let entity_a = claim.subject().unwrap_or("the first entity");
        let entity_b = claim.object().unwrap_or("another entity");
        let relation = claim.relation_label().unwrap_or("relationship");

        let mut lines = vec![
            "INTEGRITY ALERT".to_string(),
            String::new(),
            format!("I cannot verify a {relation} between {entity_a} and {entity_b} in my knowledge graph."),
        ];
        for entity in [claim.subject(), claim.object()].into_iter().flatten() {
            if let Some(node) = self.knowledge.get_node_info(entity) {
                lines.push(String::new());
                lines.push(format!("What I can verify about {entity}:"));
                lines.extend(describe(&node).into_iter().map(|fact| format!("- {fact}")));
            }
        }
        lines.extend([
            String::new(),
            format!("No documented {relation} exists in my verified knowledge base."),
            String::new(),
            "Would you like me to:".to_string(),
            "1. Search for current information?".to_string(),
            "2. Provide details on each entity separately?".to_string(),
            "3. Explain my knowledge limitations?".to_string(),
        ]);
        lines.join("\n")
    }

    /// Softer message: per-entity facts, the relation left unasserted.
    fn reframe_response(&self, claim: Option<&Claim>) -> String {
        let Some(claim) = claim else {
            return REFRAME_WITHOUT_CLAIM.to_string();
        };
        let entities: Vec<&str> = [claim.subject(), claim.object()].into_iter().flatten().collect();
        let mut response = match entities.as_slice() {
            [a, b] => format!(
                "I don't have verified information about a direct relationship between {a} and {b}."
            ),
            [a] => format!("I don't have verified information to support this claim about {a}."),
            _ => return REFRAME_WITHOUT_CLAIM.to_string(),
        };

        let known: Vec<String> = entities
            .iter()
            .filter_map(|id| self.knowledge.get_node_info(id))
            .map(|node| summarize(&node))
            .collect();
        if !known.is_empty() {
            response.push_str(" I can tell you about each separately: ");
            response.push_str(&known.join("; "));
            response.push('.');
        }
        response
    }

    pub fn get_statistics(&self) -> PolicyStatistics {
        let state = self.state.lock();
        let decisions = state.total_decisions.max(1) as f64;
        let total_inhibitions = state.by_action.inhibitions();
        PolicyStatistics {
            total_decisions: state.total_decisions,
            by_action: state.by_action,
            total_inhibitions,
            inhibition_rate: total_inhibitions as f64 / decisions,
            total_tokens_saved: state.total_tokens_saved,
            avg_tokens_saved: state.total_tokens_saved as f64 / decisions,
            recent_decisions: state.recent.iter().cloned().collect(),
        }
    }

    /// Energy estimate for this session against `baseline_tokens`.
    pub fn energy_metrics(&self, baseline_tokens: u64) -> EnergyMetrics {
        let tokens_saved = self.state.lock().total_tokens_saved;
        let actual_tokens = baseline_tokens.saturating_sub(tokens_saved);
        let baseline_energy_wh = baseline_tokens as f64 * ENERGY_PER_TOKEN_WH;
        let actual_energy_wh = actual_tokens as f64 * ENERGY_PER_TOKEN_WH;
        let energy_saved_wh = baseline_energy_wh - actual_energy_wh;
        EnergyMetrics {
            baseline_tokens,
            actual_tokens,
            tokens_saved,
            baseline_energy_wh,
            actual_energy_wh,
            energy_saved_wh,
            efficiency_gain_percent: if baseline_energy_wh > 0.0 {
                energy_saved_wh / baseline_energy_wh * 100.0
            } else {
                0.0
            },
        }
    }

    /// Start a new session: clears counters and the decision log.
    pub fn reset_session(&self) {
        *self.state.lock() = PolicyState::new();
        log::info!("inhibition policy session reset");
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }
}

/// Bullet facts for one node: type first, then attributes in key order.
fn describe(node: &Node) -> Vec<String> {
    let mut facts = Vec::with_capacity(node.attributes.len() + 1);
    if node.verified {
        facts.push(format!("Type: {}", node.node_type));
    } else {
        facts.push(format!("Type: {} (unverified)", node.node_type));
    }
    facts.extend(
        node.attributes
            .iter()
            .map(|(key, value)| format!("{key}: {value}")),
    );
    facts
}

/// One-line summary used by the reframe message.
fn summarize(node: &Node) -> String {
    let mut summary = format!("{} is a {}", node.id, node.node_type);
    if !node.attributes.is_empty() {
        let attrs: Vec<String> = node
            .attributes
            .iter()
            .map(|(key, value)| format!("{key} {value}"))
            .collect();
        summary.push_str(&format!(" ({})", attrs.join(", ")));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::KnowledgeGraph;

    const FIXTURE: &str = include_str!("../fixtures/fine_art.json");

    fn make_policy() -> InhibitionPolicy {
        InhibitionPolicy::new(
            KernelConfig::default(),
            Arc::new(KnowledgeGraph::from_json(FIXTURE).unwrap()),
        )
        .with_qualifier_seed(42)
    }

    fn budget() -> TokenBudget {
        TokenBudget::new(10, 40)
    }

    #[test]
    fn test_continue() {
        let policy = make_policy();
        let decision = policy.decide(0.15, None, budget());
        assert_eq!(decision.action, Action::Continue);
        assert!(decision.alternative.is_none());
        assert_eq!(decision.tokens_saved, 0);
        assert_eq!(decision.energy_saved_percent, 0.0);
    }

    #[test]
    fn test_add_uncertainty() {
        let policy = make_policy();
        let decision = policy.decide(0.45, None, budget());
        assert_eq!(decision.action, Action::AddUncertainty);
        let qualifier = decision.alternative.unwrap();
        assert!(QUALIFIERS.contains(&qualifier.as_str()));
        assert_eq!(decision.tokens_saved, 0);
    }

    #[test]
    fn test_reframe_saves_remaining() {
        let policy = make_policy();
        let claim = Claim::new("Hahnemühle", "partnership", "Awagami");
        let decision = policy.decide(0.8075, Some(&claim), budget());
        assert_eq!(decision.action, Action::Reframe);
        assert_eq!(decision.tokens_saved, 30);
        assert!((decision.energy_saved_percent - 75.0).abs() < 1e-9);

        let text = decision.alternative.unwrap();
        assert!(text.contains("direct relationship between Hahnemühle and Awagami"));
        assert!(text.contains("Hahnemühle is a company"));
        assert!(text.contains("country Japan"));
        assert!(!text.contains("partnership"));
    }

    #[test]
    fn test_abort_transparency_message() {
        let policy = make_policy();
        let claim = Claim::new("Hahnemühle", "partnership", "Awagami");
        let decision = policy.decide(0.95, Some(&claim), TokenBudget::new(7, 40));
        assert_eq!(decision.action, Action::Abort);
        assert_eq!(decision.tokens_saved, 33);
        assert!((decision.energy_saved_percent - 82.5).abs() < 1e-9);

        let text = decision.alternative.unwrap();
        assert!(text.starts_with("INTEGRITY ALERT"));
        assert!(text.contains("I cannot verify a partnership between Hahnemühle and Awagami"));
        assert!(text.contains("What I can verify about Hahnemühle:"));
        assert!(text.contains("- Type: company"));
        assert!(text.contains("- country: Germany"));
        assert!(text.contains("What I can verify about Awagami:"));
        assert!(text.contains("- location: Tokushima"));
        assert!(text.contains("1. Search for current information?"));
        assert!(text.contains("3. Explain my knowledge limitations?"));
    }

    #[test]
    fn test_abort_unknown_entity_lists_only_known() {
        let policy = make_policy();
        let claim = Claim::new("Hahnemühle", "acquired", "Moab");
        let text = policy
            .decide(0.92, Some(&claim), budget())
            .alternative
            .unwrap();
        assert!(text.contains("What I can verify about Hahnemühle:"));
        assert!(!text.contains("What I can verify about Moab:"));
    }

    #[test]
    fn test_messages_without_claim() {
        let policy = make_policy();
        let abort = policy.decide(0.99, None, budget()).alternative.unwrap();
        assert_eq!(abort, ABORT_WITHOUT_CLAIM);
        let reframe = policy.decide(0.7, None, budget()).alternative.unwrap();
        assert_eq!(reframe, REFRAME_WITHOUT_CLAIM);
    }

    #[test]
    fn test_threshold_boundaries() {
        let policy = make_policy();
        let cases = [
            (0.0, Action::Continue),
            (0.2999, Action::Continue),
            (0.30, Action::AddUncertainty),
            (0.6499, Action::AddUncertainty),
            (0.65, Action::Reframe),
            (0.8999, Action::Reframe),
            (0.90, Action::Abort),
            (1.0, Action::Abort),
        ];
        for (score, expected) in cases {
            assert_eq!(policy.decide(score, None, budget()).action, expected, "score {score}");
        }
    }

    #[test]
    fn test_non_finite_score_aborts() {
        let policy = make_policy();
        assert_eq!(policy.decide(f64::NAN, None, budget()).action, Action::Abort);
        assert_eq!(
            policy.decide(f64::NEG_INFINITY, None, budget()).action,
            Action::Abort
        );
    }

    #[test]
    fn test_out_of_range_scores_recorded_clamped() {
        let policy = make_policy();
        assert_eq!(policy.decide(1.5, None, budget()).action, Action::Abort);
        assert_eq!(policy.decide(-0.2, None, budget()).action, Action::Continue);
        let recorded: Vec<f64> = policy
            .get_statistics()
            .recent_decisions
            .iter()
            .map(|r| r.dissonance)
            .collect();
        assert_eq!(recorded, vec![1.0, 0.0]);
    }

    #[test]
    fn test_concurrent_decisions() {
        use std::thread;

        let policy = Arc::new(make_policy());
        let scores = [0.1, 0.4, 0.7, 0.95];
        let handles: Vec<_> = scores
            .into_iter()
            .map(|score| {
                let policy = Arc::clone(&policy);
                thread::spawn(move || {
                    for _ in 0..50 {
                        policy.decide(score, None, TokenBudget::new(0, 4));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let stats = policy.get_statistics();
        assert_eq!(stats.total_decisions, 200);
        for action in Action::ALL {
            assert_eq!(stats.by_action.get(action), 50, "{action}");
        }
        assert_eq!(stats.by_action.total(), 200);
        assert_eq!(stats.total_inhibitions, 150);
        assert_eq!(stats.total_tokens_saved, 400);
    }

    #[test]
    fn test_zero_planned_tokens() {
        let policy = make_policy();
        let decision = policy.decide(0.95, None, TokenBudget::new(0, 0));
        assert_eq!(decision.tokens_saved, 0);
        assert_eq!(decision.energy_saved_percent, 0.0);
    }

    #[test]
    fn test_position_past_plan_saves_nothing() {
        let policy = make_policy();
        let decision = policy.decide(0.95, None, TokenBudget::new(50, 40));
        assert_eq!(decision.tokens_saved, 0);
    }

    #[test]
    fn test_seeded_qualifiers_reproducible() {
        let graph: Arc<dyn KnowledgeSource> = Arc::new(KnowledgeGraph::new());
        let config = KernelConfig {
            qualifier_seed: Some(7),
            ..Default::default()
        };
        let first = InhibitionPolicy::new(config.clone(), Arc::clone(&graph));
        let second = InhibitionPolicy::new(config, graph);
        for _ in 0..10 {
            assert_eq!(
                first.decide(0.4, None, budget()).alternative,
                second.decide(0.4, None, budget()).alternative
            );
        }
    }

    #[test]
    fn test_statistics() {
        let policy = make_policy();
        let empty = policy.get_statistics();
        assert_eq!(empty.total_decisions, 0);
        assert_eq!(empty.inhibition_rate, 0.0);
        assert_eq!(empty.avg_tokens_saved, 0.0);

        policy.decide(0.1, None, budget());
        policy.decide(0.4, None, budget());
        policy.decide(0.7, None, budget());
        policy.decide(0.95, None, budget());

        let stats = policy.get_statistics();
        assert_eq!(stats.total_decisions, 4);
        assert_eq!(stats.by_action.get(Action::Continue), 1);
        assert_eq!(stats.by_action.get(Action::Abort), 1);
        assert_eq!(stats.total_inhibitions, 3);
        assert!((stats.inhibition_rate - 0.75).abs() < 1e-9);
        assert_eq!(stats.total_tokens_saved, 60);
        assert!((stats.avg_tokens_saved - 15.0).abs() < 1e-9);
        assert_eq!(stats.recent_decisions.len(), 4);

        policy.reset_session();
        assert_eq!(policy.get_statistics().total_decisions, 0);
    }

    #[test]
    fn test_recent_decisions_bounded() {
        let config = KernelConfig {
            recent_window: 3,
            ..Default::default()
        };
        let policy = InhibitionPolicy::new(config, Arc::new(KnowledgeGraph::new()));
        for i in 0..6 {
            policy.decide(i as f64 / 10.0, None, budget());
        }
        let stats = policy.get_statistics();
        assert_eq!(stats.total_decisions, 6);
        let scores: Vec<f64> = stats.recent_decisions.iter().map(|r| r.dissonance).collect();
        assert_eq!(scores, vec![0.3, 0.4, 0.5]);
    }

    #[test]
    fn test_energy_metrics() {
        let policy = make_policy();
        policy.decide(0.95, None, TokenBudget::new(7, 40));
        let metrics = policy.energy_metrics(100);
        assert_eq!(metrics.tokens_saved, 33);
        assert_eq!(metrics.actual_tokens, 67);
        assert!((metrics.energy_saved_wh - 0.33).abs() < 1e-9);
        assert!((metrics.efficiency_gain_percent - 33.0).abs() < 1e-9);

        let none = policy.energy_metrics(0);
        assert_eq!(none.actual_tokens, 0);
        assert_eq!(none.efficiency_gain_percent, 0.0);
    }
}
