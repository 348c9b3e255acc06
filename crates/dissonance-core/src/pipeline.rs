// ─────────────────────────────────────────────────────────────────────
// Integrity-OS — Integrity Pipeline (Score → Decide → Apply)
// ─────────────────────────────────────────────────────────────────────
//! Wires graph, scorer and policy together for a generator.
//!
//! Two entry points:
//! - [`IntegrityPipeline::evaluate`] scores one candidate and decides.
//! - [`IntegrityPipeline::monitor_tokens`] walks a whole token stream,
//!   applying each decision the way a generator would and returning a
//!   [`GenerationReport`] trace.

use std::sync::Arc;

use serde::Serialize;

use dissonance_types::score::{Action, Decision, DissonanceResult, TokenBudget};
use dissonance_types::{Claim, KernelConfig, KernelResult};

use crate::graph::KnowledgeGraph;
use crate::knowledge::KnowledgeSource;
use crate::policy::InhibitionPolicy;
use crate::scorer::DissonanceScorer;

/// Score and decision for one candidate.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub result: DissonanceResult,
    pub decision: Decision,
}

/// One monitored token.
#[derive(Debug, Clone, Serialize)]
pub struct TokenEvent {
    pub index: usize,
    pub token: String,
    pub dissonance: f64,
    pub action: Action,
}

/// Trace of a monitored generation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationReport {
    /// Emitted text, or the policy alternative when inhibited.
    pub output: String,
    /// Tokens that passed the gate.
    pub tokens_generated: usize,
    pub max_dissonance: f64,
    pub avg_dissonance: f64,
    /// True when a halting action stopped the stream.
    pub inhibited: bool,
    /// Decision for the last evaluated token.
    pub final_decision: Option<Decision>,
    pub events: Vec<TokenEvent>,
}

impl GenerationReport {
    pub fn halted_at(&self) -> Option<usize> {
        if self.inhibited {
            self.events.last().map(|event| event.index)
        } else {
            None
        }
    }
}

/// Graph, scorer and policy sharing one configuration.
pub struct IntegrityPipeline {
    graph: Arc<KnowledgeGraph>,
    scorer: DissonanceScorer,
    policy: InhibitionPolicy,
}

impl IntegrityPipeline {
    pub fn new(config: KernelConfig, graph: Arc<KnowledgeGraph>) -> KernelResult<Self> {
        config.validate()?;
        let knowledge: Arc<dyn KnowledgeSource> = graph.clone();
        Ok(Self {
            scorer: DissonanceScorer::new(config.clone(), Arc::clone(&knowledge)),
            policy: InhibitionPolicy::new(config, knowledge),
            graph,
        })
    }

    pub fn graph(&self) -> &Arc<KnowledgeGraph> {
        &self.graph
    }

    pub fn scorer(&self) -> &DissonanceScorer {
        &self.scorer
    }

    pub fn policy(&self) -> &InhibitionPolicy {
        &self.policy
    }

    /// Score `candidate` in `context`, then decide.
    pub fn evaluate<S: AsRef<str>>(
        &self,
        candidate: &str,
        context: &[S],
        claim: Option<&Claim>,
        budget: TokenBudget,
    ) -> Evaluation {
        let result = self.scorer.calculate(candidate, context, claim);
        let decision = self.policy.decide(result.score, claim, budget);
        Evaluation { result, decision }
    }

    /// Monitor a token stream.
    ///
    /// Each token is scored with the previously emitted tokens as context
    /// and the claim `claim_for(index, token)` returns. The stream stops at
    /// the first `reframe` or `abort`, whose alternative replaces the
    /// output. The first `add_uncertainty` prefixes its qualifier once.
    pub fn monitor_tokens<S, F>(&self, tokens: &[S], mut claim_for: F) -> GenerationReport
    where
        S: AsRef<str>,
        F: FnMut(usize, &str) -> Option<Claim>,
    {
        let planned = tokens.len();
        let mut report = GenerationReport::default();
        let mut emitted: Vec<&str> = Vec::with_capacity(planned);
        let mut qualifier: Option<String> = None;
        let mut score_sum = 0.0;

        for (index, token) in tokens.iter().enumerate() {
            let token = token.as_ref();
            let claim = claim_for(index, token);
            let evaluation = self.evaluate(
                token,
                emitted.as_slice(),
                claim.as_ref(),
                TokenBudget::new(index, planned),
            );
            let score = evaluation.result.score;
            let action = evaluation.decision.action;

            score_sum += score;
            report.max_dissonance = report.max_dissonance.max(score);
            report.events.push(TokenEvent {
                index,
                token: token.to_string(),
                dissonance: score,
                action,
            });

            match action {
                Action::Reframe | Action::Abort => {
                    report.inhibited = true;
                    report.output = evaluation.decision.alternative.clone().unwrap_or_default();
                    log::info!(
                        "generation stopped at token {index} ({action}), {} tokens saved",
                        evaluation.decision.tokens_saved
                    );
                    report.final_decision = Some(evaluation.decision);
                    break;
                }
                Action::AddUncertainty => {
                    if qualifier.is_none() {
                        qualifier = evaluation.decision.alternative.clone();
                    }
                }
                Action::Continue => {}
            }
            emitted.push(token);
            report.final_decision = Some(evaluation.decision);
        }

        if !report.events.is_empty() {
            report.avg_dissonance = score_sum / report.events.len() as f64;
        }
        report.tokens_generated = emitted.len();
        if !report.inhibited {
            report.output = match qualifier {
                Some(q) => format!("{q} {}", emitted.concat()),
                None => emitted.concat(),
            };
        }
        report
    }

    /// Start a new session on both scorer and policy.
    pub fn reset_session(&self) {
        self.scorer.reset_session();
        self.policy.reset_session();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::QUALIFIERS;

    const FIXTURE: &str = include_str!("../fixtures/fine_art.json");

    fn make_pipeline() -> IntegrityPipeline {
        let config = KernelConfig {
            qualifier_seed: Some(1),
            ..Default::default()
        };
        let graph = Arc::new(KnowledgeGraph::from_json(FIXTURE).unwrap());
        IntegrityPipeline::new(config, graph).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = KernelConfig {
            reframe_threshold: 0.2,
            ..Default::default()
        };
        assert!(IntegrityPipeline::new(config, Arc::new(KnowledgeGraph::new())).is_err());
    }

    #[test]
    fn test_evaluate_unverified_partnership() {
        let pipeline = make_pipeline();
        let claim = Claim::new("Hahnemühle", "partnership", "Awagami");
        let evaluation = pipeline.evaluate(
            "Hahnemühle partners with Awagami",
            &["Tell me about paper makers"],
            Some(&claim),
            TokenBudget::new(5, 20),
        );
        assert!((evaluation.result.score - 0.8075).abs() < 1e-9);
        assert_eq!(evaluation.decision.action, Action::Reframe);
        assert_eq!(evaluation.decision.tokens_saved, 15);
    }

    #[test]
    fn test_evaluate_verified_fact() {
        let pipeline = make_pipeline();
        let claim = Claim::new("Hahnemühle", "manufactures", "Hahnemühle_Photo_Rag");
        let evaluation = pipeline.evaluate::<&str>(
            "Hahnemühle makes Photo Rag",
            &[],
            Some(&claim),
            TokenBudget::new(0, 10),
        );
        assert_eq!(evaluation.result.score, 0.0);
        assert_eq!(evaluation.decision.action, Action::Continue);
    }

    #[test]
    fn test_monitor_clean_stream() {
        let pipeline = make_pipeline();
        let report = pipeline.monitor_tokens(&["Photo ", "Rag ", "is ", "cotton"], |_, _| None);
        assert!(!report.inhibited);
        assert_eq!(report.output, "Photo Rag is cotton");
        assert_eq!(report.tokens_generated, 4);
        assert_eq!(report.events.len(), 4);
        assert_eq!(report.max_dissonance, 0.0);
        assert_eq!(report.halted_at(), None);
        assert_eq!(
            report.final_decision.map(|d| d.action),
            Some(Action::Continue)
        );
    }

    #[test]
    fn test_monitor_halts_on_unverified_claim() {
        let pipeline = make_pipeline();
        let tokens = ["Hahnemühle ", "partners ", "with ", "Awagami"];
        let report = pipeline.monitor_tokens(&tokens, |index, _| {
            (index == 1).then(|| Claim::new("Hahnemühle", "partnership", "Awagami"))
        });
        assert!(report.inhibited);
        assert_eq!(report.halted_at(), Some(1));
        assert_eq!(report.tokens_generated, 1);
        assert!(report.output.contains("Hahnemühle and Awagami"));
        assert!(!report.output.contains("partners "));

        let decision = report.final_decision.unwrap();
        assert_eq!(decision.action, Action::Reframe);
        assert_eq!(decision.tokens_saved, 3);
        assert!((report.max_dissonance - 0.8075).abs() < 1e-9);
        assert!((report.avg_dissonance - 0.8075 / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_monitor_unknown_entities_abort() {
        let pipeline = make_pipeline();
        // 0.85 * 0.95 + 0.10 * 0.8 + 0.05 * 0.9 = 0.9325
        let tokens = ["I know everything. ", "Moab ", "acquired Museo"];
        let report = pipeline.monitor_tokens(&tokens, |index, _| {
            (index == 2).then(|| Claim::new("Moab", "acquired", "Museo"))
        });
        assert!(report.inhibited);
        assert_eq!(report.halted_at(), Some(2));
        assert_eq!(report.final_decision.unwrap().action, Action::Abort);
        assert!(report.output.starts_with("INTEGRITY ALERT"));
    }

    #[test]
    fn test_monitor_temporal_context_qualifies() {
        let config = KernelConfig {
            w_semantic: 0.0,
            w_epistemic: 0.5,
            w_self: 0.5,
            qualifier_seed: Some(3),
            ..Default::default()
        };
        let graph = Arc::new(KnowledgeGraph::from_json(FIXTURE).unwrap());
        let pipeline = IntegrityPipeline::new(config, graph).unwrap();

        // 0.5 * 0.75 = 0.375 from the marker onward.
        let report = pipeline.monitor_tokens(&["The ", "latest ", "paper"], |_, _| None);
        assert!(!report.inhibited);
        assert_eq!(report.tokens_generated, 3);
        let (qualifier, rest) = report.output.split_once(", ").unwrap();
        assert!(QUALIFIERS.contains(&format!("{qualifier},").as_str()));
        assert_eq!(rest, "The latest paper");
        assert_eq!(report.events[0].action, Action::Continue);
        assert_eq!(report.events[1].action, Action::AddUncertainty);
        assert_eq!(report.events[2].action, Action::AddUncertainty);
    }

    #[test]
    fn test_monitor_empty_stream() {
        let pipeline = make_pipeline();
        let tokens: [&str; 0] = [];
        let report = pipeline.monitor_tokens(&tokens, |_, _| None);
        assert!(report.output.is_empty());
        assert!(report.final_decision.is_none());
        assert_eq!(report.avg_dissonance, 0.0);
    }

    #[test]
    fn test_reset_session() {
        let pipeline = make_pipeline();
        pipeline.monitor_tokens(&["a ", "b"], |_, _| None);
        assert_eq!(pipeline.scorer().get_statistics().total_detections, 2);
        assert_eq!(pipeline.policy().get_statistics().total_decisions, 2);
        pipeline.reset_session();
        assert_eq!(pipeline.scorer().get_statistics().total_detections, 0);
        assert_eq!(pipeline.policy().get_statistics().total_decisions, 0);
    }

    #[test]
    fn test_learned_fact_changes_outcome() {
        let pipeline = make_pipeline();
        let claim = Claim::new("Hahnemühle", "partnership", "Awagami");
        let budget = TokenBudget::new(0, 10);
        let before = pipeline.evaluate::<&str>("", &[], Some(&claim), budget);
        assert_eq!(before.decision.action, Action::Reframe);

        pipeline
            .graph()
            .add_verified_fact("Hahnemühle", "Awagami", "partnership", 0.9, Some("press"));
        let after = pipeline.evaluate::<&str>("", &[], Some(&claim), budget);
        assert!((after.result.score - 0.085).abs() < 1e-9);
        assert_eq!(after.decision.action, Action::Continue);
    }
}
