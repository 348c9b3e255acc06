// ─────────────────────────────────────────────────────────────────────
// Integrity-OS — Dissonance Kernel Core Engine
// (C) 2026 Integrity-OS contributors. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Fact-grounding gate for text generators: a verified knowledge graph,
//! a three-axis dissonance scorer and a four-way inhibition policy.
//!
//! Control flow: the generator supplies a candidate, its prior context
//! and an optional structured claim. The scorer queries the graph and
//! returns a [`DissonanceResult`]; the policy maps its score onto a
//! [`Decision`] the generator applies. [`IntegrityPipeline`] wires the
//! three together.
//!
//! # Invariants
//!
//! 1. **Scores stay in `[0, 1]`**: every axis value and the weighted
//!    composite are clamped, and a non-finite score reaching the policy
//!    is treated as 1.0 (abort).
//!
//! 2. **One set of thresholds**: scorer levels and policy actions are
//!    both derived from [`KernelConfig::classify`], so they cannot
//!    disagree on the same score.
//!
//! 3. **Bounded search**: relationship queries never return a path with
//!    more than [`graph::MAX_PATH_NODES`] nodes, and among shortest
//!    paths the lexicographically smallest id sequence wins.
//!
//! 4. **Readers see whole updates**: graph mutations and counter updates
//!    happen under a single lock each, so concurrent readers never see a
//!    half-applied fact or a torn statistics snapshot.
//!
//! [`DissonanceResult`]: dissonance_types::DissonanceResult
//! [`Decision`]: dissonance_types::Decision
//! [`KernelConfig::classify`]: dissonance_types::KernelConfig::classify

pub mod graph;
pub mod knowledge;
pub mod pipeline;
pub mod policy;
pub mod scorer;

pub use graph::{
    AttrValue, Attributes, Edge, FactOutcome, GraphStatistics, KnowledgeGraph, LearningEvent,
    Node, NodeLinkData, Relationship, VerifiedFact,
};
pub use knowledge::KnowledgeSource;
pub use pipeline::{Evaluation, GenerationReport, IntegrityPipeline, TokenEvent};
pub use policy::InhibitionPolicy;
pub use scorer::DissonanceScorer;
