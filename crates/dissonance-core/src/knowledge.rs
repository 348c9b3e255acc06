// ─────────────────────────────────────────────────────────────────────
// Integrity-OS — Knowledge Source Interface
// ─────────────────────────────────────────────────────────────────────
//! Read-only view of verified knowledge used by the scorer and policy.
//!
//! [`KnowledgeGraph`] is the in-process backend. Deployments that keep
//! their facts elsewhere implement [`KnowledgeSource`] and hand it to the
//! scorer and policy in its place.

use std::sync::Arc;

use crate::graph::{KnowledgeGraph, Node, Relationship};

/// Trait for verified-knowledge backends.
///
/// Implementations must treat unknown ids as a normal outcome: an absent
/// [`Relationship`] or `None`, never a panic.
pub trait KnowledgeSource: Send + Sync {
    /// Relationship from `a` to `b`.
    fn query_relationship(&self, a: &str, b: &str) -> Relationship;

    /// Node type, attributes and verification flag for `id`.
    fn get_node_info(&self, id: &str) -> Option<Node>;

    fn contains_node(&self, id: &str) -> bool {
        self.get_node_info(id).is_some()
    }
}

impl KnowledgeSource for KnowledgeGraph {
    fn query_relationship(&self, a: &str, b: &str) -> Relationship {
        KnowledgeGraph::query_relationship(self, a, b)
    }

    fn get_node_info(&self, id: &str) -> Option<Node> {
        KnowledgeGraph::get_node_info(self, id)
    }

    fn contains_node(&self, id: &str) -> bool {
        KnowledgeGraph::contains_node(self, id)
    }
}

impl<T: KnowledgeSource + ?Sized> KnowledgeSource for Arc<T> {
    fn query_relationship(&self, a: &str, b: &str) -> Relationship {
        (**self).query_relationship(a, b)
    }

    fn get_node_info(&self, id: &str) -> Option<Node> {
        (**self).get_node_info(id)
    }

    fn contains_node(&self, id: &str) -> bool {
        (**self).contains_node(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_as_source() {
        let graph = KnowledgeGraph::new();
        graph.add_verified_fact("a", "b", "r", 0.8, None);
        let source: Arc<dyn KnowledgeSource> = Arc::new(graph);
        assert!(source.contains_node("a"));
        assert!(!source.contains_node("z"));
        assert!(source.query_relationship("a", "b").is_direct);
        assert!(source.get_node_info("b").is_some());
    }

    #[test]
    fn test_arc_forwarding() {
        let graph = Arc::new(KnowledgeGraph::new());
        graph.add_verified_fact("a", "b", "r", 0.8, None);
        let shared = Arc::clone(&graph);
        assert!(KnowledgeSource::contains_node(&shared, "b"));
    }
}
