// ─────────────────────────────────────────────────────────────────────
// Integrity-OS — Structured Claims
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

/// A structured assertion extracted from candidate text by the caller.
///
/// Built per request and never stored in the graph. `entity_a` is
/// required; a claim whose `entity_a` is blank is treated as malformed
/// and contributes nothing to the axes that need it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub entity_a: String,
    #[serde(default)]
    pub entity_b: Option<String>,
    #[serde(default)]
    pub relation: Option<String>,
}

impl Claim {
    /// Claim relating two entities through a named relation.
    pub fn new(
        entity_a: impl Into<String>,
        relation: impl Into<String>,
        entity_b: impl Into<String>,
    ) -> Self {
        Self {
            entity_a: entity_a.into(),
            entity_b: Some(entity_b.into()),
            relation: Some(relation.into()),
        }
    }

    /// Claim about a single entity.
    pub fn about(entity_a: impl Into<String>) -> Self {
        Self {
            entity_a: entity_a.into(),
            entity_b: None,
            relation: None,
        }
    }

    pub fn with_entity_b(mut self, entity_b: impl Into<String>) -> Self {
        self.entity_b = Some(entity_b.into());
        self
    }

    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    /// `entity_a`, or `None` when blank.
    pub fn subject(&self) -> Option<&str> {
        non_blank(Some(&self.entity_a))
    }

    /// `entity_b`, or `None` when absent or blank.
    pub fn object(&self) -> Option<&str> {
        non_blank(self.entity_b.as_ref())
    }

    /// Requested relation label, or `None` when absent or blank.
    pub fn relation_label(&self) -> Option<&str> {
        non_blank(self.relation.as_ref())
    }

    /// Both entities, when the claim names a pair.
    pub fn pair(&self) -> Option<(&str, &str)> {
        Some((self.subject()?, self.object()?))
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.trim().is_empty())
}
