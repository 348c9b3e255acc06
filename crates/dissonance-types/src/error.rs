// ─────────────────────────────────────────────────────────────────────
// Integrity-OS — Dissonance Kernel Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Root error type for the dissonance kernel.
///
/// Lookups, scoring and decisions never fail: a missing node or edge is
/// an ordinary "absent" value. Only configuration and whole-graph
/// persistence surface errors.
#[derive(Error, Debug)]
pub enum KernelError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Node-link document could not be applied to a graph.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem failure while saving or loading a graph.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KernelError {
    fn from(err: serde_json::Error) -> Self {
        KernelError::Serialization(err.to_string())
    }
}

pub type KernelResult<T> = Result<T, KernelError>;
