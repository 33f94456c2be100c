use thiserror::Error;

/// Errors crossing the retrieval engine's public boundary.
///
/// `BackendUnavailable` and `EmbeddingFailure` are recovered inside the
/// retriever; the remaining variants are contract violations and reach the
/// caller.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("{backend} search backend unavailable: {reason}")]
    BackendUnavailable { backend: &'static str, reason: String },

    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RetrievalError {
    pub fn sparse(err: impl std::fmt::Display) -> Self {
        RetrievalError::BackendUnavailable { backend: "sparse", reason: err.to_string() }
    }

    pub fn dense(err: impl std::fmt::Display) -> Self {
        RetrievalError::BackendUnavailable { backend: "dense", reason: err.to_string() }
    }

    /// Whether the retriever may swallow this error and degrade.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RetrievalError::BackendUnavailable { .. } | RetrievalError::EmbeddingFailure(_))
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
