//! Error taxonomy for ingestion and question answering.
//!
//! Ingestion errors are fatal for the run that raised them. Query errors
//! are scoped to the single request and never touch shared state.
//!
//! An unexpected language-model response shape is deliberately *not* an
//! error: [`crate::prompt::extract_answer_text`] degrades it to a fixed
//! marker string.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the retrieval core.
#[derive(Debug, Error)]
pub enum RagError {
    /// Ingestion found no documents under the corpus root.
    #[error("no documents found under {}", root.display())]
    EmptyCorpus { root: PathBuf },

    /// The question was empty or longer than the configured maximum.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The embedding backend could not produce a vector.
    #[error("embedding failed: {0}")]
    EmbeddingFailure(String),

    /// The persisted index is missing or corrupt.
    #[error("index unavailable at {}: {reason}", path.display())]
    IndexUnavailable { path: PathBuf, reason: String },

    /// The language-model call errored or timed out.
    #[error("model invocation failed: {0}")]
    ModelInvocationFailure(String),

    /// The index was built with a different embedding model than the one configured.
    #[error(
        "index was built with embedding model '{index_model}' ({index_dims} dims) \
         but the configured embedder is '{embedder_model}' ({embedder_dims} dims); re-run ingestion"
    )]
    ModelMismatch {
        index_model: String,
        index_dims: usize,
        embedder_model: String,
        embedder_dims: usize,
    },

    /// A vector did not have the dimension the index expects.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid configuration or chunking parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem or SQLite failure while writing the index.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for RagError {
    fn from(e: sqlx::Error) -> Self {
        RagError::Storage(e.to_string())
    }
}

impl From<std::io::Error> for RagError {
    fn from(e: std::io::Error) -> Self {
        RagError::Storage(e.to_string())
    }
}

/// Result alias for the retrieval core.
pub type Result<T> = std::result::Result<T, RagError>;
