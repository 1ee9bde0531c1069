//! Core data models used throughout the harness.
//!
//! These types represent the documents, chunks, index entries, and answers
//! that flow through the ingestion and question-answering pipelines.

use serde::{Deserialize, Serialize};

/// Raw source text produced by the document loader.
///
/// One file yields one `Document`, except PDFs, which yield one per page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path of the source file relative to the corpus root.
    pub source_id: String,
    /// 1-based page number for paginated formats.
    pub page: Option<u32>,
    pub text: String,
}

impl Document {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            page: None,
            text: text.into(),
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

/// A contiguous span of a document's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source_id: String,
    pub page: Option<u32>,
    /// Position of this chunk within its document, starting at 0.
    pub chunk_index: i64,
    /// Character (not byte) offset of the chunk start in the document.
    pub start_offset: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A chunk together with its embedding, as owned by a vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Describes the embedding space an index was built in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub model: String,
    pub dims: usize,
    pub chunk_count: usize,
    /// Unix timestamp (seconds) of the rebuild.
    pub built_at: i64,
}

/// A retrieved chunk and its relevance score (cosine similarity, higher is better).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Final output of the question-answering pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// `source_id` of every chunk the answer was grounded in, in retrieval
    /// order. Duplicates are kept.
    pub sources: Vec<String>,
}

impl Answer {
    /// True when the relevance gate rejected the retrieval and no context
    /// was sent to the model.
    pub fn is_no_match(&self) -> bool {
        self.sources.is_empty()
    }
}
