//! Overlapping fixed-size text chunker.
//!
//! Splits each [`Document`] into [`Chunk`]s of at most `chunk_size`
//! characters, where consecutive chunks share exactly `overlap` characters.
//! Lengths and offsets are counted in Unicode scalar values (`char`s), never
//! bytes, so multi-byte text is never cut inside a code point.
//!
//! # Algorithm
//!
//! 1. Start a window at offset 0 of the document.
//! 2. The window covers `chunk_size` chars (or the rest of the document).
//! 3. In [`Boundary::Structural`] mode, move the window end back to the last
//!    paragraph break, then line break, then sentence end, then space that
//!    still leaves the chunk longer than `overlap`. Otherwise cut hard.
//! 4. Emit the chunk; the next window starts at `end - overlap`.
//! 5. Stop once a chunk reaches the end of the document.
//!
//! In [`Boundary::Hard`] mode a document of length `L` yields exactly
//! `ceil((L - O) / (C - O))` chunks (one when `L <= C`). Structural mode can
//! yield more, never fewer.
//!
//! Each chunk receives a UUID plus a SHA-256 hash of its text.
//!
//! # Example
//!
//! ```rust
//! use rag_harness::chunk::split;
//! use rag_harness::models::Document;
//!
//! let docs = vec![Document::new("notes.txt", "Hello world.")];
//! let chunks = split(&docs, 1000, 200).unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].start_offset, 0);
//! ```

use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::{Chunk, Document};

/// Where chunk windows are allowed to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    /// Always cut at exactly `chunk_size` characters.
    Hard,
    /// Prefer paragraph, line, sentence, then word breaks before cutting hard.
    #[default]
    Structural,
}

/// Break candidates, strongest first. Separators within a tier are equal.
const BREAK_TIERS: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "! ", "? "], &[" "]];

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSettings {
    chunk_size: usize,
    overlap: usize,
    boundary: Boundary,
}

impl ChunkSettings {
    /// Fails unless `0 <= overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize, boundary: Boundary) -> Result<Self> {
        if overlap >= chunk_size {
            return Err(RagError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
            boundary,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn boundary(&self) -> Boundary {
        self.boundary
    }
}

/// Split documents with structural boundary detection.
///
/// Returns chunks in document order, then offset order. An empty document
/// list yields an empty vector.
pub fn split(documents: &[Document], chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    let settings = ChunkSettings::new(chunk_size, overlap, Boundary::Structural)?;
    Ok(split_with(documents, &settings))
}

/// Split documents using explicit settings.
pub fn split_with(documents: &[Document], settings: &ChunkSettings) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| chunk_document(doc, settings))
        .collect()
}

/// Chunk a single document. Empty text produces no chunks.
pub fn chunk_document(doc: &Document, settings: &ChunkSettings) -> Vec<Chunk> {
    let chars: Vec<char> = doc.text.chars().collect();
    let len = chars.len();
    if len == 0 {
        return Vec::new();
    }

    // Byte offset of every char position, plus the end of the string.
    let byte_at: Vec<usize> = doc
        .text
        .char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(doc.text.len()))
        .collect();

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut chunk_index: i64 = 0;

    loop {
        let window_end = (start + settings.chunk_size).min(len);
        let end = if window_end < len && settings.boundary == Boundary::Structural {
            snap_end(&chars, start + settings.overlap + 1, window_end)
        } else {
            window_end
        };

        let text = &doc.text[byte_at[start]..byte_at[end]];
        chunks.push(make_chunk(doc, chunk_index, start, text));

        if end >= len {
            break;
        }
        start = end - settings.overlap;
        chunk_index += 1;
    }

    chunks
}

/// Pick the best break position in `[min_end, max_end]`, or `max_end`.
fn snap_end(chars: &[char], min_end: usize, max_end: usize) -> usize {
    for tier in BREAK_TIERS {
        let best = tier
            .iter()
            .filter_map(|sep| last_break(chars, sep, min_end, max_end))
            .max();
        if let Some(end) = best {
            return end;
        }
    }
    max_end
}

/// Largest `e` in `[min_end, max_end]` such that `chars[..e]` ends with `sep`.
fn last_break(chars: &[char], sep: &str, min_end: usize, max_end: usize) -> Option<usize> {
    let sep: Vec<char> = sep.chars().collect();
    let n = sep.len();
    let lo = min_end.max(n);
    if lo > max_end {
        return None;
    }
    (lo..=max_end).rev().find(|&e| chars[e - n..e] == sep[..])
}

fn make_chunk(doc: &Document, index: i64, start_offset: usize, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source_id: doc.source_id.clone(),
        page: doc.page,
        chunk_index: index,
        start_offset,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hard(c: usize, o: usize) -> ChunkSettings {
        ChunkSettings::new(c, o, Boundary::Hard).unwrap()
    }

    #[test]
    fn test_small_text_single_chunk() {
        let docs = vec![Document::new("a.txt", "Hello, world!")];
        let chunks = split(&docs, 1000, 200).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_empty_inputs() {
        assert!(split(&[], 20, 5).unwrap().is_empty());
        let docs = vec![Document::new("empty.txt", "")];
        assert!(split(&docs, 20, 5).unwrap().is_empty());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(matches!(split(&[], 10, 10), Err(RagError::Config(_))));
        assert!(ChunkSettings::new(10, 9, Boundary::Hard).is_ok());
    }

    #[test]
    fn test_hard_split_offsets() {
        let text = "The sky is blue. Water is wet. Fire is hot.";
        let chunks = split_with(&[Document::new("d", text)], &hard(20, 5));
        assert_eq!(chunks.len(), 3);
        let offsets: Vec<usize> = chunks.iter().map(|c| c.start_offset).collect();
        assert_eq!(offsets, vec![0, 15, 30]);
        assert_eq!(chunks[0].text, "The sky is blue. Wat");
        assert_eq!(chunks[2].text, " Fire is hot.");
    }

    #[test]
    fn test_structural_prefers_sentence_end() {
        let text = "The sky is blue. Water is wet. Fire is hot.";
        let settings = ChunkSettings::new(20, 5, Boundary::Structural).unwrap();
        let chunks = split_with(&[Document::new("d", text)], &settings);
        assert_eq!(chunks[0].text, "The sky is blue. ");
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 20));
    }

    #[test]
    fn test_structural_prefers_paragraphs() {
        let text = "First paragraph here.\n\nSecond one follows after it.";
        let settings = ChunkSettings::new(30, 0, Boundary::Structural).unwrap();
        let chunks = split_with(&[Document::new("d", text)], &settings);
        assert_eq!(chunks[0].text, "First paragraph here.\n\n");
        assert_eq!(chunks[1].start_offset, 23);
    }

    #[test]
    fn test_multibyte_text_is_cut_on_char_boundaries() {
        let text = "¿Qué es un fuera de juego? Él está adelantado.";
        let chunks = split_with(&[Document::new("d", text)], &hard(10, 3));
        for c in &chunks {
            assert!(c.text.chars().count() <= 10);
        }
        let rebuilt: String = chunks[0].text.chars().take(7).collect();
        assert_eq!(rebuilt, "¿Qué es");
    }

    #[test]
    fn test_document_then_offset_order() {
        let docs = vec![
            Document::new("b.txt", "bbbbbbbbbbbbbbbbbbbbbbbbb"),
            Document::new("a.txt", "aaaaaaaaaaaaaaaaaaaaaaaaa"),
        ];
        let chunks = split_with(&docs, &hard(10, 2));
        let first_a = chunks.iter().position(|c| c.source_id == "a.txt").unwrap();
        assert!(chunks[..first_a].iter().all(|c| c.source_id == "b.txt"));
        for pair in chunks[..first_a].windows(2) {
            assert!(pair[0].start_offset < pair[1].start_offset);
        }
    }

    #[test]
    fn test_page_metadata_carried() {
        let docs = vec![Document::new("laws.pdf", "Law 11 covers offside.").with_page(42)];
        let chunks = split(&docs, 100, 10).unwrap();
        assert_eq!(chunks[0].page, Some(42));
        assert_eq!(chunks[0].source_id, "laws.pdf");
    }

    #[test]
    fn test_deterministic_text_and_hash() {
        let docs = vec![Document::new("d", "Alpha beta gamma delta epsilon zeta eta theta")];
        let c1 = split(&docs, 12, 4).unwrap();
        let c2 = split(&docs, 12, 4).unwrap();
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
            assert_eq!(a.start_offset, b.start_offset);
        }
    }
}
