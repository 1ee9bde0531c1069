//! Prompt assembly and model response normalization.
//!
//! Retrieved chunks are joined into a single context block and rendered into
//! the prompt template. On the way back, [`extract_answer_text`] turns any
//! [`ModelContent`] shape into one answer string.

use tracing::warn;

use crate::models::ScoredChunk;

/// Default prompt. Constrains the model to the retrieved context.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Answer the question based only on the following context:\n\n{context}\n\n---\n\nAnswer the question based on the above context: {question}";

/// Separator placed between chunk texts in the context block.
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Answer text used when a block-list response carries no extractable text.
pub const EXTRACTION_FAILURE_MARKER: &str = "Error: could not extract text from the model response";

/// Content returned by a language model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelContent {
    PlainText(String),
    Blocks(Vec<ContentBlock>),
}

/// One structured part of a model response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContentBlock {
    /// Provider-specific part type (`"text"`, `"thought"`, ...), if reported.
    pub kind: Option<String>,
    pub text: Option<String>,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: Some("text".to_string()),
            text: Some(text.into()),
        }
    }
}

/// Join chunk texts in retrieval order.
pub fn build_context(results: &[ScoredChunk]) -> String {
    results
        .iter()
        .map(|r| r.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}

/// Substitute `{context}` and `{question}` into `template`.
///
/// Context is substituted first and the question last, so braces inside the
/// retrieved text are never re-expanded.
pub fn render_prompt(template: &str, context: &str, question: &str) -> String {
    let mut out = String::with_capacity(template.len() + context.len() + question.len());
    let mut rest = template;
    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix("{context}") {
            out.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{question}") {
            out.push_str(question);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Normalize a model response to its answer text.
///
/// Plain text is returned unchanged. A block list yields the text of its
/// first block; an empty list or a first block without text yields
/// [`EXTRACTION_FAILURE_MARKER`].
pub fn extract_answer_text(content: &ModelContent) -> String {
    match content {
        ModelContent::PlainText(text) => text.clone(),
        ModelContent::Blocks(blocks) => match blocks.first().and_then(|b| b.text.as_ref()) {
            Some(text) => text.clone(),
            None => {
                warn!(
                    blocks = blocks.len(),
                    "model response had no text in its first block"
                );
                EXTRACTION_FAILURE_MARKER.to_string()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn scored(text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: "id".to_string(),
                source_id: "doc.txt".to_string(),
                page: None,
                chunk_index: 0,
                start_offset: 0,
                text: text.to_string(),
                hash: String::new(),
            },
            score,
        }
    }

    #[test]
    fn test_build_context_joins_in_order() {
        let ctx = build_context(&[scored("one", 0.9), scored("two", 0.8)]);
        assert_eq!(ctx, "one\n\n---\n\ntwo");
    }

    #[test]
    fn test_build_context_single() {
        assert_eq!(build_context(&[scored("only", 0.9)]), "only");
    }

    #[test]
    fn test_render_default_template() {
        let prompt = render_prompt(
            DEFAULT_PROMPT_TEMPLATE,
            "The sky is blue.",
            "What color is the sky?",
        );
        assert!(prompt.starts_with(
            "Answer the question based only on the following context:\n\nThe sky is blue."
        ));
        assert!(prompt.ends_with("based on the above context: What color is the sky?"));
    }

    #[test]
    fn test_render_does_not_expand_inside_values() {
        let prompt = render_prompt("{context}|{question}", "literal {question}", "q");
        assert_eq!(prompt, "literal {question}|q");
    }

    #[test]
    fn test_render_keeps_unknown_braces() {
        assert_eq!(render_prompt("{x} {question}", "", "q"), "{x} q");
    }

    #[test]
    fn test_plain_and_single_block_agree() {
        let plain = extract_answer_text(&ModelContent::PlainText("Blue.".to_string()));
        let blocks = extract_answer_text(&ModelContent::Blocks(vec![ContentBlock::text("Blue.")]));
        assert_eq!(plain, blocks);
    }

    #[test]
    fn test_first_block_wins() {
        let content = ModelContent::Blocks(vec![
            ContentBlock::text("first"),
            ContentBlock::text("second"),
        ]);
        assert_eq!(extract_answer_text(&content), "first");
    }

    #[test]
    fn test_missing_text_yields_marker() {
        assert_eq!(
            extract_answer_text(&ModelContent::Blocks(vec![])),
            EXTRACTION_FAILURE_MARKER
        );
        let no_text = ContentBlock {
            kind: Some("image".to_string()),
            text: None,
        };
        assert_eq!(
            extract_answer_text(&ModelContent::Blocks(vec![no_text, ContentBlock::text("later")])),
            EXTRACTION_FAILURE_MARKER
        );
    }
}
