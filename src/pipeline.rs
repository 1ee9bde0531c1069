//! Question-answering pipeline.
//!
//! [`QaPipeline::answer`] takes one question through a fixed sequence of
//! stages ([`QueryStage`]):
//!
//! ```text
//! Received ──▶ Embedded ──▶ Searched ──┬──▶ NoMatch
//!                                      └──▶ ContextBuilt ──▶ Answered
//! ```
//!
//! 1. **Received**: the question is trimmed; empty or oversized questions
//!    fail with [`RagError::InvalidQuery`] before any embedding or search.
//! 2. **Embedded**: the question is embedded with the same model that built
//!    the index.
//! 3. **Searched**: the `k` most relevant chunks are retrieved.
//! 4. **NoMatch**: no results, or the best score is below `min_relevance`.
//!    The model is not called and the answer carries no sources.
//! 5. **ContextBuilt**: chunk texts are joined and rendered into the prompt.
//! 6. **Answered**: the model is invoked once and its response normalized.
//!
//! Per-question state lives on the stack of `answer`; a pipeline is shared
//! across concurrent requests behind an `Arc`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::llm::ChatModel;
use crate::models::{Answer, ScoredChunk};
use crate::prompt::{build_context, extract_answer_text, render_prompt, DEFAULT_PROMPT_TEMPLATE};

/// Stages of a single question, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Received,
    Embedded,
    Searched,
    NoMatch,
    ContextBuilt,
    Answered,
}

/// Retrieval and prompting parameters.
#[derive(Debug, Clone)]
pub struct QaSettings {
    pub k: usize,
    pub min_relevance: f32,
    pub max_chars: usize,
    pub prompt_template: String,
    pub model_timeout: Duration,
}

impl Default for QaSettings {
    fn default() -> Self {
        Self {
            k: 3,
            min_relevance: 0.7,
            max_chars: 2000,
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            model_timeout: Duration::from_secs(60),
        }
    }
}

impl QaSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            k: config.retrieval.k,
            min_relevance: config.retrieval.min_relevance,
            max_chars: config.query.max_chars,
            prompt_template: config.query.prompt_template.clone(),
            model_timeout: Duration::from_secs(config.model.timeout_secs),
        }
    }
}

/// Outcome of the retrieval half of the pipeline.
#[derive(Debug, Clone)]
pub enum Retrieval {
    /// The relevance gate rejected the results.
    NoMatch(Answer),
    /// Relevant context was found and rendered into a prompt.
    Context {
        prompt: String,
        results: Vec<ScoredChunk>,
    },
}

/// Text returned when nothing relevant was retrieved.
pub fn no_match_text(query: &str) -> String {
    format!("No relevant results found for: '{}'", query)
}

/// Answers questions against a vector index. Construct via [`QaPipeline::builder`].
pub struct QaPipeline {
    settings: QaSettings,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    model: Arc<dyn ChatModel>,
}

impl std::fmt::Debug for QaPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QaPipeline")
            .field("settings", &self.settings)
            .field("embedder", &self.embedder.model_name())
            .field("model", &self.model.model_name())
            .field("entries", &self.index.len())
            .finish()
    }
}

impl QaPipeline {
    pub fn builder() -> QaPipelineBuilder {
        QaPipelineBuilder::default()
    }

    pub fn settings(&self) -> &QaSettings {
        &self.settings
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Answer one question.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidQuery`] for an empty or oversized question.
    /// - [`RagError::EmbeddingFailure`] if the question cannot be embedded.
    /// - [`RagError::ModelInvocationFailure`] if the model call fails or times out.
    ///
    /// A model response without extractable text is not an error; its
    /// answer is a fixed marker string.
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        let retrieval = self.retrieve(query).await?;
        self.answer_from(retrieval).await
    }

    /// Finish a question from an earlier [`retrieve`](Self::retrieve)
    /// without embedding or searching again.
    ///
    /// A [`Retrieval::NoMatch`] is returned as is and the model is not called.
    pub async fn answer_from(&self, retrieval: Retrieval) -> Result<Answer> {
        let (results, prompt) = match retrieval {
            Retrieval::NoMatch(answer) => return Ok(answer),
            Retrieval::Context { prompt, results } => (results, prompt),
        };

        let call = self.model.invoke(&prompt);
        let content = match tokio::time::timeout(self.settings.model_timeout, call).await {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => {
                error!(error = %e, model = self.model.model_name(), "model invocation failed");
                return Err(match e {
                    RagError::ModelInvocationFailure(_) => e,
                    other => RagError::ModelInvocationFailure(other.to_string()),
                });
            }
            Err(_) => {
                error!(
                    timeout_secs = self.settings.model_timeout.as_secs(),
                    "model invocation timed out"
                );
                return Err(RagError::ModelInvocationFailure(format!(
                    "model did not answer within {}s",
                    self.settings.model_timeout.as_secs()
                )));
            }
        };

        let answer = Answer {
            text: extract_answer_text(&content),
            sources: results.iter().map(|r| r.chunk.source_id.clone()).collect(),
        };
        debug!(stage = ?QueryStage::Answered, sources = answer.sources.len());
        info!(
            model = self.model.model_name(),
            sources = answer.sources.len(),
            "answered question"
        );
        Ok(answer)
    }

    /// Run every stage up to (not including) the model call.
    ///
    /// # Errors
    ///
    /// [`RagError::InvalidQuery`] and [`RagError::EmbeddingFailure`] as for
    /// [`answer`](Self::answer).
    pub async fn retrieve(&self, query: &str) -> Result<Retrieval> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidQuery("question is empty".to_string()));
        }
        let len = query.chars().count();
        if len > self.settings.max_chars {
            return Err(RagError::InvalidQuery(format!(
                "question is {} characters, maximum is {}",
                len, self.settings.max_chars
            )));
        }
        debug!(stage = ?QueryStage::Received, chars = len);

        let vector = self.embedder.embed(query).await.map_err(|e| {
            error!(error = %e, "query embedding failed");
            e
        })?;
        debug!(stage = ?QueryStage::Embedded, dims = vector.len());

        let results = self.index.search(&vector, self.settings.k).await?;
        debug!(
            stage = ?QueryStage::Searched,
            results = results.len(),
            top_score = results.first().map(|r| r.score)
        );

        let relevant = results
            .first()
            .is_some_and(|top| top.score >= self.settings.min_relevance);
        if !relevant {
            debug!(stage = ?QueryStage::NoMatch, min_relevance = self.settings.min_relevance);
            info!(query = %query, "no relevant results");
            return Ok(Retrieval::NoMatch(Answer {
                text: no_match_text(query),
                sources: Vec::new(),
            }));
        }

        let context = build_context(&results);
        let prompt = render_prompt(&self.settings.prompt_template, &context, query);
        debug!(stage = ?QueryStage::ContextBuilt, prompt_chars = prompt.chars().count());
        info!(query = %query, results = results.len(), "retrieved context");

        Ok(Retrieval::Context { prompt, results })
    }
}

/// Builder for [`QaPipeline`].
///
/// `embedder`, `index`, and `model` are required; settings default to
/// [`QaSettings::default`].
#[derive(Default)]
pub struct QaPipelineBuilder {
    settings: Option<QaSettings>,
    embedder: Option<Arc<dyn Embedder>>,
    index: Option<Arc<dyn VectorIndex>>,
    model: Option<Arc<dyn ChatModel>>,
}

impl QaPipelineBuilder {
    pub fn settings(mut self, settings: QaSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Build the pipeline.
    ///
    /// # Errors
    ///
    /// - [`RagError::Config`] if a required dependency is missing.
    /// - [`RagError::ModelMismatch`] if the index was built by a different
    ///   embedding model or dimension than `embedder`.
    pub fn build(self) -> Result<QaPipeline> {
        let embedder = self
            .embedder
            .ok_or_else(|| RagError::Config("embedder is required".to_string()))?;
        let index = self
            .index
            .ok_or_else(|| RagError::Config("index is required".to_string()))?;
        let model = self
            .model
            .ok_or_else(|| RagError::Config("model is required".to_string()))?;

        if let Some(manifest) = index.manifest() {
            if manifest.model != embedder.model_name() || manifest.dims != embedder.dims() {
                return Err(RagError::ModelMismatch {
                    index_model: manifest.model,
                    index_dims: manifest.dims,
                    embedder_model: embedder.model_name().to_string(),
                    embedder_dims: embedder.dims(),
                });
            }
        }

        Ok(QaPipeline {
            settings: self.settings.unwrap_or_default(),
            embedder,
            index,
            model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_match_text() {
        assert_eq!(
            no_match_text("what is offside?"),
            "No relevant results found for: 'what is offside?'"
        );
    }

    #[test]
    fn test_default_settings() {
        let s = QaSettings::default();
        assert_eq!(s.k, 3);
        assert!((s.min_relevance - 0.7).abs() < f32::EPSILON);
        assert!(s.prompt_template.contains("{context}"));
    }
}
