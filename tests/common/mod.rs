//! Deterministic fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rag_harness::embedding::Embedder;
use rag_harness::error::{RagError, Result};
use rag_harness::llm::ChatModel;
use rag_harness::prompt::ModelContent;

pub const VOCAB: &[&str] = &[
    "sky", "blue", "water", "wet", "fire", "hot", "grass", "green", "offside",
];

/// Words counted on another word's dimension.
const SYNONYMS: &[(&str, &str)] = &[("color", "blue"), ("colour", "blue")];

/// One dimension per vocabulary word, counting occurrences. Other words are ignored.
///
/// "What color is the sky?" and "The sky is blue." embed identically.
pub struct VocabEmbedder {
    name: String,
    pub calls: AtomicUsize,
}

impl VocabEmbedder {
    pub fn new() -> Self {
        Self::named("fake-vocab")
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; VOCAB.len()];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            let word = SYNONYMS
                .iter()
                .find(|(from, _)| *from == word)
                .map_or(word.as_str(), |(_, to)| *to);
            if let Some(i) = VOCAB.iter().position(|v| *v == word) {
                v[i] += 1.0;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for VocabEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dims(&self) -> usize {
        VOCAB.len()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Always fails.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "fake-vocab"
    }

    fn dims(&self) -> usize {
        VOCAB.len()
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(RagError::EmbeddingFailure("backend offline".to_string()))
    }
}

/// How the fake model answers.
pub enum Reply {
    /// Echo the first context chunk from the prompt.
    Extractive,
    Fixed(ModelContent),
    Fail,
    Hang,
}

pub struct FakeModel {
    reply: Reply,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeModel {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

fn first_context_chunk(prompt: &str) -> String {
    let after = prompt
        .split_once("following context:\n\n")
        .map(|(_, rest)| rest)
        .unwrap_or(prompt);
    after
        .split("\n\n---\n\n")
        .next()
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl ChatModel for FakeModel {
    fn model_name(&self) -> &str {
        "fake-model"
    }

    async fn invoke(&self, prompt: &str) -> Result<ModelContent> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Reply::Extractive => Ok(ModelContent::PlainText(first_context_chunk(prompt))),
            Reply::Fixed(content) => Ok(content.clone()),
            Reply::Fail => Err(RagError::ModelInvocationFailure("quota exceeded".to_string())),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(ModelContent::PlainText("too late".to_string()))
            }
        }
    }
}
