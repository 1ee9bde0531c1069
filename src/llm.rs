//! Language-model clients.
//!
//! [`ChatModel`] is the single-shot completion seam used by
//! [`crate::pipeline::QaPipeline`]. Each provider maps its response onto
//! [`ModelContent`]: providers that return a plain string produce
//! [`ModelContent::PlainText`]; providers that return structured parts
//! produce [`ModelContent::Blocks`]. Callers normalize both with
//! [`crate::prompt::extract_answer_text`].
//!
//! | Provider | Endpoint | Credentials |
//! |----------|----------|-------------|
//! | [`GeminiChat`] | `v1beta/models/{model}:generateContent` | `GOOGLE_API_KEY` |
//! | [`OpenAIChat`] | `/v1/chat/completions` | `OPENAI_API_KEY` |
//! | [`OllamaChat`] | `/api/chat` | none |
//!
//! Requests are bounded by `model.timeout_secs`. There is no retry: a failed
//! call surfaces as [`RagError::ModelInvocationFailure`].

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::{RagError, Result};
use crate::prompt::{ContentBlock, ModelContent};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// A language model that answers a single prompt.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn invoke(&self, prompt: &str) -> Result<ModelContent>;
}

/// Create the configured [`ChatModel`].
pub fn create_chat_model(config: &ModelConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiChat::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => Err(RagError::Config(format!("Unknown model provider: {}", other))),
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| {
            RagError::ModelInvocationFailure(format!("failed to build HTTP client: {}", e))
        })
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| RagError::Config(format!("{} environment variable not set", name)))
}

async fn send_json(request: reqwest::RequestBuilder, label: &str) -> Result<serde_json::Value> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            RagError::ModelInvocationFailure(format!("{} request timed out", label))
        } else {
            RagError::ModelInvocationFailure(format!("{} request failed: {}", label, e))
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RagError::ModelInvocationFailure(format!(
            "{} API error {}: {}",
            label, status, body
        )));
    }

    response
        .json()
        .await
        .map_err(|e| {
            RagError::ModelInvocationFailure(format!("{} returned invalid JSON: {}", label, e))
        })
}

// ============ Gemini ============

/// Google Gemini via the Generative Language REST API.
pub struct GeminiChat {
    model: String,
    temperature: f32,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiChat {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        Ok(Self {
            model: config
                .model
                .trim_start_matches("models/")
                .to_string(),
            temperature: config.temperature,
            api_key: require_env("GOOGLE_API_KEY")?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            client: http_client(config.timeout_secs)?,
        })
    }

    /// List models available to the API key.
    pub async fn list_models(&self) -> Result<Vec<GeminiModelInfo>> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(format!("{}/models", self.base_url.trim_end_matches('/')))
                .header("x-goog-api-key", &self.api_key)
                .query(&[("pageSize", "1000")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let json = send_json(request, "Gemini").await?;
            models.extend(parse_gemini_models(&json));

            page_token = json
                .get("nextPageToken")
                .and_then(|t| t.as_str())
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }

        Ok(models)
    }
}

/// One entry of the Gemini `models.list` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeminiModelInfo {
    pub name: String,
    pub description: String,
    pub supported_generation_methods: Vec<String>,
}

impl GeminiModelInfo {
    pub fn supports_generate_content(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == "generateContent")
    }
}

fn parse_gemini_models(json: &serde_json::Value) -> Vec<GeminiModelInfo> {
    json.get("models")
        .and_then(|m| m.as_array())
        .map(|models| {
            models
                .iter()
                .map(|m| GeminiModelInfo {
                    name: m["name"].as_str().unwrap_or_default().to_string(),
                    description: m["description"].as_str().unwrap_or_default().to_string(),
                    supported_generation_methods: m["supportedGenerationMethods"]
                        .as_array()
                        .map(|a| {
                            a.iter()
                                .filter_map(|v| v.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Map `candidates[0].content.parts` onto blocks. No candidate yields no blocks.
fn parse_gemini_response(json: &serde_json::Value) -> ModelContent {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .cloned()
        .unwrap_or_default();

    ModelContent::Blocks(
        parts
            .iter()
            .map(|part| {
                let kind = if part.get("thought").and_then(|t| t.as_bool()) == Some(true) {
                    "thought"
                } else if part.get("text").is_some() {
                    "text"
                } else {
                    "other"
                };
                ContentBlock {
                    kind: Some(kind.to_string()),
                    text: part.get("text").and_then(|t| t.as_str()).map(str::to_string),
                }
            })
            .collect(),
    )
}

#[async_trait]
impl ChatModel for GeminiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &str) -> Result<ModelContent> {
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });
        debug!(model = %self.model, "invoking Gemini");

        let request = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url.trim_end_matches('/'),
                self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body);

        let json = send_json(request, "Gemini").await?;
        Ok(parse_gemini_response(&json))
    }
}

// ============ OpenAI ============

/// OpenAI (or any compatible gateway) chat completions.
pub struct OpenAIChat {
    model: String,
    temperature: f32,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIChat {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            api_key: require_env("OPENAI_API_KEY")?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            client: http_client(config.timeout_secs)?,
        })
    }
}

/// `choices[0].message.content` is either a string or an array of parts.
fn parse_openai_response(json: &serde_json::Value) -> ModelContent {
    match json.pointer("/choices/0/message/content") {
        Some(serde_json::Value::String(text)) => ModelContent::PlainText(text.clone()),
        Some(serde_json::Value::Array(parts)) => ModelContent::Blocks(
            parts
                .iter()
                .map(|part| ContentBlock {
                    kind: part.get("type").and_then(|t| t.as_str()).map(str::to_string),
                    text: part.get("text").and_then(|t| t.as_str()).map(str::to_string),
                })
                .collect(),
        ),
        _ => ModelContent::Blocks(Vec::new()),
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &str) -> Result<ModelContent> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });
        debug!(model = %self.model, "invoking OpenAI");

        let request = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.api_key)
            .json(&body);

        let json = send_json(request, "OpenAI").await?;
        Ok(parse_openai_response(&json))
    }
}

// ============ Ollama ============

/// A local Ollama chat model.
pub struct OllamaChat {
    model: String,
    temperature: f32,
    base_url: String,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            client: http_client(config.timeout_secs)?,
        })
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> ModelContent {
    match json.pointer("/message/content").and_then(|c| c.as_str()) {
        Some(text) => ModelContent::PlainText(text.to_string()),
        None => ModelContent::Blocks(Vec::new()),
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &str) -> Result<ModelContent> {
        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "options": { "temperature": self.temperature },
            "messages": [{ "role": "user", "content": prompt }],
        });
        debug!(model = %self.model, "invoking Ollama");

        let request = self
            .client
            .post(format!("{}/api/chat", self.base_url.trim_end_matches('/')))
            .json(&body);

        let json = send_json(request, "Ollama").await?;
        Ok(parse_ollama_response(&json))
    }
}

/// The `rag models` command: print Gemini models that support `generateContent`.
pub async fn run_list_models(config: &ModelConfig) -> anyhow::Result<()> {
    let client = GeminiChat::new(config)?;
    let models = client.list_models().await?;

    let usable: Vec<&GeminiModelInfo> = models
        .iter()
        .filter(|m| m.supports_generate_content())
        .collect();

    println!("Models available to this API key that support generateContent:");
    println!();
    for m in &usable {
        println!("  {}", m.name);
        if !m.description.is_empty() {
            println!("      {}", m.description);
        }
        println!("      methods: {}", m.supported_generation_methods.join(", "));
    }
    println!();
    println!(
        "{} of {} models usable. Set [model].model to one of the names above.",
        usable.len(),
        models.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{extract_answer_text, EXTRACTION_FAILURE_MARKER};

    #[test]
    fn test_gemini_parts_become_blocks() {
        let json = serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Blue." }, { "text": "Extra." }] }
            }]
        });
        let content = parse_gemini_response(&json);
        assert_eq!(extract_answer_text(&content), "Blue.");
    }

    #[test]
    fn test_gemini_without_candidates_degrades() {
        let json = serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let content = parse_gemini_response(&json);
        assert_eq!(content, ModelContent::Blocks(vec![]));
        assert_eq!(extract_answer_text(&content), EXTRACTION_FAILURE_MARKER);
    }

    #[test]
    fn test_gemini_thought_part_kind() {
        let json = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "hmm", "thought": true }] } }]
        });
        match parse_gemini_response(&json) {
            ModelContent::Blocks(blocks) => assert_eq!(blocks[0].kind.as_deref(), Some("thought")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_openai_string_content() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Blue." } }]
        });
        assert_eq!(
            parse_openai_response(&json),
            ModelContent::PlainText("Blue.".to_string())
        );
    }

    #[test]
    fn test_openai_array_content() {
        let json = serde_json::json!({
            "choices": [{ "message": { "content": [{ "type": "text", "text": "Blue." }] } }]
        });
        let content = parse_openai_response(&json);
        assert_eq!(extract_answer_text(&content), "Blue.");
    }

    #[test]
    fn test_openai_null_content_degrades() {
        let json = serde_json::json!({ "choices": [{ "message": { "content": null } }] });
        assert_eq!(
            extract_answer_text(&parse_openai_response(&json)),
            EXTRACTION_FAILURE_MARKER
        );
    }

    #[test]
    fn test_ollama_content() {
        let json = serde_json::json!({ "message": { "role": "assistant", "content": "Blue." } });
        assert_eq!(
            parse_ollama_response(&json),
            ModelContent::PlainText("Blue.".to_string())
        );
    }

    #[test]
    fn test_parse_gemini_models() {
        let json = serde_json::json!({
            "models": [
                {
                    "name": "models/gemini-flash-latest",
                    "description": "Fast",
                    "supportedGenerationMethods": ["generateContent", "countTokens"]
                },
                {
                    "name": "models/text-embedding-004",
                    "description": "Embeddings",
                    "supportedGenerationMethods": ["embedContent"]
                }
            ]
        });
        let models = parse_gemini_models(&json);
        assert_eq!(models.len(), 2);
        assert!(models[0].supports_generate_content());
        assert!(!models[1].supports_generate_content());
    }
}
