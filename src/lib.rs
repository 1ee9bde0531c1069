//! # RAG Harness
//!
//! Retrieval-augmented question answering over a local document corpus.
//!
//! Documents are split into overlapping chunks, embedded, and stored in a
//! persisted vector index. Each question is embedded with the same model,
//! the most relevant chunks are retrieved, and a language model answers from
//! that context alone. If nothing relevant is found the model is not called.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌──────────┐
//! │  Loader  │──▶│ Chunker │──▶│ Embedder │──▶│  Index   │
//! │ md/txt/  │   │ overlap │   │ openai/  │   │ SQLite   │
//! │   pdf    │   │         │   │ ollama/  │   │ snapshot │
//! └──────────┘   └─────────┘   │  local   │   └────┬─────┘
//!                              └──────────┘        │
//!                      ┌───────────────────────────┤
//!                      ▼                           ▼
//!                ┌──────────┐   relevance    ┌──────────┐
//!                │ Question │──▶  gate  ───▶ │   LLM    │──▶ Answer + sources
//!                └──────────┘                └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag ingest                           # build the index from [documents].root
//! rag query "What is the offside rule?"
//! rag serve                            # POST /query on [server].bind
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`loader`] | Corpus directory walker |
//! | [`extract`] | Text and PDF extraction |
//! | [`chunk`] | Overlapping chunker |
//! | [`embedding`] | Embedder trait and providers |
//! | [`index`] | Vector index (SQLite and in-memory) |
//! | [`ingest`] | Ingestion pipeline |
//! | [`prompt`] | Prompt assembly and response normalization |
//! | [`llm`] | Language-model clients |
//! | [`pipeline`] | Question-answering pipeline |
//! | [`query`] | `rag query` command |
//! | [`server`] | HTTP server |
//! | [`progress`] | Ingestion progress reporting |
//! | [`stats`] | Index statistics |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod prompt;
pub mod query;
pub mod server;
pub mod stats;
