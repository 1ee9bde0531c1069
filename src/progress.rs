//! Ingestion progress reporting.
//!
//! Reports observable progress during `rag ingest` so users see how many
//! documents were found and how far embedding has got. Progress is emitted
//! on **stderr** so stdout remains parseable for scripts.

use std::io::{IsTerminal, Write};

/// A single progress event for ingestion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestProgressEvent {
    /// Walking the corpus directory. Total unknown.
    Loading,
    /// Documents loaded and split.
    Chunked { documents: u64, chunks: u64 },
    /// n chunks embedded out of total.
    Embedding { n: u64, total: u64 },
    /// Writing the new index generation.
    Writing { chunks: u64 },
}

/// Reports ingestion progress. Implementations write to stderr (human or JSON).
pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "ingest  embedding  1,234 / 5,000 chunks".
pub struct StderrProgress;

impl StderrProgress {
    fn line(event: &IngestProgressEvent) -> String {
        match event {
            IngestProgressEvent::Loading => "ingest  loading documents...\n".to_string(),
            IngestProgressEvent::Chunked { documents, chunks } => format!(
                "ingest  chunked  {} documents into {} chunks\n",
                format_number(*documents),
                format_number(*chunks)
            ),
            IngestProgressEvent::Embedding { n, total } => format!(
                "ingest  embedding  {} / {} chunks\n",
                format_number(*n),
                format_number(*total)
            ),
            IngestProgressEvent::Writing { chunks } => {
                format!("ingest  writing  {} chunks\n", format_number(*chunks))
            }
        }
    }
}

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(Self::line(&event).as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn value(event: &IngestProgressEvent) -> serde_json::Value {
        match event {
            IngestProgressEvent::Loading => serde_json::json!({
                "event": "progress",
                "phase": "loading"
            }),
            IngestProgressEvent::Chunked { documents, chunks } => serde_json::json!({
                "event": "progress",
                "phase": "chunked",
                "documents": documents,
                "chunks": chunks
            }),
            IngestProgressEvent::Embedding { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "n": n,
                "total": total
            }),
            IngestProgressEvent::Writing { chunks } => serde_json::json!({
                "event": "progress",
                "phase": "writing",
                "chunks": chunks
            }),
        }
    }
}

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::value(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a terminal, otherwise off.
    pub fn default_for_tty() -> Self {
        if std::io::stderr().is_terminal() {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
