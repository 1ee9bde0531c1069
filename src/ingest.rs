//! Ingestion pipeline orchestration.
//!
//! Coordinates the full rebuild flow: loader → chunking → embedding →
//! index rebuild. Every run re-processes the whole corpus and replaces the
//! index wholesale; any error stops the run before the index is touched.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::chunk::{split_with, ChunkSettings};
use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::error::RagError;
use crate::index::{SqliteIndex, VectorIndex};
use crate::loader;
use crate::models::{Chunk, Document, IndexEntry, IndexManifest};
use crate::progress::{IngestProgressEvent, IngestProgressReporter, NoProgress, ProgressMode};

/// Summary of an ingestion run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    /// First chunk produced, shown to the user as a sanity check.
    pub example: Option<Chunk>,
    /// Manifest of the written index; `None` for a dry run.
    pub manifest: Option<IndexManifest>,
}

/// Chunks, embeds, and indexes documents.
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    settings: ChunkSettings,
    batch_size: usize,
    root: PathBuf,
    progress: Box<dyn IngestProgressReporter>,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        settings: ChunkSettings,
    ) -> Self {
        Self {
            embedder,
            index,
            settings,
            batch_size: 64,
            root: PathBuf::from("."),
            progress: Box::new(NoProgress),
        }
    }

    /// Chunks per embedding request. Zero is treated as one.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Corpus root reported in [`RagError::EmptyCorpus`].
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn progress(mut self, progress: Box<dyn IngestProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Rebuild the index from `documents`.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyCorpus`] if `documents` yields no chunks. The index
    ///   is not touched.
    /// - [`RagError::EmbeddingFailure`] or [`RagError::Storage`] from the
    ///   embedder or the index. The previous index is kept.
    pub async fn ingest(&self, documents: &[Document]) -> crate::error::Result<IngestReport> {
        let chunks = self.split(documents)?;

        let total = chunks.len();
        let mut entries = Vec::with_capacity(total);
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await.map_err(|e| {
                error!(error = %e, "embedding failed during ingestion");
                e
            })?;
            embedding::check_vectors(&vectors, texts.len(), self.embedder.dims())?;

            entries.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, vector)| IndexEntry { chunk, vector }),
            );
            self.progress.report(IngestProgressEvent::Embedding {
                n: entries.len() as u64,
                total: total as u64,
            });
        }

        let manifest = IndexManifest {
            model: self.embedder.model_name().to_string(),
            dims: self.embedder.dims(),
            chunk_count: entries.len(),
            built_at: chrono::Utc::now().timestamp(),
        };

        self.progress.report(IngestProgressEvent::Writing {
            chunks: total as u64,
        });
        self.index.rebuild(manifest.clone(), entries).await?;

        info!(
            documents = documents.len(),
            chunks = total,
            model = %manifest.model,
            "ingestion complete"
        );

        Ok(IngestReport {
            documents: documents.len(),
            chunks: total,
            example: chunks.into_iter().next(),
            manifest: Some(manifest),
        })
    }

    fn split(&self, documents: &[Document]) -> crate::error::Result<Vec<Chunk>> {
        let chunks = chunk_corpus(documents, &self.settings, &self.root)?;
        self.progress.report(IngestProgressEvent::Chunked {
            documents: documents.len() as u64,
            chunks: chunks.len() as u64,
        });
        Ok(chunks)
    }
}

/// Split documents, failing with [`RagError::EmptyCorpus`] if nothing comes out.
fn chunk_corpus(
    documents: &[Document],
    settings: &ChunkSettings,
    root: &Path,
) -> crate::error::Result<Vec<Chunk>> {
    let chunks = split_with(documents, settings);
    if chunks.is_empty() {
        return Err(RagError::EmptyCorpus {
            root: root.to_path_buf(),
        });
    }
    info!(
        documents = documents.len(),
        chunks = chunks.len(),
        "split documents into chunks"
    );
    if let Some(first) = chunks.first() {
        info!(
            source = %first.source_id,
            page = ?first.page,
            chars = first.text.chars().count(),
            "example chunk"
        );
    }
    Ok(chunks)
}

/// Chunk without embedding or writing anything.
pub fn plan(
    documents: &[Document],
    settings: &ChunkSettings,
    root: &Path,
) -> crate::error::Result<IngestReport> {
    let chunks = chunk_corpus(documents, settings, root)?;
    Ok(IngestReport {
        documents: documents.len(),
        chunks: chunks.len(),
        example: chunks.into_iter().next(),
        manifest: None,
    })
}

/// Options for `rag ingest`.
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub dry_run: bool,
    pub progress: ProgressMode,
}

/// Run ingestion for the configured corpus and print a summary to stdout.
pub async fn run_ingest(config: &Config, opts: IngestOptions) -> Result<()> {
    let reporter = opts.progress.reporter();
    reporter.report(IngestProgressEvent::Loading);
    let documents = loader::load_documents(&config.documents)?;

    let settings = config.chunking.settings()?;
    let index_path = &config.index.path;

    let report = if opts.dry_run {
        let report = plan(&documents, &settings, &config.documents.root)?;
        reporter.report(IngestProgressEvent::Chunked {
            documents: report.documents as u64,
            chunks: report.chunks as u64,
        });
        report
    } else {
        let embedder = embedding::create_embedder(&config.embedding)?;
        let index = Arc::new(SqliteIndex::new(index_path));
        let ingestor = Ingestor::new(embedder, index, settings)
            .batch_size(config.embedding.batch_size)
            .root(&config.documents.root)
            .progress(reporter);
        ingestor.ingest(&documents).await?
    };

    if opts.dry_run {
        println!("ingest (dry-run)");
    } else {
        println!("ingest");
    }
    println!("  documents: {}", report.documents);
    println!("  chunks: {}", report.chunks);
    if let Some(example) = &report.example {
        println!("  example chunk ({}):", example.source_id);
        let preview: String = example.text.chars().take(200).collect();
        for line in preview.lines() {
            println!("    {}", line);
        }
    }
    if let Some(manifest) = &report.manifest {
        println!("  model: {} ({} dims)", manifest.model, manifest.dims);
        println!("  index: {}", index_path.display());
    }
    println!("ok");

    Ok(())
}
