//! Vector index: storage and nearest-neighbor search over chunk embeddings.
//!
//! Two implementations of [`VectorIndex`]:
//!
//! - [`SqliteIndex`]: persisted to a single SQLite file; used by the CLI and server.
//! - [`InMemoryIndex`]: same semantics without persistence; used in tests.
//!
//! Search is brute-force cosine similarity over every entry, computed in
//! Rust. Scores are relevance: higher means more similar.
//!
//! # Rebuild
//!
//! The index is replaced wholesale. [`SqliteIndex::rebuild`] writes a fresh
//! database next to the canonical path (`<path>.building-<uuid>`), closes it,
//! and renames it over the canonical file. Until the rename the previous
//! index stays untouched on disk, and on any failure the temporary file is
//! removed. Readers in the same process switch to the new snapshot only after
//! the rename succeeds.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE manifest (id INTEGER PRIMARY KEY CHECK (id = 1),
//!     model TEXT NOT NULL, dims INTEGER NOT NULL,
//!     chunk_count INTEGER NOT NULL, built_at INTEGER NOT NULL);
//! CREATE TABLE entries (position INTEGER PRIMARY KEY,
//!     id TEXT NOT NULL UNIQUE, source_id TEXT NOT NULL, page INTEGER,
//!     chunk_index INTEGER NOT NULL, start_offset INTEGER NOT NULL,
//!     text TEXT NOT NULL, hash TEXT NOT NULL, vector BLOB NOT NULL);
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{RagError, Result};
use crate::models::{Chunk, IndexEntry, IndexManifest, ScoredChunk};

/// Similarity-searchable store of chunk embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Replace every entry. `manifest.chunk_count` is set from `entries`.
    ///
    /// Fails with [`RagError::DimensionMismatch`] if any vector does not have
    /// `manifest.dims` elements; the previous contents are kept.
    async fn rebuild(&self, manifest: IndexManifest, entries: Vec<IndexEntry>) -> Result<()>;

    /// Up to `k` entries, most relevant first. Ties keep insertion order.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Manifest of the current contents, `None` before the first rebuild.
    fn manifest(&self) -> Option<IndexManifest>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable view of an index generation.
#[derive(Debug, Default)]
struct Snapshot {
    manifest: Option<IndexManifest>,
    entries: Vec<IndexEntry>,
}

impl Snapshot {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if let Some(manifest) = &self.manifest {
            if query.len() != manifest.dims {
                return Err(RagError::DimensionMismatch {
                    expected: manifest.dims,
                    actual: query.len(),
                });
            }
        }
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: cosine_similarity(query, &e.vector),
            })
            .collect();

        // sort_by is stable, so equal scores keep insertion order
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }
}

fn prepare(mut manifest: IndexManifest, entries: &[IndexEntry]) -> Result<IndexManifest> {
    if let Some(bad) = entries.iter().find(|e| e.vector.len() != manifest.dims) {
        return Err(RagError::DimensionMismatch {
            expected: manifest.dims,
            actual: bad.vector.len(),
        });
    }
    manifest.chunk_count = entries.len();
    Ok(manifest)
}

/// Shared, atomically replaceable snapshot.
#[derive(Debug, Default)]
struct SnapshotCell(RwLock<Arc<Snapshot>>);

impl SnapshotCell {
    fn load(&self) -> Arc<Snapshot> {
        self.0
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn store(&self, snapshot: Snapshot) {
        *self
            .0
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(snapshot);
    }
}

// ============ In-memory ============

/// Non-persistent [`VectorIndex`].
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    snapshot: SnapshotCell,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn rebuild(&self, manifest: IndexManifest, entries: Vec<IndexEntry>) -> Result<()> {
        let manifest = prepare(manifest, &entries)?;
        self.snapshot.store(Snapshot {
            manifest: Some(manifest),
            entries,
        });
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        self.snapshot.load().search(query, k)
    }

    fn manifest(&self) -> Option<IndexManifest> {
        self.snapshot.load().manifest.clone()
    }

    fn len(&self) -> usize {
        self.snapshot.load().entries.len()
    }
}

// ============ SQLite ============

/// [`VectorIndex`] persisted to a single SQLite file.
#[derive(Debug)]
pub struct SqliteIndex {
    path: PathBuf,
    snapshot: SnapshotCell,
}

impl SqliteIndex {
    /// An index handle at `path` with no contents loaded.
    ///
    /// Nothing is read or written until [`rebuild`](VectorIndex::rebuild).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            snapshot: SnapshotCell::default(),
        }
    }

    /// Load and validate the index at `path`.
    ///
    /// Fails with [`RagError::IndexUnavailable`] if the file is missing, is
    /// not a healthy SQLite database, has no manifest, holds a vector of the
    /// wrong size, or holds a different number of entries than the manifest
    /// records.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(RagError::IndexUnavailable {
                path,
                reason: "index file not found; run `rag ingest` first".to_string(),
            });
        }

        let snapshot = load_snapshot(&path).await.map_err(|reason| {
            error!(path = %path.display(), %reason, "index failed validation");
            RagError::IndexUnavailable {
                path: path.clone(),
                reason,
            }
        })?;

        info!(
            path = %path.display(),
            entries = snapshot.entries.len(),
            "loaded vector index"
        );

        Ok(Self {
            path,
            snapshot: SnapshotCell(RwLock::new(Arc::new(snapshot))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of chunks per source, most chunks first.
    pub fn source_counts(&self) -> Vec<(String, usize)> {
        let snapshot = self.snapshot.load();
        let mut counts: Vec<(String, usize)> = Vec::new();
        for entry in &snapshot.entries {
            match counts.iter_mut().find(|(s, _)| *s == entry.chunk.source_id) {
                Some((_, n)) => *n += 1,
                None => counts.push((entry.chunk.source_id.clone(), 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
    }

    fn building_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string());
        self.path
            .with_file_name(format!("{}.building-{}", name, uuid::Uuid::new_v4()))
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn rebuild(&self, manifest: IndexManifest, entries: Vec<IndexEntry>) -> Result<()> {
        let manifest = prepare(manifest, &entries)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let building = self.building_path();
        debug!(path = %building.display(), "writing new index generation");

        if let Err(e) = write_index_file(&building, &manifest, &entries).await {
            error!(error = %e, "index write failed; previous index kept");
            remove_quietly(&building).await;
            return Err(e);
        }

        if let Err(e) = tokio::fs::rename(&building, &self.path).await {
            error!(error = %e, "index swap failed; previous index kept");
            remove_quietly(&building).await;
            return Err(e.into());
        }

        info!(
            path = %self.path.display(),
            entries = entries.len(),
            model = %manifest.model,
            "index rebuilt"
        );

        self.snapshot.store(Snapshot {
            manifest: Some(manifest),
            entries,
        });
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        self.snapshot.load().search(query, k)
    }

    fn manifest(&self) -> Option<IndexManifest> {
        self.snapshot.load().manifest.clone()
    }

    fn len(&self) -> usize {
        self.snapshot.load().entries.len()
    }
}

async fn remove_quietly(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
    let mut journal = path.as_os_str().to_owned();
    journal.push("-journal");
    let _ = tokio::fs::remove_file(PathBuf::from(journal)).await;
}

async fn connect(options: SqliteConnectOptions) -> std::result::Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
}

async fn write_index_file(
    path: &Path,
    manifest: &IndexManifest,
    entries: &[IndexEntry],
) -> Result<()> {
    // Rollback journal, not WAL: the finished database must be a single
    // self-contained file before it is renamed into place.
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete)
        .synchronous(SqliteSynchronous::Full);
    let pool = connect(options).await?;

    let result = write_contents(&pool, manifest, entries).await;
    pool.close().await;
    result
}

async fn write_contents(
    pool: &SqlitePool,
    manifest: &IndexManifest,
    entries: &[IndexEntry],
) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE manifest (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            chunk_count INTEGER NOT NULL,
            built_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE entries (
            position INTEGER PRIMARY KEY,
            id TEXT NOT NULL UNIQUE,
            source_id TEXT NOT NULL,
            page INTEGER,
            chunk_index INTEGER NOT NULL,
            start_offset INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            vector BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO manifest (id, model, dims, chunk_count, built_at) VALUES (1, ?, ?, ?, ?)",
    )
    .bind(&manifest.model)
    .bind(manifest.dims as i64)
    .bind(manifest.chunk_count as i64)
    .bind(manifest.built_at)
    .execute(&mut *tx)
    .await?;

    for (position, entry) in entries.iter().enumerate() {
        let chunk = &entry.chunk;
        sqlx::query(
            r#"
            INSERT INTO entries
                (position, id, source_id, page, chunk_index, start_offset, text, hash, vector)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(position as i64)
        .bind(&chunk.id)
        .bind(&chunk.source_id)
        .bind(chunk.page.map(i64::from))
        .bind(chunk.chunk_index)
        .bind(chunk.start_offset as i64)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .bind(vec_to_blob(&entry.vector))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Read and validate a persisted index; errors are human-readable reasons.
async fn load_snapshot(path: &Path) -> std::result::Result<Snapshot, String> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(false)
        .read_only(true);
    let pool = connect(options).await.map_err(|e| e.to_string())?;

    let result = read_snapshot(&pool).await;
    pool.close().await;
    result
}

async fn read_snapshot(pool: &SqlitePool) -> std::result::Result<Snapshot, String> {
    let integrity: String = sqlx::query_scalar("PRAGMA integrity_check")
        .fetch_one(pool)
        .await
        .map_err(|e| e.to_string())?;
    if integrity != "ok" {
        return Err(format!("integrity check failed: {}", integrity));
    }

    let row = sqlx::query("SELECT model, dims, chunk_count, built_at FROM manifest WHERE id = 1")
        .fetch_optional(pool)
        .await
        .map_err(|e| format!("cannot read manifest: {}", e))?
        .ok_or_else(|| "manifest missing".to_string())?;

    let manifest = IndexManifest {
        model: row.try_get("model").map_err(|e| e.to_string())?,
        dims: column_usize(&row, "dims")?,
        chunk_count: column_usize(&row, "chunk_count")?,
        built_at: row.try_get("built_at").map_err(|e| e.to_string())?,
    };

    let rows = sqlx::query(
        r#"
        SELECT id, source_id, page, chunk_index, start_offset, text, hash, vector
        FROM entries
        ORDER BY position
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| format!("cannot read entries: {}", e))?;

    if rows.len() != manifest.chunk_count {
        return Err(format!(
            "manifest records {} entries but the index holds {}",
            manifest.chunk_count,
            rows.len()
        ));
    }

    let expected_bytes = manifest
        .dims
        .checked_mul(4)
        .ok_or_else(|| format!("manifest dims {} is out of range", manifest.dims))?;
    let mut entries = Vec::with_capacity(rows.len());
    for row in &rows {
        let blob: Vec<u8> = row.try_get("vector").map_err(|e| e.to_string())?;
        let id: String = row.try_get("id").map_err(|e| e.to_string())?;
        if blob.len() != expected_bytes {
            return Err(format!(
                "vector for chunk {} has {} bytes, expected {}",
                id,
                blob.len(),
                expected_bytes
            ));
        }

        let page: Option<i64> = row.try_get("page").map_err(|e| e.to_string())?;
        let chunk = Chunk {
            source_id: row.try_get("source_id").map_err(|e| e.to_string())?,
            page: page
                .map(|p| {
                    u32::try_from(p).map_err(|_| format!("chunk {} has invalid page {}", id, p))
                })
                .transpose()?,
            chunk_index: row.try_get("chunk_index").map_err(|e| e.to_string())?,
            start_offset: column_usize(row, "start_offset")?,
            text: row.try_get("text").map_err(|e| e.to_string())?,
            hash: row.try_get("hash").map_err(|e| e.to_string())?,
            id,
        };
        entries.push(IndexEntry {
            chunk,
            vector: blob_to_vec(&blob),
        });
    }

    Ok(Snapshot {
        manifest: Some(manifest),
        entries,
    })
}

/// Read a non-negative integer column as `usize`.
fn column_usize(row: &SqliteRow, column: &str) -> std::result::Result<usize, String> {
    let value: i64 = row.try_get(column).map_err(|e| e.to_string())?;
    usize::try_from(value).map_err(|_| format!("{} is out of range: {}", column, value))
}
