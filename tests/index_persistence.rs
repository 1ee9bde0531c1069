mod common;

use std::sync::Arc;

use common::VocabEmbedder;
use rag_harness::chunk::{Boundary, ChunkSettings};
use rag_harness::error::RagError;
use rag_harness::index::{SqliteIndex, VectorIndex};
use rag_harness::ingest::Ingestor;
use rag_harness::models::Document;
use tempfile::TempDir;

fn docs() -> Vec<Document> {
    vec![
        Document::new("facts.txt", "The sky is blue. Water is wet. Fire is hot."),
        Document::new("lawn.txt", "Grass is green."),
    ]
}

async fn build(path: &std::path::Path) -> Arc<SqliteIndex> {
    let index = Arc::new(SqliteIndex::new(path));
    let settings = ChunkSettings::new(20, 5, Boundary::Structural).unwrap();
    Ingestor::new(Arc::new(VocabEmbedder::new()), index.clone(), settings)
        .ingest(&docs())
        .await
        .unwrap();
    index
}

fn leftovers(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains(".building-"))
        .collect()
}

#[tokio::test]
async fn reopened_index_answers_like_the_original() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("data").join("index.sqlite");
    let built = build(&path).await;

    let reopened = SqliteIndex::open(&path).await.unwrap();
    assert_eq!(reopened.len(), built.len());
    assert_eq!(reopened.manifest(), built.manifest());

    let query = VocabEmbedder::vector("sky blue");
    let a = built.search(&query, 3).await.unwrap();
    let b = reopened.search(&query, 3).await.unwrap();
    assert_eq!(a, b);
    assert!(b[0].chunk.text.contains("sky is blue"));

    let counts = reopened.source_counts();
    assert_eq!(counts[0], ("facts.txt".to_string(), 3));
    assert_eq!(counts[1], ("lawn.txt".to_string(), 1));
    assert!(leftovers(path.parent().unwrap()).is_empty());
}

#[tokio::test]
async fn manifest_records_embedding_model() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index.sqlite");
    build(&path).await;

    let manifest = SqliteIndex::open(&path).await.unwrap().manifest().unwrap();
    assert_eq!(manifest.model, "fake-vocab");
    assert_eq!(manifest.dims, common::VOCAB.len());
    assert_eq!(manifest.chunk_count, 4);
}

#[tokio::test]
async fn missing_index_is_unavailable() {
    let tmp = TempDir::new().unwrap();
    let err = SqliteIndex::open(tmp.path().join("nope.sqlite"))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::IndexUnavailable { .. }));
}

#[tokio::test]
async fn corrupt_index_is_unavailable() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index.sqlite");
    std::fs::write(&path, b"this is not a sqlite database, just some bytes").unwrap();

    let err = SqliteIndex::open(&path).await.unwrap_err();
    assert!(matches!(err, RagError::IndexUnavailable { .. }), "got {:?}", err);
}

async fn tamper(path: &std::path::Path, statement: &str) {
    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(path)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Delete);
    let pool = sqlx::SqlitePool::connect_with(options).await.unwrap();
    sqlx::query(statement).execute(&pool).await.unwrap();
    pool.close().await;
}

#[tokio::test]
async fn out_of_range_columns_are_unavailable() {
    for statement in [
        "UPDATE manifest SET dims = -1",
        "UPDATE manifest SET chunk_count = -4",
        "UPDATE entries SET start_offset = -1 WHERE position = 0",
        "UPDATE entries SET page = -2 WHERE position = 0",
    ] {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        build(&path).await;
        tamper(&path, statement).await;

        let err = SqliteIndex::open(&path).await.unwrap_err();
        assert!(
            matches!(err, RagError::IndexUnavailable { .. }),
            "{}: got {:?}",
            statement,
            err
        );
    }
}

#[tokio::test]
async fn huge_dims_are_unavailable() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index.sqlite");
    build(&path).await;
    tamper(&path, "UPDATE manifest SET dims = 9223372036854775807").await;

    let err = SqliteIndex::open(&path).await.unwrap_err();
    assert!(matches!(err, RagError::IndexUnavailable { .. }), "got {:?}", err);
}

#[tokio::test]
async fn failed_rebuild_keeps_previous_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index.sqlite");
    let index = build(&path).await;
    let before = std::fs::read(&path).unwrap();

    let mut manifest = index.manifest().unwrap();
    manifest.dims = 3;
    let bad = vec![rag_harness::models::IndexEntry {
        chunk: index
            .search(&VocabEmbedder::vector("grass"), 1)
            .await
            .unwrap()
            .remove(0)
            .chunk,
        vector: vec![1.0, 0.0],
    }];
    assert!(index.rebuild(manifest, bad).await.is_err());

    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert_eq!(index.len(), 4);
    assert!(leftovers(tmp.path()).is_empty());

    let reopened = SqliteIndex::open(&path).await.unwrap();
    assert_eq!(reopened.len(), 4);
}

#[tokio::test]
async fn rebuild_replaces_previous_contents() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index.sqlite");
    let index = build(&path).await;

    let settings = ChunkSettings::new(20, 5, Boundary::Structural).unwrap();
    Ingestor::new(Arc::new(VocabEmbedder::new()), index.clone(), settings)
        .ingest(&[Document::new("lawn.txt", "Grass is green.")])
        .await
        .unwrap();

    assert_eq!(index.len(), 1);
    let reopened = SqliteIndex::open(&path).await.unwrap();
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.source_counts(), vec![("lawn.txt".to_string(), 1)]);
}

#[tokio::test]
async fn empty_corpus_writes_no_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index.sqlite");
    let index = Arc::new(SqliteIndex::new(&path));
    let settings = ChunkSettings::new(20, 5, Boundary::Hard).unwrap();

    let err = Ingestor::new(Arc::new(VocabEmbedder::new()), index, settings)
        .ingest(&[Document::new("blank.txt", "")])
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::EmptyCorpus { .. }));
    assert!(!path.exists());
    assert!(leftovers(tmp.path()).is_empty());
}
