use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn rag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rag");
    path
}

fn write_config(root: &Path, extra: &str) -> PathBuf {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Remote providers are configured so no model is downloaded; none of
    // these tests reach the network.
    let config_content = format!(
        r#"[documents]
root = "{root}/files"
include_globs = ["**/*.md", "**/*.txt"]

[index]
path = "{root}/data/index.sqlite"

[embedding]
provider = "ollama"
model = "nomic-embed-text"
dims = 768

[model]
provider = "ollama"
model = "llama3"
{extra}
"#,
        root = root.display(),
        extra = extra,
    );

    let config_path = config_dir.join("rag.toml");
    fs::write(&config_path, config_content).unwrap();
    config_path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThe sky is blue on a clear day.\n\nIt is grey when it rains.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.md"),
        "# Beta Document\n\nWater is wet.\n\nIce is frozen water.",
    )
    .unwrap();
    fs::write(
        files_dir.join("gamma.txt"),
        "Gamma plain text file.\n\nFire is hot.",
    )
    .unwrap();
    fs::write(files_dir.join("ignored.csv"), "a,b,c\n1,2,3").unwrap();

    let config_path = write_config(&root, "");
    (tmp, config_path)
}

fn run_rag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_ingest_dry_run() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_rag(&config_path, &["ingest", "--dry-run"]);
    assert!(success, "dry run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("documents: 3"), "got: {}", stdout);
    assert!(stdout.contains("chunks: 3"), "got: {}", stdout);
    assert!(stdout.contains("example chunk (alpha.md)"), "got: {}", stdout);
    assert!(stdout.contains("ok"));

    assert!(!tmp.path().join("data").join("index.sqlite").exists());
}

#[test]
fn test_ingest_dry_run_small_chunks() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    fs::create_dir_all(root.join("files")).unwrap();
    fs::write(
        root.join("files").join("facts.txt"),
        "The sky is blue. Water is wet. Fire is hot.",
    )
    .unwrap();
    let config_path = write_config(
        &root,
        "\n[chunking]\nchunk_size = 20\noverlap = 5\nboundary = \"structural\"\n",
    );

    let (stdout, stderr, success) = run_rag(&config_path, &["ingest", "--dry-run"]);
    assert!(success, "dry run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents: 1"));
    assert!(stdout.contains("chunks: 3"), "got: {}", stdout);
    assert!(stdout.contains("The sky is blue."));
}

#[test]
fn test_ingest_empty_corpus_fails() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    fs::create_dir_all(root.join("files")).unwrap();
    fs::write(root.join("files").join("data.csv"), "not,matched").unwrap();
    let config_path = write_config(&root, "");

    let (stdout, stderr, success) = run_rag(&config_path, &["ingest"]);
    assert!(!success, "expected failure, got stdout={}", stdout);
    assert!(stderr.contains("no documents found"), "stderr: {}", stderr);
    assert!(!root.join("data").join("index.sqlite").exists());
}

#[test]
fn test_ingest_missing_root_fails() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), "");

    let (_, stderr, success) = run_rag(&config_path, &["ingest", "--dry-run"]);
    assert!(!success);
    assert!(stderr.contains("no documents found"), "stderr: {}", stderr);
}

#[test]
fn test_query_without_index_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_rag(&config_path, &["query", "What color is the sky?"]);
    assert!(!success);
    assert!(stderr.contains("index unavailable"), "stderr: {}", stderr);
}

#[test]
fn test_stats_without_index_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_rag(&config_path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("rag ingest"), "stderr: {}", stderr);
}

#[test]
fn test_query_corrupt_index_fails() {
    let (tmp, config_path) = setup_test_env();
    let data = tmp.path().join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("index.sqlite"), "garbage").unwrap();

    let (_, stderr, success) = run_rag(&config_path, &["query", "sky"]);
    assert!(!success);
    assert!(stderr.contains("index unavailable"), "stderr: {}", stderr);
}

#[test]
fn test_invalid_overlap_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), "\n[chunking]\nchunk_size = 100\noverlap = 100\n");

    let (_, stderr, success) = run_rag(&config_path, &["ingest", "--dry-run"]);
    assert!(!success);
    assert!(stderr.contains("overlap"), "stderr: {}", stderr);
}

#[test]
fn test_unknown_provider_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), "\n[server]\nbind = \"127.0.0.1:0\"\n");
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace(
            "provider = \"ollama\"\nmodel = \"llama3\"",
            "provider = \"mystery\"\nmodel = \"x\"",
        );
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_rag(&config_path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Unknown model provider"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_file() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_rag(&tmp.path().join("absent.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr: {}", stderr);
}
