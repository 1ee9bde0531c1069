//! Corpus loader.
//!
//! Walks `documents.root`, keeps files matching `include_globs` and not
//! matching `exclude_globs` (plus built-in excludes for `.git`, `target`, and
//! `node_modules`), and extracts their text into [`Document`]s. PDFs produce
//! one document per non-empty page.
//!
//! Files that cannot be read or extracted are skipped with a warning; one bad
//! file does not fail ingestion. Output is sorted by relative path so repeated
//! runs see the same document order.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::DocumentsConfig;
use crate::error::{RagError, Result};
use crate::extract::{self, FileKind};
use crate::models::Document;

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Load every matching document under the configured root.
///
/// Returns [`RagError::EmptyCorpus`] if the root does not exist or yields no
/// document with text.
pub fn load_documents(config: &DocumentsConfig) -> Result<Vec<Document>> {
    let root = &config.root;
    if !root.is_dir() {
        warn!(root = %root.display(), "document root does not exist");
        return Err(RagError::EmptyCorpus { root: root.clone() });
    }

    let include_set = build_globset(&config.include_globs)?;
    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push((rel_str, path.to_path_buf()));
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut documents = Vec::new();
    for (source_id, path) in files {
        match load_file(&path, &source_id) {
            Ok(docs) => {
                debug!(source = %source_id, documents = docs.len(), "loaded file");
                documents.extend(docs);
            }
            Err(reason) => warn!(source = %source_id, %reason, "skipping file"),
        }
    }

    if documents.is_empty() {
        return Err(RagError::EmptyCorpus { root: root.clone() });
    }
    Ok(documents)
}

fn load_file(path: &Path, source_id: &str) -> std::result::Result<Vec<Document>, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;

    let docs = match FileKind::for_path(path) {
        FileKind::Text => {
            let text = extract::extract_text(bytes).map_err(|e| e.to_string())?;
            vec![Document::new(source_id, text)]
        }
        FileKind::Pdf => extract::extract_pdf_pages(&bytes)
            .map_err(|e| e.to_string())?
            .into_iter()
            .enumerate()
            .map(|(i, text)| Document::new(source_id, text).with_page(i as u32 + 1))
            .collect(),
    };

    Ok(docs
        .into_iter()
        .filter(|d| !d.text.trim().is_empty())
        .collect())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RagError::Config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::Config(format!("invalid glob set: {}", e)))
}
