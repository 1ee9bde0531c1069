//! Index statistics.
//!
//! Provides a quick summary of what's indexed: the embedding model that built
//! the index, chunk counts, build time, and a per-source breakdown. Used by
//! `rag stats` to confirm an ingestion run produced what was expected.

use anyhow::Result;

use crate::config::Config;
use crate::index::{SqliteIndex, VectorIndex};

/// Run the stats command: open the index and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let index = SqliteIndex::open(&config.index.path).await?;

    let file_size = std::fs::metadata(&config.index.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("RAG Harness Index Stats");
    println!("=======================");
    println!();
    println!("  Index:       {}", config.index.path.display());
    println!("  Size:        {}", format_bytes(file_size));

    if let Some(manifest) = index.manifest() {
        println!("  Model:       {} ({} dims)", manifest.model, manifest.dims);
        println!("  Chunks:      {}", manifest.chunk_count);
        println!(
            "  Built:       {}",
            format_ts_relative(manifest.built_at, chrono::Utc::now().timestamp())
        );
    }

    let sources = index.source_counts();
    if !sources.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<48} {:>8}", "SOURCE", "CHUNKS");
        println!("  {}", "-".repeat(58));
        for (source, count) in &sources {
            println!("  {:<48} {:>8}", source, count);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to `now` (e.g. "3 hours ago").
fn format_ts_relative(ts: i64, now: i64) -> String {
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
