//! Index statistics and health overview.
//!
//! Provides a quick summary of what's indexed: vector count, dimension,
//! metric, last update time, and a per-site breakdown. Used by `cidx stats`
//! to confirm that chunking and embedding runs are doing what you expect.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

use crate::chunk_cmd::load_chunk_file;
use crate::config::Config;
use crate::models::MetadataRecord;
use crate::store::IndexStore;

/// Per-site breakdown of indexed chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteStats {
    pub documents: usize,
    pub chunks: usize,
}

/// Run the stats command: load the index and print a summary.
pub fn run_stats(config: &Config) -> Result<()> {
    let store = IndexStore::load(&config.paths.index_dir, config.embedding.metric)
        .context("Failed to open index")?;

    let index_size = std::fs::metadata(store.index_path())
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Corpus Index — Stats");
    println!("====================");
    println!();
    println!("  Index dir:   {}", store.dir().display());
    println!("  Size:        {}", format_bytes(index_size));
    println!("  Metric:      {}", store.metric());
    match store.dims() {
        Some(d) => println!("  Dimension:   {}", d),
        None => println!("  Dimension:   (none yet)"),
    }
    println!("  Vectors:     {}", store.len());
    if let Some(model) = store.model() {
        println!("  Model:       {}", model);
    }

    if let Some(state) = store.read_state() {
        println!("  Updated:     {}", format_relative(state.updated_at));
    }

    // Coverage against the current chunk collection, if there is one.
    if let Ok(chunks) = load_chunk_file(&config.paths.all_chunks_path()) {
        let known = store.known_ids();
        let covered = chunks
            .iter()
            .filter(|c| known.contains(c.id.as_str()))
            .count();
        println!(
            "  Coverage:    {} / {} chunks ({}%)",
            covered,
            chunks.len(),
            if chunks.is_empty() {
                0
            } else {
                covered * 100 / chunks.len()
            }
        );
    }

    let by_site = site_breakdown(store.metadata());
    if !by_site.is_empty() {
        println!();
        println!("  {:<28} {:>10} {:>10}", "SITE", "DOCS", "CHUNKS");
        for (site, stats) in &by_site {
            println!("  {:<28} {:>10} {:>10}", site, stats.documents, stats.chunks);
        }
    }

    Ok(())
}

/// Count indexed documents and chunks per site.
pub fn site_breakdown(metadata: &[MetadataRecord]) -> BTreeMap<String, SiteStats> {
    let mut files: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
    let mut out: BTreeMap<String, SiteStats> = BTreeMap::new();

    for m in metadata {
        files
            .entry(m.site.as_str())
            .or_default()
            .insert(m.source_file.as_str());
        out.entry(m.site.clone()).or_default().chunks += 1;
    }
    for (site, docs) in files {
        if let Some(stats) = out.get_mut(site) {
            stats.documents = docs.len();
        }
    }
    out
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

/// Format a timestamp relative to now (e.g. "3 hours ago").
fn format_relative(ts: DateTime<Utc>) -> String {
    let delta = (Utc::now() - ts).num_seconds();

    if delta < 0 {
        ts.format("%Y-%m-%d %H:%M").to_string()
    } else if delta < 60 {
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
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}
