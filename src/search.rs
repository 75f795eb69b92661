//! Query service: embed a query and rank indexed chunks against it.
//!
//! Scores are cosine similarity for an inner-product index (higher is
//! better) and squared L2 distance for an L2 index (lower is better).

use anyhow::{Context, Result};

use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::models::SearchHit;
use crate::store::IndexStore;

pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let k = k.unwrap_or(config.retrieval.top_k);
    let store = IndexStore::load(&config.paths.index_dir, config.embedding.metric)
        .context("Failed to open index")?;

    if query.trim().is_empty() || store.is_empty() || k == 0 {
        println!("No results.");
        return Ok(());
    }

    let provider = embedding::open_provider(&config.embedding)?;
    let embedder = Embedder::new(provider, config.embedding.metric);
    let hits = search_index(&store, &embedder, query, k).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    let score_label = if store.metric().normalizes() {
        "similarity"
    } else {
        "distance"
    };

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{}: {:.4}] {}/{} #{}",
            i + 1,
            score_label,
            hit.score,
            hit.metadata.site,
            hit.metadata.source_file,
            hit.metadata.chunk_index
        );
        println!("    id: {}", hit.metadata.id);
    }

    Ok(())
}

/// Top-`k` matches for `query`, best-first, joined with their metadata.
///
/// An empty store, a blank query, or `k == 0` return an empty list without
/// invoking the encoder.
pub async fn search_index(
    store: &IndexStore,
    embedder: &Embedder,
    query: &str,
    k: usize,
) -> Result<Vec<SearchHit>> {
    if store.is_empty() || query.trim().is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let query_vec = embedder.embed_query(query).await?;
    Ok(store.search(&query_vec, k))
}
