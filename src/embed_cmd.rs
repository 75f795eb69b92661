use anyhow::{Context, Result};
use std::collections::HashSet;

use crate::chunk_cmd::load_chunk_file;
use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::index::IndexError;
use crate::models::Chunk;
use crate::store::IndexStore;

/// Counts from one update or rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub candidates: usize,
    pub added: usize,
    pub total: usize,
}

/// Embed new chunks from the consolidated collection into the index.
pub async fn run_embed(config: &Config, rebuild: bool, dry_run: bool) -> Result<()> {
    let chunks = load_chunk_file(&config.paths.all_chunks_path())?;
    let mut store = IndexStore::load(&config.paths.index_dir, config.embedding.metric)
        .context("Failed to open index")?;

    if dry_run {
        let pending = if rebuild {
            dedup_by_id(&chunks).len()
        } else {
            pending_chunks(&store, &chunks).len()
        };
        println!("embed (dry-run)");
        println!("  candidate chunks: {}", chunks.len());
        println!("  chunks needing embeddings: {}", pending);
        println!("  indexed: {}", store.len());
        return Ok(());
    }

    if !rebuild && pending_chunks(&store, &chunks).is_empty() {
        println!("embed");
        println!("  all chunks up to date");
        println!("  indexed: {}", store.len());
        return Ok(());
    }

    let provider = embedding::open_provider(&config.embedding)?;
    let embedder = Embedder::new(provider, config.embedding.metric);

    let report = if rebuild {
        rebuild_index(&mut store, &embedder, &chunks).await?
    } else {
        update_index(&mut store, &embedder, &chunks).await?
    };

    println!("embed{}", if rebuild { " rebuild" } else { "" });
    println!("  candidate chunks: {}", report.candidates);
    println!("  embedded: {}", report.added);
    println!("  indexed: {}", report.total);
    Ok(())
}

/// Chunks whose id is not yet in the store, in candidate order.
///
/// A chunk id repeated within `candidates` is taken once (first occurrence).
pub fn pending_chunks<'a>(store: &IndexStore, candidates: &'a [Chunk]) -> Vec<&'a Chunk> {
    let known = store.known_ids();
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter(|c| !known.contains(c.id.as_str()))
        .filter(|c| seen.insert(c.id.as_str()))
        .collect()
}

fn dedup_by_id(candidates: &[Chunk]) -> Vec<&Chunk> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter(|c| seen.insert(c.id.as_str()))
        .collect()
}

/// Extend the index with embeddings for chunks it does not already hold.
///
/// All new chunks are embedded in one encoder call, appended under the next
/// contiguous block of ids, and persisted once. With nothing new, neither the
/// encoder nor the disk is touched. An encoder whose declared width differs
/// from the index is rejected before it is called; the width of what it
/// actually returns is checked again on append. If embedding or appending
/// fails, the store on disk is left exactly as it was.
pub async fn update_index(
    store: &mut IndexStore,
    embedder: &Embedder,
    candidates: &[Chunk],
) -> Result<UpdateReport> {
    let pending = pending_chunks(store, candidates);

    if pending.is_empty() {
        tracing::info!(candidates = candidates.len(), "index up to date; nothing to embed");
        return Ok(UpdateReport {
            candidates: candidates.len(),
            added: 0,
            total: store.len(),
        });
    }

    if let Some(dims) = store.dims() {
        if embedder.dims() != dims {
            return Err(IndexError::DimensionMismatch {
                expected: dims,
                actual: embedder.dims(),
            }
            .into());
        }
    }

    tracing::info!(
        pending = pending.len(),
        indexed = store.len(),
        model = embedder.model_name(),
        "embedding new chunks"
    );
    let added = append_and_persist(store, embedder, &pending).await?;

    Ok(UpdateReport {
        candidates: candidates.len(),
        added,
        total: store.len(),
    })
}

/// Discard the index and embed every candidate chunk from scratch.
///
/// The old state is only replaced on disk after the new embeddings succeed.
pub async fn rebuild_index(
    store: &mut IndexStore,
    embedder: &Embedder,
    candidates: &[Chunk],
) -> Result<UpdateReport> {
    let all = dedup_by_id(candidates);
    let texts: Vec<String> = all.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.compute(&texts).await?;

    store.clear();
    store.set_model(embedder.model_name());
    store.append(&vectors, all.iter().map(|c| c.metadata()).collect())?;
    store.persist()?;

    tracing::info!(count = store.len(), "rebuilt index");
    Ok(UpdateReport {
        candidates: candidates.len(),
        added: all.len(),
        total: store.len(),
    })
}

async fn append_and_persist(
    store: &mut IndexStore,
    embedder: &Embedder,
    chunks: &[&Chunk],
) -> Result<usize> {
    if let Some(previous) = store.model() {
        if previous != embedder.model_name() {
            tracing::warn!(
                indexed_with = previous,
                model = embedder.model_name(),
                "encoder model differs from the one that built this index"
            );
        }
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.compute(&texts).await?;

    let range = store.append(&vectors, chunks.iter().map(|c| c.metadata()).collect())?;
    if store.model().is_none() {
        store.set_model(embedder.model_name());
    }
    store.persist()?;

    tracing::debug!(first = range.start, last = range.end - 1, "assigned ids");
    Ok(chunks.len())
}
