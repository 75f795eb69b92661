//! Persistent index store: vectors plus positionally-aligned metadata.
//!
//! A store directory holds three files:
//!
//! | File | Contents |
//! |------|----------|
//! | `vectors.idx` | binary [`IdMap`] (ids `0..N`, one vector each) |
//! | `metadata.json` | `N` [`MetadataRecord`]s; record `i` describes id `i` |
//! | `state.toml` | sidecar: count, dims, metric, encoder model, last update time |
//!
//! [`IndexStore::persist`] is the only place anything is written. The three
//! writes are not atomic as a group; a crash mid-persist can leave them out
//! of step, which the next [`IndexStore::load`] detects and treats as an
//! empty index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::embedding::Embeddings;
use crate::index::{IdMap, IndexError, Metric};
use crate::models::{MetadataRecord, SearchHit};

pub const INDEX_FILE: &str = "vectors.idx";
pub const METADATA_FILE: &str = "metadata.json";
pub const STATE_FILE: &str = "state.toml";

/// Contents of the `state.toml` sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexState {
    pub count: usize,
    pub dims: usize,
    pub metric: Metric,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub updated_at: DateTime<Utc>,
}

pub struct IndexStore {
    dir: PathBuf,
    metric: Metric,
    /// `None` until the first vectors arrive and fix the dimension.
    index: Option<IdMap>,
    metadata: Vec<MetadataRecord>,
    /// Encoder that produced the stored vectors, as recorded in the sidecar.
    model: Option<String>,
}

impl IndexStore {
    /// Empty in-memory store rooted at `dir`. Nothing is read or written.
    pub fn new(dir: impl Into<PathBuf>, metric: Metric) -> Self {
        Self {
            dir: dir.into(),
            metric,
            index: None,
            metadata: Vec::new(),
            model: None,
        }
    }

    /// Load the persisted index and metadata from `dir`.
    ///
    /// Missing, unreadable, corrupt, or mutually inconsistent files yield an
    /// empty store (the cause is logged). The only error is a non-empty index
    /// whose recorded metric differs from `metric`: that is a configuration
    /// mistake, not damage, and silently rebuilding would discard it.
    pub fn load(dir: impl Into<PathBuf>, metric: Metric) -> Result<Self, IndexError> {
        let mut store = Self::new(dir, metric);
        let index_path = store.index_path();
        let metadata_path = store.metadata_path();

        if !index_path.exists() && !metadata_path.exists() {
            tracing::info!(dir = %store.dir.display(), "no persisted index; starting empty");
            return Ok(store);
        }

        let (index, metadata) = match read_state(&index_path, &metadata_path) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(
                    dir = %store.dir.display(),
                    error = %e,
                    "persisted index unusable; starting empty"
                );
                return Ok(store);
            }
        };

        if index.is_empty() {
            tracing::debug!(dir = %store.dir.display(), "persisted index holds no vectors");
            return Ok(store);
        }

        if index.metric() != metric {
            return Err(IndexError::MetricMismatch {
                configured: metric,
                persisted: index.metric(),
            });
        }

        tracing::debug!(count = index.len(), dims = index.dims(), "loaded index");
        store.index = Some(index);
        store.metadata = metadata;
        store.model = store.read_state().and_then(|s| s.model);
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Vector width, once known.
    pub fn dims(&self) -> Option<usize> {
        self.index.as_ref().map(|i| i.dims())
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    /// Encoder model recorded for the stored vectors, if known.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn set_model(&mut self, model: &str) {
        self.model = Some(model.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn metadata(&self) -> &[MetadataRecord] {
        &self.metadata
    }

    /// Chunk ids already represented in the index.
    pub fn known_ids(&self) -> HashSet<&str> {
        self.metadata.iter().map(|m| m.id.as_str()).collect()
    }

    /// Drop all in-memory entries. The dimension is re-fixed by the next append.
    pub fn clear(&mut self) {
        self.index = None;
        self.metadata.clear();
        self.model = None;
    }

    /// Append vectors and their metadata under the next block of ids.
    ///
    /// Returns the id range assigned. On [`IndexError::DimensionMismatch`]
    /// nothing is modified.
    ///
    /// # Panics
    ///
    /// If `records.len()` differs from the number of vectors.
    pub fn append(
        &mut self,
        vectors: &Embeddings,
        records: Vec<MetadataRecord>,
    ) -> Result<Range<i64>, IndexError> {
        assert_eq!(
            vectors.len(),
            records.len(),
            "IndexStore::append: {} vectors but {} metadata records",
            vectors.len(),
            records.len()
        );

        let start = self.metadata.len() as i64;
        if vectors.is_empty() {
            return Ok(start..start);
        }

        let metric = self.metric;
        let index = self
            .index
            .get_or_insert_with(|| IdMap::create(vectors.dims(), metric));

        let ids: Vec<i64> = (start..start + vectors.len() as i64).collect();
        index.add(vectors, &ids)?;
        self.metadata.extend(records);

        Ok(start..start + vectors.len() as i64)
    }

    /// Up to `k` hits for an already-embedded query, best-first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let Some(index) = &self.index else {
            return Vec::new();
        };

        index
            .search(query, k)
            .into_iter()
            .filter_map(|(id, score)| {
                let metadata = usize::try_from(id)
                    .ok()
                    .and_then(|pos| self.metadata.get(pos))?;
                Some(SearchHit {
                    metadata: metadata.clone(),
                    score,
                })
            })
            .collect()
    }

    /// Write index, metadata, and sidecar to the store directory.
    pub fn persist(&self) -> Result<(), IndexError> {
        fs::create_dir_all(&self.dir).map_err(|source| IndexError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let index_bytes = match &self.index {
            Some(index) => index.to_bytes(),
            None => IdMap::create(0, self.metric).to_bytes(),
        };
        write_file(&self.index_path(), &index_bytes)?;

        let metadata_json = serde_json::to_vec_pretty(&self.metadata)
            .map_err(|e| IndexError::Corrupt(format!("metadata not serializable: {}", e)))?;
        write_file(&self.metadata_path(), &metadata_json)?;

        let state = IndexState {
            count: self.metadata.len(),
            dims: self.dims().unwrap_or(0),
            metric: self.metric,
            model: self.model.clone(),
            updated_at: Utc::now(),
        };
        let state_toml = toml::to_string(&state)
            .map_err(|e| IndexError::Corrupt(format!("state not serializable: {}", e)))?;
        write_file(&self.state_path(), state_toml.as_bytes())?;

        tracing::info!(
            dir = %self.dir.display(),
            count = state.count,
            dims = state.dims,
            "persisted index"
        );
        Ok(())
    }

    /// Read the sidecar, if present and parseable.
    pub fn read_state(&self) -> Option<IndexState> {
        let content = fs::read_to_string(self.state_path()).ok()?;
        toml::from_str(&content).ok()
    }
}

fn read_state(
    index_path: &Path,
    metadata_path: &Path,
) -> Result<(IdMap, Vec<MetadataRecord>), IndexError> {
    let bytes = fs::read(index_path).map_err(|source| IndexError::Io {
        path: index_path.to_path_buf(),
        source,
    })?;
    let index = IdMap::from_bytes(&bytes)?;

    let content = fs::read(metadata_path).map_err(|source| IndexError::Io {
        path: metadata_path.to_path_buf(),
        source,
    })?;
    let metadata: Vec<MetadataRecord> = serde_json::from_slice(&content)
        .map_err(|e| IndexError::Corrupt(format!("{}: {}", metadata_path.display(), e)))?;

    if metadata.len() != index.len() {
        return Err(IndexError::Corrupt(format!(
            "index holds {} vectors but metadata has {} records",
            index.len(),
            metadata.len()
        )));
    }
    if index
        .ids()
        .iter()
        .enumerate()
        .any(|(pos, &id)| id != pos as i64)
    {
        return Err(IndexError::Corrupt(
            "index ids are not contiguous from 0".to_string(),
        ));
    }

    Ok((index, metadata))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    fs::write(path, bytes).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })
}
