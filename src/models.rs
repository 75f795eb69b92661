//! Core data models used throughout the indexer.
//!
//! These types represent the documents, chunks, metadata records, and search
//! hits that flow through the chunk → embed → index → query pipeline.

use serde::{Deserialize, Serialize};

/// Cleaned plain-text document handed over by the extraction stage.
///
/// Not persisted by the indexer; only its provenance (`site`, `file_name`)
/// survives into chunk and metadata records.
#[derive(Debug, Clone)]
pub struct Document {
    pub site: String,
    pub file_name: String,
    pub text: String,
}

/// A sentence-aligned span of a document's text.
///
/// This is also the on-disk record shape of the chunk collection files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub site: String,
    pub source_file: String,
    pub chunk_index: usize,
    pub text: String,
}

impl Chunk {
    /// Provenance record stored alongside this chunk's vector.
    pub fn metadata(&self) -> MetadataRecord {
        MetadataRecord {
            id: self.id.clone(),
            site: self.site.clone(),
            source_file: self.source_file.clone(),
            chunk_index: self.chunk_index,
        }
    }
}

/// Provenance for one indexed vector, stored at the same ordinal position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub id: String,
    pub site: String,
    pub source_file: String,
    pub chunk_index: usize,
}

/// A ranked query match.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub metadata: MetadataRecord,
    /// Cosine similarity (higher is better) or squared L2 distance (lower
    /// is better), depending on the index metric.
    pub score: f32,
}
