//! Nearest-neighbor index over fixed-dimension vectors.
//!
//! [`FlatIndex`] is an exact, brute-force index; anything implementing
//! [`VectorIndex`] can take its place. [`IdMap`] wraps an index with an
//! explicit, caller-assigned `i64` id per vector so entries are addressed by
//! id rather than insertion order.
//!
//! The on-disk form of an [`IdMap`] is a little-endian binary blob:
//!
//! ```text
//! "CIDX" | u16 version | u8 metric | u32 dims | u64 count | count × (i64 id, dims × f32)
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

use crate::embedding::Embeddings;

const MAGIC: &[u8; 4] = b"CIDX";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 1 + 4 + 8;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("embedding dimension ({actual}) does not match index dimension ({expected})")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("corrupt index state: {0}")]
    Corrupt(String),

    #[error("index metric is '{persisted}' but config says '{configured}'")]
    MetricMismatch { configured: Metric, persisted: Metric },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Similarity metric of an index. Chosen once per index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Inner product over unit vectors (cosine). Higher is better.
    #[default]
    InnerProduct,
    /// Squared Euclidean distance over raw vectors. Lower is better.
    L2,
}

impl Metric {
    /// Whether vectors must be unit-normalized before entering the index.
    pub fn normalizes(self) -> bool {
        matches!(self, Metric::InnerProduct)
    }

    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::InnerProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Metric::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
        }
    }

    /// Orders two scores best-first. A NaN score ranks last.
    pub fn rank(self, a: f32, b: f32) -> Ordering {
        let (a, b) = (self.worst_if_nan(a), self.worst_if_nan(b));
        match self {
            Metric::InnerProduct => b.total_cmp(&a),
            Metric::L2 => a.total_cmp(&b),
        }
    }

    fn worst_if_nan(self, score: f32) -> f32 {
        match self {
            _ if !score.is_nan() => score,
            Metric::InnerProduct => f32::NEG_INFINITY,
            Metric::L2 => f32::INFINITY,
        }
    }

    fn tag(self) -> u8 {
        match self {
            Metric::InnerProduct => 0,
            Metric::L2 => 1,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Metric::InnerProduct),
            1 => Some(Metric::L2),
            _ => None,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::InnerProduct => write!(f, "inner_product"),
            Metric::L2 => write!(f, "l2"),
        }
    }
}

/// Positional nearest-neighbor index.
///
/// Positions are assigned in insertion order starting at 0.
pub trait VectorIndex: Send + Sync {
    fn dims(&self) -> usize;
    fn metric(&self) -> Metric;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Append one vector. Width is checked by the caller.
    fn push(&mut self, vector: &[f32]);
    fn vector(&self, position: usize) -> Option<&[f32]>;
    /// Up to `k` `(position, score)` pairs, best-first.
    fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)>;
}

/// Exact index: scores every stored vector.
pub struct FlatIndex {
    dims: usize,
    metric: Metric,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dims: usize, metric: Metric) -> Self {
        Self {
            dims,
            metric,
            data: Vec::new(),
        }
    }
}

impl VectorIndex for FlatIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn len(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    fn push(&mut self, vector: &[f32]) {
        self.data.extend_from_slice(vector);
    }

    fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dims)?;
        self.data.get(start..start + self.dims)
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if k == 0 || self.dims == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dims)
            .enumerate()
            .map(|(pos, v)| (pos, self.metric.score(query, v)))
            .collect();

        // Stable sort keeps insertion order among ties.
        scored.sort_by(|a, b| self.metric.rank(a.1, b.1));
        scored.truncate(k);
        scored
    }
}

/// Index wrapper that maps positions to caller-assigned ids.
///
/// Ids are append-only and strictly increasing.
pub struct IdMap<I: VectorIndex = FlatIndex> {
    inner: I,
    ids: Vec<i64>,
}

impl IdMap<FlatIndex> {
    /// Empty exact index. Dimension and metric are fixed from here on.
    pub fn create(dims: usize, metric: Metric) -> Self {
        Self::wrap(FlatIndex::new(dims, metric))
    }
}

impl<I: VectorIndex> IdMap<I> {
    pub fn wrap(inner: I) -> Self {
        Self {
            inner,
            ids: Vec::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.inner.dims()
    }

    pub fn metric(&self) -> Metric {
        self.inner.metric()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    /// Next id that [`add`](Self::add) will accept as the first of a block.
    pub fn next_id(&self) -> i64 {
        self.ids.last().map(|id| id + 1).unwrap_or(0)
    }

    /// Append vectors under the given ids.
    ///
    /// Fails without modifying the index if the vector width differs from
    /// the index width.
    ///
    /// # Panics
    ///
    /// If `ids.len()` differs from the number of vectors, or if the ids are
    /// not strictly greater than every id already present.
    pub fn add(&mut self, vectors: &Embeddings, ids: &[i64]) -> Result<(), IndexError> {
        assert_eq!(
            vectors.len(),
            ids.len(),
            "IdMap::add: {} vectors but {} ids",
            vectors.len(),
            ids.len()
        );
        if vectors.is_empty() {
            return Ok(());
        }
        if vectors.dims() != self.dims() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims(),
                actual: vectors.dims(),
            });
        }

        let mut floor = self.ids.last().copied();
        for &id in ids {
            if let Some(prev) = floor {
                assert!(
                    id > prev,
                    "IdMap::add: id {} is not greater than previous id {}",
                    id,
                    prev
                );
            }
            floor = Some(id);
        }

        for (vector, &id) in vectors.iter().zip(ids) {
            self.inner.push(vector);
            self.ids.push(id);
        }
        Ok(())
    }

    /// Up to `k` `(id, score)` pairs, best-first.
    ///
    /// A query of the wrong width yields no results.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(i64, f32)> {
        if query.len() != self.dims() {
            tracing::warn!(
                query_dims = query.len(),
                index_dims = self.dims(),
                "query width does not match index; returning no results"
            );
            return Vec::new();
        }

        self.inner
            .search(query, k)
            .into_iter()
            .map(|(pos, score)| (self.ids[pos], score))
            .collect()
    }

    /// Stored `(id, vector)` pairs in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (i64, &[f32])> {
        self.ids
            .iter()
            .enumerate()
            .filter_map(|(pos, &id)| self.inner.vector(pos).map(|v| (id, v)))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let dims = self.dims();
        let mut buffer = Vec::with_capacity(HEADER_LEN + self.len() * (8 + dims * 4));
        buffer.extend_from_slice(MAGIC);
        buffer.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buffer.push(self.metric().tag());
        buffer.extend_from_slice(&(dims as u32).to_le_bytes());
        buffer.extend_from_slice(&(self.len() as u64).to_le_bytes());

        for (id, vector) in self.entries() {
            buffer.extend_from_slice(&id.to_le_bytes());
            buffer.extend_from_slice(&vec_to_blob(vector));
        }
        buffer
    }
}

impl IdMap<FlatIndex> {
    /// Decode an index written by [`to_bytes`](IdMap::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        let mut reader = Reader::new(bytes);

        if reader.take(4)? != MAGIC {
            return Err(IndexError::Corrupt("bad magic".to_string()));
        }
        let version = u16::from_le_bytes(reader.array()?);
        if version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported format version {}",
                version
            )));
        }
        let tag = reader.take(1)?[0];
        let metric = Metric::from_tag(tag)
            .ok_or_else(|| IndexError::Corrupt(format!("unknown metric tag {}", tag)))?;
        let dims = u32::from_le_bytes(reader.array()?) as usize;
        let count = u64::from_le_bytes(reader.array()?) as usize;

        if count > 0 && dims == 0 {
            return Err(IndexError::Corrupt(
                "non-empty index with zero dimension".to_string(),
            ));
        }
        let record_len = 8 + dims * 4;
        if reader.remaining() != count.saturating_mul(record_len) {
            return Err(IndexError::Corrupt(format!(
                "expected {} records of {} bytes, found {} bytes",
                count,
                record_len,
                reader.remaining()
            )));
        }

        let mut index = Self::create(dims, metric);
        let mut previous: Option<i64> = None;
        for _ in 0..count {
            let id = i64::from_le_bytes(reader.array()?);
            if previous.is_some_and(|p| id <= p) {
                return Err(IndexError::Corrupt(format!(
                    "ids not strictly increasing at id {}",
                    id
                )));
            }
            previous = Some(id);

            let vector = blob_to_vec(reader.take(dims * 4)?);
            index.inner.push(&vector);
            index.ids.push(id);
        }

        Ok(index)
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], IndexError> {
        if self.remaining() < n {
            return Err(IndexError::Corrupt(format!(
                "truncated at byte {} (wanted {} more)",
                self.pos, n
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], IndexError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

/// Encode a float vector as little-endian f32 bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian f32 bytes back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::normalize_l2;

    fn matrix(rows: Vec<Vec<f32>>) -> Embeddings {
        Embeddings::from_rows(rows).unwrap()
    }

    fn three_unit_vectors() -> IdMap {
        let mut diag = vec![1.0f32, 1.0];
        normalize_l2(&mut diag);
        let mut index = IdMap::create(2, Metric::InnerProduct);
        index
            .add(&matrix(vec![vec![1.0, 0.0], vec![0.0, 1.0], diag]), &[0, 1, 2])
            .unwrap();
        index
    }

    #[test]
    fn test_inner_product_ranking() {
        let index = three_unit_vectors();
        let hits = index.search(&[1.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 0);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].0, 2);
        assert!((hits[1].1 - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);

        let all = index.search(&[1.0, 0.0], 3);
        assert_eq!(all.last().map(|h| h.0), Some(1));
    }

    #[test]
    fn test_l2_ranking_lower_is_better() {
        let mut index = IdMap::create(2, Metric::L2);
        index
            .add(
                &matrix(vec![vec![10.0, 0.0], vec![1.0, 1.0], vec![0.0, 0.0]]),
                &[0, 1, 2],
            )
            .unwrap();
        let hits = index.search(&[0.5, 0.5], 3);
        let ids: Vec<i64> = hits.iter().map(|h| h.0).collect();
        assert_eq!(ids, vec![1, 2, 0]);
        assert!((hits[0].1 - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_search_returns_fewer_than_k() {
        let index = three_unit_vectors();
        assert_eq!(index.search(&[0.0, 1.0], 10).len(), 3);
        assert!(index.search(&[0.0, 1.0], 0).is_empty());
        assert!(IdMap::create(2, Metric::InnerProduct)
            .search(&[1.0, 0.0], 5)
            .is_empty());
    }

    #[test]
    fn test_nan_scores_rank_last() {
        for metric in [Metric::InnerProduct, Metric::L2] {
            let mut index = IdMap::create(2, metric);
            index
                .add(
                    &matrix(vec![
                        vec![f32::NAN, 0.0],
                        vec![1.0, 0.0],
                        vec![0.0, 1.0],
                        vec![f32::NAN, f32::NAN],
                    ]),
                    &[0, 1, 2, 3],
                )
                .unwrap();
            let ids: Vec<i64> = index.search(&[1.0, 0.0], 4).iter().map(|h| h.0).collect();
            assert_eq!(ids, vec![1, 2, 0, 3], "metric {}", metric);
        }
    }

    #[test]
    fn test_query_width_mismatch_yields_nothing() {
        let index = three_unit_vectors();
        assert!(index.search(&[1.0, 0.0, 0.0], 2).is_empty());
    }

    #[test]
    fn test_dimension_mismatch_leaves_index_untouched() {
        let mut index = three_unit_vectors();
        let err = index
            .add(&matrix(vec![vec![1.0, 0.0, 0.0]]), &[3])
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(index.len(), 3);
        assert_eq!(index.next_id(), 3);
    }

    #[test]
    #[should_panic(expected = "not greater than previous id")]
    fn test_non_monotonic_ids_panic() {
        let mut index = three_unit_vectors();
        index.add(&matrix(vec![vec![1.0, 0.0]]), &[2]).unwrap();
    }

    #[test]
    fn test_empty_add_is_noop() {
        let mut index = IdMap::create(4, Metric::InnerProduct);
        index.add(&Embeddings::empty(), &[]).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.next_id(), 0);
    }

    #[test]
    fn test_bytes_roundtrip_preserves_ids_and_vectors() {
        let index = three_unit_vectors();
        let decoded = IdMap::from_bytes(&index.to_bytes()).unwrap();
        assert_eq!(decoded.dims(), 2);
        assert_eq!(decoded.metric(), Metric::InnerProduct);
        assert_eq!(decoded.ids(), index.ids());
        let a: Vec<(i64, Vec<f32>)> = index.entries().map(|(i, v)| (i, v.to_vec())).collect();
        let b: Vec<(i64, Vec<f32>)> = decoded.entries().map(|(i, v)| (i, v.to_vec())).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            IdMap::from_bytes(b"not an index"),
            Err(IndexError::Corrupt(_))
        ));
        assert!(matches!(IdMap::from_bytes(&[]), Err(IndexError::Corrupt(_))));
    }

    #[test]
    fn test_decode_rejects_truncation_and_trailing_bytes() {
        let bytes = three_unit_vectors().to_bytes();
        assert!(IdMap::from_bytes(&bytes[..bytes.len() - 1]).is_err());

        let mut longer = bytes.clone();
        longer.push(0);
        assert!(IdMap::from_bytes(&longer).is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_metric() {
        let mut bytes = three_unit_vectors().to_bytes();
        bytes[6] = 9;
        assert!(IdMap::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }
}
