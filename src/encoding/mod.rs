/// Query encoders and the vector types they produce
///
/// Two modalities are supported: a corpus-fitted BM25 sparse encoder (lexical)
/// and a pretrained dense embedding model (semantic). Both are constructed once
/// and are read-only afterwards, so a single instance serves concurrent queries.

pub mod dense;
pub mod sparse;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while encoding text.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// The sparse encoder was fitted on a corpus with no documents
    #[error("Cannot fit lexical model on an empty corpus")]
    EmptyCorpus,

    /// fastembed model initialization failure
    #[error("Model initialization error: {0}")]
    ModelInit(String),

    /// Embedding generation failure (inference error)
    #[error("Embedding generation error: {0}")]
    Generation(String),

    /// Model produced a vector of unexpected length
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Sparse term-weight vector over a fitted vocabulary.
///
/// Entries are sorted by index, unique, and never zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    dimension: usize,
    entries: Vec<(u32, f32)>,
}

impl SparseVector {
    /// Build from arbitrary (index, weight) pairs. Duplicate indices are summed,
    /// zero weights dropped.
    pub fn new(dimension: usize, entries: impl IntoIterator<Item = (u32, f32)>) -> Self {
        let mut raw: Vec<(u32, f32)> = entries.into_iter().collect();
        raw.sort_by_key(|(idx, _)| *idx);

        let mut merged: Vec<(u32, f32)> = Vec::with_capacity(raw.len());
        for (idx, weight) in raw {
            match merged.last_mut() {
                Some((last, w)) if *last == idx => *w += weight,
                _ => merged.push((idx, weight)),
            }
        }
        merged.retain(|(_, w)| *w != 0.0);

        SparseVector {
            dimension,
            entries: merged,
        }
    }

    pub fn empty(dimension: usize) -> Self {
        SparseVector {
            dimension,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[(u32, f32)] {
        &self.entries
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<f32> {
        self.entries
            .binary_search_by_key(&index, |(idx, _)| *idx)
            .ok()
            .map(|pos| self.entries[pos].1)
    }

    /// Inner product via a merge walk over both sorted entry lists.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j, mut sum) = (0, 0, 0.0f32);
        while i < self.entries.len() && j < other.entries.len() {
            let (a_idx, a_w) = self.entries[i];
            let (b_idx, b_w) = other.entries[j];
            match a_idx.cmp(&b_idx) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += a_w * b_w;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// Fixed-length dense embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseVector(Vec<f32>);

impl DenseVector {
    pub fn new(values: Vec<f32>) -> Self {
        DenseVector(values)
    }

    pub fn zeros(dimension: usize) -> Self {
        DenseVector(vec![0.0; dimension])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// True for the degenerate vector produced from blank text.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    pub fn dot(&self, other: &DenseVector) -> f32 {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
    }

    /// Scale to unit L2 norm. The zero vector is returned unchanged.
    pub fn normalized(self) -> Self {
        let norm = self.0.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            return self;
        }
        DenseVector(self.0.into_iter().map(|v| v / norm).collect())
    }
}

/// Core trait for embedding text into fixed-dimension dense vectors.
///
/// Implementations must be Send + Sync: a single encoder is shared by every
/// in-flight query (e.g., Arc<dyn DenseEncoder>).
#[async_trait]
pub trait DenseEncoder: Send + Sync {
    /// Embed the given text. Blank text yields the zero vector.
    async fn embed(&self, text: &str) -> Result<DenseVector, EncodingError>;

    /// Dimension of the vectors produced by this model.
    fn dimension(&self) -> usize;

    /// Model name identifier (e.g., "clip-ViT-B-32").
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_vector_sorts_and_merges() {
        let v = SparseVector::new(10, vec![(7, 0.5), (2, 1.0), (7, 0.25), (4, 0.0)]);
        assert_eq!(v.entries(), &[(2, 1.0), (7, 0.75)]);
        assert_eq!(v.get(7), Some(0.75));
        assert_eq!(v.get(4), None);
    }

    #[test]
    fn test_sparse_dot_only_counts_shared_terms() {
        let a = SparseVector::new(8, vec![(1, 2.0), (3, 1.0), (5, 4.0)]);
        let b = SparseVector::new(8, vec![(3, 3.0), (5, 0.5), (6, 9.0)]);
        assert_eq!(a.dot(&b), 3.0 + 2.0);
        assert_eq!(a.dot(&SparseVector::empty(8)), 0.0);
    }

    #[test]
    fn test_dense_normalized_has_unit_norm() {
        let v = DenseVector::new(vec![3.0, 4.0]).normalized();
        assert_eq!(v.as_slice(), &[0.6, 0.8]);
    }

    #[test]
    fn test_dense_zero_vector_is_degenerate() {
        let v = DenseVector::zeros(4);
        assert!(v.is_zero());
        assert_eq!(v.clone().normalized(), v);
        assert!(!DenseVector::new(vec![0.0, 0.1]).is_zero());
    }
}
