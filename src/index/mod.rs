/// Vector index client abstraction
///
/// The index holds, per catalog item, a sparse vector, a dense vector and the item's
/// sku. Searches are restricted to one vector field at a time; fusing the per-field
/// result lists is the caller's job (see search::fusion).

pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::encoding::{DenseVector, SparseVector};

/// Errors that can occur talking to the vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Connection or collection readiness failure at construction time
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    /// A search call failed (network, SQL, bad arguments)
    #[error("Index query failed: {0}")]
    Query(String),

    /// A result row could not be decoded
    #[error("Failed to decode index row: {0}")]
    Decode(String),
}

/// The vector field a search is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Sparse,
    Dense,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Sparse => write!(f, "sparse"),
            Field::Dense => write!(f, "dense"),
        }
    }
}

/// Similarity metric. Scores are always "higher is more similar".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    InnerProduct,
    Cosine,
    L2,
}

/// A query vector for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryVector {
    Sparse(SparseVector),
    Dense(DenseVector),
}

impl QueryVector {
    /// The field this vector can be searched against.
    pub fn field(&self) -> Field {
        match self {
            QueryVector::Sparse(_) => Field::Sparse,
            QueryVector::Dense(_) => Field::Dense,
        }
    }
}

/// One hit from a single-field search.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub sku: String,
    pub score: f32,
}

impl Candidate {
    pub fn new(sku: impl Into<String>, score: f32) -> Self {
        Candidate {
            sku: sku.into(),
            score,
        }
    }
}

/// Core trait for per-field nearest-neighbour search.
///
/// Implementations must be Send + Sync and safe for concurrent searches: the
/// retriever issues the sparse and dense searches at the same time on one handle.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `limit` candidates for `query` on `field`, ordered by score descending.
    async fn search_field(
        &self,
        field: Field,
        query: &QueryVector,
        metric: Metric,
        limit: usize,
    ) -> Result<Vec<Candidate>, IndexError>;
}

/// Reject a query vector that does not belong to the requested field.
pub(crate) fn check_field(field: Field, query: &QueryVector) -> Result<(), IndexError> {
    if query.field() != field {
        return Err(IndexError::Query(format!(
            "{} vector cannot be searched against the {} field",
            query.field(),
            field
        )));
    }
    Ok(())
}
