/// Hybrid search: weighted fusion of sparse and dense field searches, and the
/// retriever facade that drives encode -> search -> fuse -> catalog lookup.

pub mod fusion;
pub mod retriever;

pub use fusion::{fuse, fuse_normalized, FusionWeights, RankedHit, ScoreNormalization};
pub use retriever::{Query, Retriever, RetrieverOptions};
