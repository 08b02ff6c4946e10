/// Weighted linear fusion of the sparse and dense candidate lists.
///
/// fused(sku) = sparse_weight * score_in_sparse + dense_weight * score_in_dense
///
/// A sku missing from a list contributes 0 for that list. Ordering is fully
/// deterministic: fused score descending, then raw dense score descending (absent
/// counts as 0), then sku ascending. This holds even when both weights are zero.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::index::Candidate;

/// Per-list weights. Need not sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub sparse: f32,
    pub dense: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        FusionWeights {
            sparse: 0.5,
            dense: 0.5,
        }
    }
}

/// Transform applied to raw scores before weighting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreNormalization {
    /// Raw similarity scores
    #[default]
    None,
    /// 0.5 + atan(score)/π, mapping inner-product scores into (0, 1)
    Arctan,
}

impl ScoreNormalization {
    pub fn apply(self, score: f32) -> f32 {
        match self {
            ScoreNormalization::None => score,
            ScoreNormalization::Arctan => 0.5 + score.atan() / std::f32::consts::PI,
        }
    }
}

/// One entry of the fused ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedHit {
    pub sku: String,
    pub fused_score: f32,
    /// Raw score in the sparse list, if the sku appeared there
    pub sparse_score: Option<f32>,
    /// Raw score in the dense list, if the sku appeared there
    pub dense_score: Option<f32>,
}

/// Fuse raw scores. See [`fuse_normalized`].
pub fn fuse(
    sparse: &[Candidate],
    dense: &[Candidate],
    weights: FusionWeights,
    limit: usize,
) -> Vec<RankedHit> {
    fuse_normalized(sparse, dense, weights, ScoreNormalization::None, limit)
}

/// Fuse two single-field candidate lists into at most `limit` ranked hits.
///
/// A sku repeated within one list keeps its best score.
pub fn fuse_normalized(
    sparse: &[Candidate],
    dense: &[Candidate],
    weights: FusionWeights,
    normalization: ScoreNormalization,
    limit: usize,
) -> Vec<RankedHit> {
    let mut raw: HashMap<&str, (Option<f32>, Option<f32>)> = HashMap::new();

    for c in sparse {
        let entry = raw.entry(c.sku.as_str()).or_default();
        entry.0 = Some(entry.0.map_or(c.score, |s| s.max(c.score)));
    }
    for c in dense {
        let entry = raw.entry(c.sku.as_str()).or_default();
        entry.1 = Some(entry.1.map_or(c.score, |s| s.max(c.score)));
    }

    let mut hits: Vec<RankedHit> = raw
        .into_iter()
        .map(|(sku, (sparse_score, dense_score))| {
            let contribution = |score: Option<f32>, weight: f32| {
                score.map_or(0.0, |s| weight * normalization.apply(s))
            };
            let fused = contribution(sparse_score, weights.sparse)
                + contribution(dense_score, weights.dense);
            RankedHit {
                sku: sku.to_string(),
                fused_score: canonical_zero(fused),
                sparse_score,
                dense_score,
            }
        })
        .collect();

    hits.sort_by(|a, b| {
        b.fused_score
            .total_cmp(&a.fused_score)
            .then_with(|| {
                let (da, db) = (a.dense_score.unwrap_or(0.0), b.dense_score.unwrap_or(0.0));
                canonical_zero(db).total_cmp(&canonical_zero(da))
            })
            .then_with(|| a.sku.cmp(&b.sku))
    });
    hits.truncate(limit);
    hits
}

/// Fold -0.0 into 0.0 so total_cmp treats all zero scores as ties.
fn canonical_zero(x: f32) -> f32 {
    if x == 0.0 { 0.0 } else { x }
}
