/// Retriever facade: query text in, ranked catalog items out.
///
/// Pipeline per call:
/// 1. Validate the query (before any external call).
/// 2. Encode sparse and dense representations concurrently.
/// 3. Search the sparse and dense fields concurrently; a degenerate vector
///    (empty sparse / all-zero dense) skips its search and contributes no candidates.
/// 4. Fuse with the query's weights.
/// 5. Materialize skus through the catalog; skus unknown to the catalog are dropped.
///
/// All collaborators are injected as shared handles and are read-only, so one
/// Retriever serves concurrent queries. Nothing is cached between calls.

use std::sync::Arc;

use super::fusion::{fuse_normalized, FusionWeights, RankedHit, ScoreNormalization};
use crate::catalog::{Catalog, CatalogItem};
use crate::config::SearchConfig;
use crate::encoding::sparse::SparseEncoder;
use crate::encoding::{DenseEncoder, EncodingError};
use crate::errors::ShopbotError;
use crate::index::{Candidate, Field, IndexError, Metric, QueryVector, VectorIndex};

/// One retrieval request.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub text: String,
    pub sparse_weight: f32,
    pub dense_weight: f32,
    /// Maximum number of results (K)
    pub limit: usize,
}

impl Query {
    /// Query with the default weights (0.5 / 0.5) and limit (5).
    pub fn new(text: impl Into<String>) -> Self {
        Query {
            text: text.into(),
            sparse_weight: 0.5,
            dense_weight: 0.5,
            limit: 5,
        }
    }

    /// Query using the configured per-query defaults.
    pub fn from_config(text: impl Into<String>, config: &SearchConfig) -> Self {
        Query::new(text)
            .with_weights(config.sparse_weight, config.dense_weight)
            .with_limit(config.limit)
    }

    pub fn with_weights(mut self, sparse_weight: f32, dense_weight: f32) -> Self {
        self.sparse_weight = sparse_weight;
        self.dense_weight = dense_weight;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn validate(&self) -> Result<(), ShopbotError> {
        if self.limit == 0 {
            return Err(ShopbotError::invalid_query("limit", "limit must be at least 1"));
        }
        for (field, weight) in [("sparse_weight", self.sparse_weight), ("dense_weight", self.dense_weight)] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(ShopbotError::invalid_query(
                    field,
                    &format!("{} must be between 0 and 1 (got {})", field, weight),
                ));
            }
        }
        Ok(())
    }
}

/// Index-side settings that stay fixed for the retriever's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct RetrieverOptions {
    pub metric: Metric,
    pub normalization: ScoreNormalization,
}

impl Default for RetrieverOptions {
    fn default() -> Self {
        RetrieverOptions {
            metric: Metric::InnerProduct,
            normalization: ScoreNormalization::None,
        }
    }
}

pub struct Retriever {
    catalog: Arc<Catalog>,
    sparse: Arc<SparseEncoder>,
    dense: Arc<dyn DenseEncoder>,
    index: Arc<dyn VectorIndex>,
    options: RetrieverOptions,
}

impl Retriever {
    pub fn new(
        catalog: Arc<Catalog>,
        sparse: Arc<SparseEncoder>,
        dense: Arc<dyn DenseEncoder>,
        index: Arc<dyn VectorIndex>,
        options: RetrieverOptions,
    ) -> Self {
        Retriever {
            catalog,
            sparse,
            dense,
            index,
            options,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Top-K catalog items for the query, most relevant first.
    pub async fn search(&self, query: &Query) -> Result<Vec<CatalogItem>, ShopbotError> {
        Ok(self
            .search_ranked(query)
            .await?
            .into_iter()
            .map(|(item, _)| item)
            .collect())
    }

    /// Like [`Retriever::search`], keeping the fused and raw scores of each item.
    pub async fn search_ranked(
        &self,
        query: &Query,
    ) -> Result<Vec<(CatalogItem, RankedHit)>, ShopbotError> {
        query.validate()?;

        let (sparse_vector, dense_vector) = tokio::try_join!(
            async { Ok::<_, EncodingError>(self.sparse.embed(&query.text)) },
            self.dense.embed(&query.text)
        )?;

        let sparse_query = QueryVector::Sparse(sparse_vector);
        let dense_query = QueryVector::Dense(dense_vector);
        let (sparse_hits, dense_hits) = tokio::try_join!(
            self.search_field(Field::Sparse, &sparse_query, query.limit),
            self.search_field(Field::Dense, &dense_query, query.limit)
        )?;

        let weights = FusionWeights {
            sparse: query.sparse_weight,
            dense: query.dense_weight,
        };
        let ranked = fuse_normalized(
            &sparse_hits,
            &dense_hits,
            weights,
            self.options.normalization,
            query.limit,
        );

        tracing::debug!(
            sparse_hits = sparse_hits.len(),
            dense_hits = dense_hits.len(),
            fused = ranked.len(),
            "Hybrid search complete"
        );

        let results = ranked
            .into_iter()
            .filter_map(|hit| match self.catalog.get(&hit.sku) {
                Some(item) => Some((item.clone(), hit)),
                None => {
                    tracing::debug!(sku = %hit.sku, "Index returned sku missing from catalog, dropping");
                    None
                }
            })
            .collect();
        Ok(results)
    }

    async fn search_field(
        &self,
        field: Field,
        query: &QueryVector,
        limit: usize,
    ) -> Result<Vec<Candidate>, IndexError> {
        let degenerate = match query {
            QueryVector::Sparse(v) => v.is_empty(),
            QueryVector::Dense(v) => v.is_zero(),
        };
        if degenerate {
            tracing::debug!(field = %field, "Query vector is empty, skipping field search");
            return Ok(Vec::new());
        }
        self.index
            .search_field(field, query, self.options.metric, limit)
            .await
    }
}
