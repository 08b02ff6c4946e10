//! End-to-end retrieval tests against an in-memory vector index.
//!
//! The index computes exact inner products over documents encoded with the same
//! sparse encoder the retriever uses, and a keyword-count dense encoder stands in
//! for the embedding model, so no database or model download is needed.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use shopbot::catalog::{Catalog, CatalogItem};
use shopbot::config::SparseConfig;
use shopbot::encoding::sparse::{tokenize, SparseEncoder};
use shopbot::encoding::{DenseEncoder, DenseVector, EncodingError, SparseVector};
use shopbot::errors::ShopbotError;
use shopbot::index::{Candidate, Field, IndexError, Metric, QueryVector, VectorIndex};
use shopbot::search::{Query, Retriever, RetrieverOptions};

const CONCEPTS: [&str; 12] = [
    "dress", "jacket", "shoe", "sneaker", "red", "blue", "black", "white", "leather", "denim",
    "summer", "run",
];

/// Dense stand-in: one dimension per concept stem, valued by occurrence count.
struct KeywordEncoder;

#[async_trait]
impl DenseEncoder for KeywordEncoder {
    async fn embed(&self, text: &str) -> Result<DenseVector, EncodingError> {
        let tokens = tokenize(text);
        let values = CONCEPTS
            .iter()
            .map(|c| tokens.iter().filter(|t| t == c).count() as f32)
            .collect();
        Ok(DenseVector::new(values))
    }

    fn dimension(&self) -> usize {
        CONCEPTS.len()
    }

    fn model_name(&self) -> &str {
        "keyword-count"
    }
}

struct FailingEncoder;

#[async_trait]
impl DenseEncoder for FailingEncoder {
    async fn embed(&self, _text: &str) -> Result<DenseVector, EncodingError> {
        Err(EncodingError::Generation("inference session crashed".to_string()))
    }

    fn dimension(&self) -> usize {
        CONCEPTS.len()
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

struct Row {
    sku: String,
    sparse: SparseVector,
    dense: DenseVector,
}

/// Exact inner-product index; counts calls so tests can assert none were made.
struct InMemoryIndex {
    rows: Vec<Row>,
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn search_field(
        &self,
        field: Field,
        query: &QueryVector,
        _metric: Metric,
        limit: usize,
    ) -> Result<Vec<Candidate>, IndexError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(IndexError::Query("connection reset by peer".to_string()));
        }

        let mut hits: Vec<Candidate> = match (field, query) {
            (Field::Sparse, QueryVector::Sparse(q)) => self
                .rows
                .iter()
                .map(|r| Candidate::new(r.sku.clone(), q.dot(&r.sparse)))
                .filter(|c| c.score > 0.0)
                .collect(),
            (Field::Dense, QueryVector::Dense(q)) => self
                .rows
                .iter()
                .map(|r| Candidate::new(r.sku.clone(), q.dot(&r.dense)))
                .collect(),
            _ => return Err(IndexError::Query("field/vector mismatch".to_string())),
        };
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.sku.cmp(&b.sku)));
        hits.truncate(limit);
        Ok(hits)
    }
}

fn catalog_items() -> Vec<CatalogItem> {
    vec![
        CatalogItem::new("SKU-RD", "red summer dress with floral print"),
        CatalogItem::new("SKU-BJ", "blue denim jacket with button front"),
        CatalogItem::new("SKU-LJ", "black leather jacket for men"),
        CatalogItem::new("SKU-RS", "red running shoe with foam sole"),
        CatalogItem::new("SKU-WS", "white leather sneaker"),
    ]
}

struct Fixture {
    retriever: Arc<Retriever>,
    index: Arc<InMemoryIndex>,
}

async fn fixture_with(dense: Arc<dyn DenseEncoder>, fail_index: bool) -> Fixture {
    let catalog = Arc::new(Catalog::from_items(catalog_items()));
    let sparse = Arc::new(SparseEncoder::fit(&catalog.descriptions(), &SparseConfig::default()).unwrap());

    // The index also holds an item the catalog no longer knows about
    let mut indexed: Vec<(String, String)> = catalog
        .iter()
        .map(|i| (i.sku.clone(), i.description.clone()))
        .collect();
    indexed.push(("SKU-GHOST".to_string(), "red summer dress limited edition".to_string()));

    let mut rows = Vec::new();
    for (sku, description) in indexed {
        rows.push(Row {
            sparse: sparse.embed_document(&description),
            dense: KeywordEncoder.embed(&description).await.unwrap(),
            sku,
        });
    }

    let index = Arc::new(InMemoryIndex {
        rows,
        calls: AtomicUsize::new(0),
        fail: fail_index,
    });
    let retriever = Arc::new(Retriever::new(
        catalog,
        sparse,
        dense,
        index.clone(),
        RetrieverOptions::default(),
    ));
    Fixture { retriever, index }
}

async fn fixture() -> Fixture {
    fixture_with(Arc::new(KeywordEncoder), false).await
}

fn skus(items: &[CatalogItem]) -> Vec<&str> {
    items.iter().map(|i| i.sku.as_str()).collect()
}

#[tokio::test]
async fn test_best_match_ranks_first() {
    let f = fixture().await;
    let results = f.retriever.search(&Query::new("red summer dress")).await.unwrap();

    assert_eq!(results[0].sku, "SKU-RD");
    assert_eq!(results[1].sku, "SKU-RS");
    assert_eq!(f.index.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_sku_missing_from_catalog_is_dropped() {
    let f = fixture().await;
    let ranked = f
        .retriever
        .search_ranked(&Query::new("red summer dress"))
        .await
        .unwrap();

    // SKU-GHOST ties with SKU-RD and wins the sku tie-break, but has no catalog entry
    assert!(ranked.iter().all(|(item, _)| item.sku != "SKU-GHOST"));
    assert_eq!(ranked[0].0.sku, "SKU-RD");
    assert!(ranked.len() < 5);
}

#[tokio::test]
async fn test_search_is_deterministic() {
    let f = fixture().await;
    let query = Query::new("leather jacket").with_weights(0.3, 0.7);
    let first = f.retriever.search(&query).await.unwrap();
    let second = f.retriever.search(&query).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_limit_is_respected() {
    let f = fixture().await;
    for k in 1..=6 {
        let results = f
            .retriever
            .search(&Query::new("red leather jacket shoe").with_limit(k))
            .await
            .unwrap();
        assert!(results.len() <= k, "got {} results for limit {}", results.len(), k);
    }
}

#[tokio::test]
async fn test_zero_weights_use_tie_break_order() {
    let f = fixture().await;
    let query = Query::new("leather jacket").with_weights(0.0, 0.0).with_limit(3);
    let results = f.retriever.search(&query).await.unwrap();

    // All fused scores are 0: dense score decides, then sku
    assert_eq!(skus(&results), vec!["SKU-LJ", "SKU-BJ", "SKU-WS"]);
}

#[tokio::test]
async fn test_empty_query_returns_no_results_without_searching() {
    let f = fixture().await;
    let results = f.retriever.search(&Query::new("")).await.unwrap();
    assert!(results.is_empty());

    // Stop words leave an empty sparse vector, and the keyword stand-in a zero dense one
    let results = f.retriever.search(&Query::new("   the of and ")).await.unwrap();
    assert!(results.is_empty());
    assert_eq!(f.index.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_zero_limit_fails_before_contacting_index() {
    let f = fixture().await;
    let err = f
        .retriever
        .search(&Query::new("red dress").with_limit(0))
        .await
        .unwrap_err();

    assert!(matches!(err, ShopbotError::InvalidQuery { .. }));
    assert_eq!(f.index.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_negative_weight_fails_before_contacting_index() {
    let f = fixture().await;
    let err = f
        .retriever
        .search(&Query::new("red dress").with_weights(-1.0, 0.5))
        .await
        .unwrap_err();

    assert!(matches!(err, ShopbotError::InvalidQuery { .. }));
    assert_eq!(f.index.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_weight_above_one_fails_before_contacting_index() {
    let f = fixture().await;
    let err = f
        .retriever
        .search(&Query::new("red dress").with_weights(0.5, 1.5))
        .await
        .unwrap_err();

    assert!(matches!(err, ShopbotError::InvalidQuery { .. }));
    assert_eq!(f.index.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_index_failure_propagates_as_search_error() {
    let f = fixture_with(Arc::new(KeywordEncoder), true).await;
    let err = f.retriever.search(&Query::new("red dress")).await.unwrap_err();
    match err {
        ShopbotError::Search(msg) => assert!(msg.contains("connection reset")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_encoder_failure_propagates() {
    let f = fixture_with(Arc::new(FailingEncoder), false).await;
    let err = f.retriever.search(&Query::new("red dress")).await.unwrap_err();
    assert!(matches!(err, ShopbotError::Encoding(EncodingError::Generation(_))));
    assert_eq!(f.index.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_sparse_only_signal_still_ranks() {
    // "floral" has no dense concept, so only the lexical search contributes
    let f = fixture().await;
    let results = f.retriever.search(&Query::new("floral")).await.unwrap();
    assert_eq!(skus(&results), vec!["SKU-RD"]);
    assert_eq!(f.index.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_searches_share_one_retriever() {
    let f = fixture().await;
    let expected = f.retriever.search(&Query::new("white sneaker")).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let retriever = Arc::clone(&f.retriever);
        handles.push(tokio::spawn(async move {
            retriever.search(&Query::new("white sneaker")).await
        }));
    }
    for handle in handles {
        let results = handle.await.unwrap().unwrap();
        assert_eq!(results, expected);
    }
    assert_eq!(expected[0].sku, "SKU-WS");
}
