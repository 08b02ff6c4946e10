/// PostgreSQL + pgvector implementation of VectorIndex
///
/// A collection is a table with one row per catalog item: an sku column, a `sparsevec`
/// column and a `vector` column. The table must already exist and be populated;
/// readiness is verified once at connect time and connection failures surface as
/// IndexError::Unavailable.
///
/// pgvector operators return distances, so scores are derived per metric:
/// - inner product: `<#>` is the negative inner product, score = -(a <#> b)
/// - cosine:        `<=>` is cosine distance,         score = 1 - (a <=> b)
/// - L2:            `<->` is euclidean distance,      score = -(a <-> b)

use async_trait::async_trait;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    Row,
};
use std::collections::HashMap;
use std::time::Duration;

use super::{check_field, Candidate, Field, IndexError, Metric, QueryVector, VectorIndex};
use crate::config::IndexConfig;

/// Vector index client over a sqlx connection pool.
///
/// PgPool is internally synchronized, so one client serves concurrent searches.
pub struct PgVectorIndex {
    pool: PgPool,
    collection: String,
    sku_field: String,
    sparse_field: String,
    dense_field: String,
}

impl PgVectorIndex {
    /// Connect to the database and verify that the collection is ready to search.
    pub async fn connect(config: &IndexConfig) -> Result<Self, IndexError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.database_url)
            .await
            .map_err(|e| IndexError::Unavailable(format!("Failed to connect to database: {}", e)))?;

        let index = PgVectorIndex {
            pool,
            collection: config.collection.clone(),
            sku_field: config.sku_field.clone(),
            sparse_field: config.sparse_field.clone(),
            dense_field: config.dense_field.clone(),
        };
        index.health_check().await?;

        tracing::info!(collection = %index.collection, "Vector index ready");
        Ok(index)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Verify the pgvector extension, the collection table and its three columns.
    pub async fn health_check(&self) -> Result<(), IndexError> {
        let extension = sqlx::query("SELECT extversion FROM pg_extension WHERE extname = 'vector'")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexError::Unavailable(format!("Failed to query extensions: {}", e)))?;
        if extension.is_none() {
            return Err(IndexError::Unavailable(
                "pgvector extension 'vector' is not installed".to_string(),
            ));
        }

        let exists: bool = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = $1) AS present",
        )
        .bind(&self.collection)
        .fetch_one(&self.pool)
        .await
        .and_then(|row| row.try_get("present"))
        .map_err(|e| IndexError::Unavailable(format!("Failed to look up collection: {}", e)))?;
        if !exists {
            return Err(IndexError::Unavailable(format!(
                "Collection '{}' does not exist",
                self.collection
            )));
        }

        let rows = sqlx::query(
            "SELECT column_name::text AS column_name FROM information_schema.columns WHERE table_name = $1",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IndexError::Unavailable(format!("Failed to read collection schema: {}", e)))?;
        let present = rows
            .iter()
            .map(|row| row.try_get::<String, _>("column_name"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        let missing = missing_columns(
            &[self.sku_field.as_str(), self.sparse_field.as_str(), self.dense_field.as_str()],
            &present,
        );
        if !missing.is_empty() {
            return Err(IndexError::Unavailable(format!(
                "Collection '{}' is missing columns: {}",
                self.collection,
                missing.join(", ")
            )));
        }

        Ok(())
    }

    fn column_for(&self, field: Field) -> &str {
        match field {
            Field::Sparse => &self.sparse_field,
            Field::Dense => &self.dense_field,
        }
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn search_field(
        &self,
        field: Field,
        query: &QueryVector,
        metric: Metric,
        limit: usize,
    ) -> Result<Vec<Candidate>, IndexError> {
        check_field(field, query)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let sql = build_search_sql(
            &self.collection,
            &self.sku_field,
            self.column_for(field),
            field,
            metric,
        );

        let statement = sqlx::query(&sql);
        let statement = match query {
            QueryVector::Sparse(v) => statement.bind(to_pg_sparse(v)?),
            QueryVector::Dense(v) => statement.bind(pgvector::Vector::from(v.as_slice().to_vec())),
        };
        let rows = statement
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexError::Query(format!("{} search failed: {}", field, e)))?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let sku: String = row.try_get("sku").map_err(|e| IndexError::Decode(e.to_string()))?;
            let score: f64 = row.try_get("score").map_err(|e| IndexError::Decode(e.to_string()))?;
            candidates.push(Candidate::new(sku, score as f32));
        }

        tracing::debug!(
            field = %field,
            metric = ?metric,
            hits = candidates.len(),
            "Field search complete"
        );
        Ok(candidates)
    }
}

/// Quote a configured table/column name as a SQL identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn distance_operator(metric: Metric) -> &'static str {
    match metric {
        Metric::InnerProduct => "<#>",
        Metric::Cosine => "<=>",
        Metric::L2 => "<->",
    }
}

/// Build the single-field search statement. `$1` is the query vector, `$2` the limit.
///
/// Ordering is by raw distance ascending, which is score descending for every metric.
/// Sparse inner-product searches only return rows sharing at least one weighted term.
fn build_search_sql(table: &str, sku_col: &str, vector_col: &str, field: Field, metric: Metric) -> String {
    let distance = format!("({} {} $1)", quote_ident(vector_col), distance_operator(metric));
    let score = match metric {
        Metric::InnerProduct | Metric::L2 => format!("-{}", distance),
        Metric::Cosine => format!("1 - {}", distance),
    };
    let filter = if field == Field::Sparse && metric == Metric::InnerProduct {
        format!(" WHERE {} < 0", distance)
    } else {
        String::new()
    };
    format!(
        "SELECT {sku}::text AS sku, ({score})::float8 AS score FROM {table}{filter} ORDER BY {distance} LIMIT $2",
        sku = quote_ident(sku_col),
        score = score,
        table = quote_ident(table),
        filter = filter,
        distance = distance,
    )
}

fn to_pg_sparse(vector: &crate::encoding::SparseVector) -> Result<pgvector::SparseVector, IndexError> {
    let dim = i32::try_from(vector.dimension())
        .map_err(|_| IndexError::Query(format!("sparse dimension {} too large", vector.dimension())))?;
    let mut map: HashMap<i32, f32> = HashMap::with_capacity(vector.entries().len());
    for &(idx, weight) in vector.entries() {
        let idx = i32::try_from(idx)
            .map_err(|_| IndexError::Query(format!("sparse index {} too large", idx)))?;
        map.insert(idx, weight);
    }
    Ok(pgvector::SparseVector::from_map(&map, dim))
}

fn missing_columns(required: &[&str], present: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|col| !present.iter().any(|p| p == *col))
        .map(|col| col.to_string())
        .collect()
}
