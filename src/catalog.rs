/// Product catalog loaded once at startup.
///
/// The metadata table is read from CSV into an sku-keyed map so result sets can be
/// materialized with a keyed lookup per hit. Insertion order is kept separately; it
/// defines the corpus order used to fit the sparse encoder.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::config::CatalogConfig;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Io(String),

    #[error("Catalog is missing required column '{0}'")]
    MissingColumn(String),

    #[error("Malformed catalog row {row}: {message}")]
    Parse { row: usize, message: String },
}

/// One row of the product catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub sku: String,
    pub description: String,
    /// Every other column of the row, keyed by header name
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl CatalogItem {
    pub fn new(sku: impl Into<String>, description: impl Into<String>) -> Self {
        CatalogItem {
            sku: sku.into(),
            description: description.into(),
            attributes: BTreeMap::new(),
        }
    }
}

/// Immutable sku -> item lookup table.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: HashMap<String, CatalogItem>,
    order: Vec<String>,
}

impl Catalog {
    /// Build a catalog from in-memory items. Duplicate skus keep the first item.
    pub fn from_items(items: impl IntoIterator<Item = CatalogItem>) -> Self {
        let mut catalog = Catalog::default();
        for item in items {
            catalog.insert(item);
        }
        catalog
    }

    /// Load the catalog from a CSV file with a header row.
    pub fn from_csv(path: &Path, config: &CatalogConfig) -> Result<Self, CatalogError> {
        let file = std::fs::File::open(path)
            .map_err(|e| CatalogError::Io(format!("{}: {}", path.display(), e)))?;
        let catalog = Self::from_reader(file, config)?;
        tracing::info!(
            path = %path.display(),
            items = catalog.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    /// Load the catalog from any CSV source with a header row.
    pub fn from_reader<R: io::Read>(reader: R, config: &CatalogConfig) -> Result<Self, CatalogError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| CatalogError::Io(format!("Failed to read CSV header: {}", e)))?
            .clone();
        let sku_idx = headers
            .iter()
            .position(|h| h == config.sku_column)
            .ok_or_else(|| CatalogError::MissingColumn(config.sku_column.clone()))?;
        let description_idx = headers
            .iter()
            .position(|h| h == config.description_column)
            .ok_or_else(|| CatalogError::MissingColumn(config.description_column.clone()))?;

        let mut catalog = Catalog::default();
        for (row_num, result) in reader.records().enumerate() {
            // 1-based data row, header excluded
            let row = row_num + 1;
            let record = result.map_err(|e| CatalogError::Parse {
                row,
                message: e.to_string(),
            })?;

            let sku = record.get(sku_idx).map(str::trim).unwrap_or_default();
            if sku.is_empty() {
                tracing::warn!(row = row, "Skipping catalog row without sku");
                continue;
            }
            let description = record.get(description_idx).ok_or_else(|| CatalogError::Parse {
                row,
                message: format!("missing '{}' value", config.description_column),
            })?;

            let attributes = headers
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != sku_idx && *i != description_idx)
                .filter_map(|(i, h)| record.get(i).map(|v| (h.to_string(), v.to_string())))
                .collect();

            catalog.insert(CatalogItem {
                sku: sku.to_string(),
                description: description.to_string(),
                attributes,
            });
        }

        Ok(catalog)
    }

    fn insert(&mut self, item: CatalogItem) {
        if self.items.contains_key(&item.sku) {
            tracing::warn!(sku = %item.sku, "Duplicate sku in catalog, keeping first row");
            return;
        }
        self.order.push(item.sku.clone());
        self.items.insert(item.sku.clone(), item);
    }

    pub fn get(&self, sku: &str) -> Option<&CatalogItem> {
        self.items.get(sku)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Descriptions in catalog order: the corpus for fitting the sparse encoder.
    pub fn descriptions(&self) -> Vec<&str> {
        self.iter().map(|item| item.description.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogItem> + '_ {
        self.order.iter().filter_map(|sku| self.items.get(sku))
    }
}
