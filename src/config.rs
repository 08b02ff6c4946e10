/// Configuration management using figment
///
/// Loads configuration with this precedence (highest wins):
/// 1. Defaults (hardcoded)
/// 2. TOML file: shopbot.toml (in working directory, or the path given with --config)
/// 3. Environment variables: prefixed SHOPBOT_, nested with `__`
///    (e.g., SHOPBOT_LOG_LEVEL=debug, SHOPBOT_SEARCH__LIMIT=10)

use figment::{
    Figment,
    providers::{Env, Format, Toml, Serialized},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::encoding::dense::Device;
use crate::encoding::sparse::QueryWeighting;
use crate::errors::ShopbotError;
use crate::index::Metric;
use crate::search::fusion::ScoreNormalization;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub sparse: SparseConfig,

    #[serde(default)]
    pub dense: DenseConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub assistant: AssistantConfig,
}

/// Where the product metadata table lives and which columns carry the key fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub path: PathBuf,
    pub sku_column: String,
    pub description_column: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            path: PathBuf::from("data/processed_data/metadata.csv"),
            sku_column: "sku".to_string(),
            description_column: "description".to_string(),
        }
    }
}

/// Vector index connection and collection layout.
///
/// The collection is a pgvector table holding one row per catalog item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub database_url: String,
    /// Table name of the pre-populated collection
    pub collection: String,
    pub sku_field: String,
    pub sparse_field: String,
    pub dense_field: String,
    pub metric: Metric,
    pub max_connections: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            database_url: "postgres://localhost/shopbot".to_string(),
            collection: "zalando_fashionista_collection".to_string(),
            sku_field: "sku".to_string(),
            sparse_field: "sparse_vector".to_string(),
            dense_field: "dense_vector".to_string(),
            metric: Metric::InnerProduct,
            max_connections: 10,
        }
    }
}

/// BM25 parameters for the sparse encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SparseConfig {
    pub k1: f32,
    pub b: f32,
    /// Floor applied to negative idf values, as a fraction of the mean idf
    pub epsilon: f32,
    pub query_weighting: QueryWeighting,
}

impl Default for SparseConfig {
    fn default() -> Self {
        SparseConfig {
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
            query_weighting: QueryWeighting::Document,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DenseConfig {
    /// Model name: clip-vit-b-32, all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5
    pub model: String,
    pub device: Device,
    /// Directory for downloaded model weights
    pub cache_dir: PathBuf,
    /// L2-normalize query embeddings before search
    pub normalize: bool,
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("shopbot").join("models"))
        .unwrap_or_else(|| PathBuf::from(".fastembed_cache"))
}

impl Default for DenseConfig {
    fn default() -> Self {
        DenseConfig {
            model: "clip-vit-b-32".to_string(),
            device: Device::Cpu,
            cache_dir: default_cache_dir(),
            normalize: false,
        }
    }
}

/// Per-query defaults applied when the caller does not supply its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub sparse_weight: f32,
    pub dense_weight: f32,
    pub limit: usize,
    /// Applied by callers around each search, not by the retriever itself
    pub timeout_secs: u64,
    pub score_normalization: ScoreNormalization,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            sparse_weight: 0.5,
            dense_weight: 0.5,
            limit: 5,
            timeout_secs: 30,
            score_normalization: ScoreNormalization::None,
        }
    }
}

/// Ollama chat model settings for the sales assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub base_url: String,
    pub model: String,
    /// How long Ollama keeps the model resident after a request (e.g. "3h")
    pub keep_alive: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        AssistantConfig {
            base_url: "http://localhost:11434".to_string(),
            model: "gemma2:2b".to_string(),
            keep_alive: "3h".to_string(),
            max_tokens: 512,
            temperature: 0.0,
            timeout_secs: 120,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            catalog: CatalogConfig::default(),
            index: IndexConfig::default(),
            sparse: SparseConfig::default(),
            dense: DenseConfig::default(),
            search: SearchConfig::default(),
            assistant: AssistantConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, shopbot.toml, and environment variables
    ///
    /// Environment variables override TOML file values.
    /// Example: SHOPBOT_INDEX__DATABASE_URL overrides index.database_url in shopbot.toml
    pub fn load() -> Result<Config, ShopbotError> {
        Self::load_from(Path::new("shopbot.toml"))
    }

    /// Same as [`Config::load`] but reads the TOML layer from `path`.
    /// A missing file is not an error; figment skips it.
    pub fn load_from(path: &Path) -> Result<Config, ShopbotError> {
        Self::figment(Toml::file(path))
            .extract()
            .map_err(|e| ShopbotError::Config(format!("Failed to load config: {}", e)))
    }

    fn figment(toml: figment::providers::Data<Toml>) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(toml)
            .merge(Env::prefixed("SHOPBOT_").split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.catalog.sku_column, "sku");
        assert_eq!(config.index.collection, "zalando_fashionista_collection");
        assert_eq!(config.index.metric, Metric::InnerProduct);
        assert_eq!(config.search.sparse_weight, 0.5);
        assert_eq!(config.search.dense_weight, 0.5);
        assert_eq!(config.search.limit, 5);
        assert_eq!(config.dense.model, "clip-vit-b-32");
        assert_eq!(config.assistant.model, "gemma2:2b");
        assert_eq!(config.assistant.keep_alive, "3h");
        assert_eq!(config.assistant.max_tokens, 512);
    }

    #[test]
    fn test_toml_overrides_nested_sections() {
        let toml = r#"
            log_level = "debug"

            [search]
            sparse_weight = 0.7
            dense_weight = 0.3
            limit = 10
            timeout_secs = 5
            score_normalization = "arctan"

            [index]
            database_url = "postgres://db/catalog"
            collection = "products"
            sku_field = "sku"
            sparse_field = "sparse_vector"
            dense_field = "dense_vector"
            metric = "cosine"
            max_connections = 4
        "#;
        let config: Config = Config::figment(Toml::string(toml))
            .extract()
            .expect("config should parse");

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.search.limit, 10);
        assert_eq!(config.search.score_normalization, ScoreNormalization::Arctan);
        assert_eq!(config.index.metric, Metric::Cosine);
        assert_eq!(config.index.collection, "products");
        // Untouched sections keep their defaults
        assert_eq!(config.sparse.k1, 1.5);
        assert_eq!(config.assistant.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_partial_section_keeps_remaining_defaults() {
        let toml = r#"
            [dense]
            device = "cuda"
        "#;
        let config: Config = Config::figment(Toml::string(toml))
            .extract()
            .expect("config should parse");

        assert_eq!(config.dense.device, Device::Cuda);
        assert_eq!(config.dense.model, "clip-vit-b-32");
    }
}
