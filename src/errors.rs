/// Domain-specific error types for shopbot
///
/// Each subsystem (encoding, index, catalog, assistant) owns its own error enum;
/// this is the error surfaced by the retrieval facade and the configuration layer.

use crate::catalog::CatalogError;
use crate::encoding::EncodingError;
use crate::index::IndexError;

#[derive(Debug, thiserror::Error)]
pub enum ShopbotError {
    #[error("Invalid query: {message}")]
    InvalidQuery {
        message: String,
        field: Option<String>,
    },

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Search failed: {0}")]
    Search(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<IndexError> for ShopbotError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Unavailable(msg) => ShopbotError::IndexUnavailable(msg),
            other => ShopbotError::Search(other.to_string()),
        }
    }
}

impl ShopbotError {
    /// Helper to create invalid-query errors with field names
    ///
    /// Example:
    /// ```
    /// use shopbot::errors::ShopbotError;
    /// let err = ShopbotError::invalid_query("limit", "limit must be at least 1");
    /// ```
    pub fn invalid_query(field: &str, message: &str) -> Self {
        ShopbotError::InvalidQuery {
            message: message.to_string(),
            field: Some(field.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_unavailable_maps_to_top_level_variant() {
        let err: ShopbotError = IndexError::Unavailable("collection missing".to_string()).into();
        assert!(matches!(err, ShopbotError::IndexUnavailable(ref m) if m == "collection missing"));
    }

    #[test]
    fn test_index_query_failure_maps_to_search() {
        let err: ShopbotError = IndexError::Query("connection reset".to_string()).into();
        match err {
            ShopbotError::Search(msg) => assert!(msg.contains("connection reset")),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_query_helper_sets_field() {
        let err = ShopbotError::invalid_query("limit", "limit must be at least 1");
        match err {
            ShopbotError::InvalidQuery { message, field } => {
                assert_eq!(message, "limit must be at least 1");
                assert_eq!(field.as_deref(), Some("limit"));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }
}
