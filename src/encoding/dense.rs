/// Local dense encoder using fastembed
///
/// Defaults to clip-ViT-B-32 (512 dimensions), the text tower of the multimodal model
/// the catalog's dense vectors were built with. No API key required: model weights are
/// downloaded once and cached locally.
/// fastembed inference is synchronous and takes the model mutably, so the model sits
/// behind a Mutex and every call runs in spawn_blocking.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::task;

use super::{DenseEncoder, DenseVector, EncodingError};
use crate::config::DenseConfig;

/// Compute device requested for inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

/// A supported fastembed model and its output dimension.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub model: EmbeddingModel,
    pub name: &'static str,
    pub dimension: usize,
}

impl ModelSpec {
    /// Resolve a configured model name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, EncodingError> {
        let spec = match name.to_ascii_lowercase().as_str() {
            "clip-vit-b-32" => ModelSpec {
                model: EmbeddingModel::ClipVitB32,
                name: "clip-ViT-B-32",
                dimension: 512,
            },
            "all-minilm-l6-v2" => ModelSpec {
                model: EmbeddingModel::AllMiniLML6V2,
                name: "all-MiniLM-L6-v2",
                dimension: 384,
            },
            "bge-small-en-v1.5" => ModelSpec {
                model: EmbeddingModel::BGESmallENV15,
                name: "bge-small-en-v1.5",
                dimension: 384,
            },
            "bge-base-en-v1.5" => ModelSpec {
                model: EmbeddingModel::BGEBaseENV15,
                name: "bge-base-en-v1.5",
                dimension: 768,
            },
            other => {
                return Err(EncodingError::ModelInit(format!(
                    "Unknown embedding model '{}'. Supported: clip-vit-b-32, all-minilm-l6-v2, \
                     bge-small-en-v1.5, bge-base-en-v1.5",
                    other
                )))
            }
        };
        Ok(spec)
    }
}

/// Dense encoder backed by a fastembed TextEmbedding.
pub struct FastEmbedEncoder {
    model: Arc<Mutex<TextEmbedding>>,
    name: String,
    dim: usize,
    normalize: bool,
}

impl FastEmbedEncoder {
    /// Load the configured model, downloading weights into `cache_dir` if not cached.
    pub async fn new(config: &DenseConfig) -> Result<Self, EncodingError> {
        let spec = ModelSpec::from_name(&config.model)?;

        if config.device == Device::Cuda {
            // Only the CPU execution provider is compiled in
            tracing::warn!(
                model = spec.name,
                "device = cuda requested but no accelerator execution provider is available, running on CPU"
            );
        }

        let cache_dir = config.cache_dir.clone();
        let model = spec.model.clone();
        let text_embedding = task::spawn_blocking(move || {
            std::fs::create_dir_all(&cache_dir).map_err(|e| {
                EncodingError::ModelInit(format!("Failed to create cache dir: {}", e))
            })?;
            TextEmbedding::try_new(
                InitOptions::new(model)
                    .with_cache_dir(cache_dir)
                    .with_show_download_progress(false),
            )
            .map_err(|e| EncodingError::ModelInit(e.to_string()))
        })
        .await
        .map_err(|e| EncodingError::ModelInit(e.to_string()))??;

        tracing::info!(
            model = spec.name,
            dimension = spec.dimension,
            normalize = config.normalize,
            "Dense encoder loaded"
        );

        Ok(FastEmbedEncoder {
            model: Arc::new(Mutex::new(text_embedding)),
            name: spec.name.to_string(),
            dim: spec.dimension,
            normalize: config.normalize,
        })
    }
}

/// Validate model output length and apply optional L2 normalization.
fn finish(values: Vec<f32>, expected: usize, normalize: bool) -> Result<DenseVector, EncodingError> {
    if values.len() != expected {
        return Err(EncodingError::DimensionMismatch {
            expected,
            actual: values.len(),
        });
    }
    let vector = DenseVector::new(values);
    Ok(if normalize { vector.normalized() } else { vector })
}

/// Blank text never reaches the model; it encodes to the zero vector.
fn blank_input(text: &str, dim: usize) -> Option<DenseVector> {
    text.trim().is_empty().then(|| DenseVector::zeros(dim))
}

#[async_trait]
impl DenseEncoder for FastEmbedEncoder {
    async fn embed(&self, text: &str) -> Result<DenseVector, EncodingError> {
        if let Some(zero) = blank_input(text, self.dim) {
            return Ok(zero);
        }

        let model = Arc::clone(&self.model);
        let input = vec![text.to_string()];
        let mut embeddings = task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| EncodingError::Generation("embedding model lock poisoned".to_string()))?;
            guard
                .embed(input, None)
                .map_err(|e| EncodingError::Generation(e.to_string()))
        })
        .await
        .map_err(|e| EncodingError::Generation(e.to_string()))??;

        let values = embeddings
            .pop()
            .ok_or_else(|| EncodingError::Generation("model returned no embedding".to_string()))?;
        finish(values, self.dim, self.normalize)
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_spec_dimensions() {
        assert_eq!(ModelSpec::from_name("clip-vit-b-32").unwrap().dimension, 512);
        assert_eq!(ModelSpec::from_name("CLIP-ViT-B-32").unwrap().name, "clip-ViT-B-32");
        assert_eq!(ModelSpec::from_name("all-minilm-l6-v2").unwrap().dimension, 384);
        assert_eq!(ModelSpec::from_name("bge-base-en-v1.5").unwrap().dimension, 768);
    }

    #[test]
    fn test_unknown_model_is_init_error() {
        let err = ModelSpec::from_name("word2vec").unwrap_err();
        assert!(matches!(err, EncodingError::ModelInit(ref m) if m.contains("word2vec")));
    }

    #[test]
    fn test_finish_rejects_wrong_dimension() {
        let err = finish(vec![0.1, 0.2], 3, false).unwrap_err();
        assert!(matches!(
            err,
            EncodingError::DimensionMismatch { expected: 3, actual: 2 }
        ));
    }

    #[test]
    fn test_blank_text_skips_the_model() {
        for text in ["", "   ", "\n\t "] {
            let v = blank_input(text, 512).expect("blank text should short-circuit");
            assert_eq!(v.as_slice().len(), 512);
            assert!(v.is_zero());
        }
        assert!(blank_input("red dress", 512).is_none());
        assert!(blank_input("  red  ", 512).is_none());
    }

    #[test]
    fn test_finish_normalizes_when_enabled() {
        let raw = finish(vec![3.0, 4.0], 2, false).unwrap();
        assert_eq!(raw.as_slice(), &[3.0, 4.0]);
        let unit = finish(vec![3.0, 4.0], 2, true).unwrap();
        assert_eq!(unit.as_slice(), &[0.6, 0.8]);
    }
}
