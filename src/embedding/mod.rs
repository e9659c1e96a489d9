//! Embedding provider
//!
//! The embedding model is an injected dependency, never ambient global
//! state; the cleanup engine and the service layer hold it behind this
//! trait, so tests swap in deterministic hand-built vectors.

use anyhow::{Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts into fixed-length vectors.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Name of the backing model, for the health surface.
    fn model_name(&self) -> &str;
}

/// fastembed-backed provider. The model is loaded lazily on first use and
/// output vectors are L2-normalized, so dot product equals cosine.
pub struct FastEmbedProvider {
    embedder: Arc<RwLock<Option<TextEmbedding>>>,
}

impl FastEmbedProvider {
    pub fn new() -> Self {
        Self {
            embedder: Arc::new(RwLock::new(None)),
        }
    }

    fn normalize(vec: &mut Vec<f32>) {
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in vec {
                *x /= norm;
            }
        }
    }
}

impl Default for FastEmbedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut lock = self.embedder.write().await;
        if lock.is_none() {
            info!("Initializing embedding model {}", self.model_name());
            let embedder =
                TextEmbedding::try_new(InitOptions::new(EmbeddingModel::AllMiniLML6V2))
                    .context("Failed to initialize embedding model")?;
            *lock = Some(embedder);
        }
        let embedder = lock.as_mut().context("embedder unavailable")?;
        let mut embeddings = embedder.embed(texts.to_vec(), None)?;
        for emb in &mut embeddings {
            Self::normalize(emb);
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        "all-MiniLM-L6-v2"
    }
}
