//! Local memory store
//!
//! Keeps the full corpus in RAM behind an RwLock and persists it as a
//! zstd-compressed JSON snapshot. Searches fan out over rayon.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rayon::prelude::*;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{MemoryRecord, MemoryStore};
use crate::cleanup::similarity::cosine_similarity;

pub struct LocalMemoryStore {
    path: PathBuf,
    entries: Arc<RwLock<Vec<MemoryRecord>>>,
}

impl LocalMemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = Self::load(&path)?;
        if !entries.is_empty() {
            info!("Loaded {} memories from {:?}", entries.len(), path);
        }
        Ok(Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    fn load(path: &PathBuf) -> Result<Vec<MemoryRecord>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(path).with_context(|| format!("opening snapshot {:?}", path))?;
        let decoder = zstd::stream::read::Decoder::new(file)?;
        let entries = serde_json::from_reader(decoder)
            .with_context(|| format!("decoding snapshot {:?}", path))?;
        Ok(entries)
    }
}

#[async_trait]
impl MemoryStore for LocalMemoryStore {
    async fn insert(&self, record: MemoryRecord) -> Result<String> {
        let mut entries = self.entries.write().await;
        entries.retain(|e| e.id != record.id);
        let id = record.id.clone();
        entries.push(record);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().find(|e| e.id == id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        Ok(entries.len() < before)
    }

    async fn list_all(&self, limit: Option<usize>) -> Result<Vec<MemoryRecord>> {
        let entries = self.entries.read().await;
        let mut all: Vec<MemoryRecord> = entries.iter().cloned().collect();
        if let Some(limit) = limit {
            all.truncate(limit);
        }
        Ok(all)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }

    async fn search_similar(
        &self,
        embedding: &[f32],
        top_k: usize,
        tag: Option<&str>,
    ) -> Result<Vec<MemoryRecord>> {
        let entries = self.entries.read().await;

        let mut scored: Vec<(f32, MemoryRecord)> = entries
            .par_iter()
            .filter(|e| tag.map_or(true, |t| e.tags().iter().any(|have| have == t)))
            .filter_map(|e| {
                e.embedding
                    .as_ref()
                    .map(|emb| (cosine_similarity(embedding, emb), e.clone()))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        debug!("Search scored {} candidates", scored.len());

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, mut e)| {
                e.similarity = Some(score);
                e
            })
            .collect())
    }

    async fn persist(&self) -> Result<()> {
        let entries = self.entries.read().await.clone();
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let file = File::create(path)?;
            let writer = BufWriter::new(file);
            let mut encoder = zstd::stream::write::Encoder::new(writer, 3)?;
            serde_json::to_writer(&mut encoder, &entries)?;
            encoder.finish()?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;

        Ok(())
    }
}
