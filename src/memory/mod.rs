//! Memory store module
//!
//! Defines the store seam the rest of the system depends on, plus the
//! local zstd-snapshot implementation.

pub mod record;
pub mod store;

pub use record::MemoryRecord;
pub use store::LocalMemoryStore;

use anyhow::Result;
use async_trait::async_trait;

/// Trait for the persistent memory store. The cleanup engine and the HTTP
/// surface only ever talk to this seam, so tests can inject fakes.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Insert a record, replacing any existing record with the same ID.
    async fn insert(&self, record: MemoryRecord) -> Result<String>;

    /// Fetch a single record by ID.
    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>>;

    /// Delete a record by ID. Returns false if no such record existed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Fetch the full corpus (content + metadata + embedding), optionally
    /// capped at `limit` records.
    async fn list_all(&self, limit: Option<usize>) -> Result<Vec<MemoryRecord>>;

    /// Total number of stored records.
    async fn count(&self) -> Result<usize>;

    /// Top-k cosine search against a query embedding, optionally filtered
    /// to records carrying `tag`.
    async fn search_similar(
        &self,
        embedding: &[f32],
        top_k: usize,
        tag: Option<&str>,
    ) -> Result<Vec<MemoryRecord>>;

    /// Persist the corpus to storage.
    async fn persist(&self) -> Result<()>;
}
