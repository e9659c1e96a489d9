//! recall - personal semantic memory service
//!
//! Stores free-text memories with flat metadata, embeds them into vector
//! space, retrieves them by cosine similarity, and cleans the corpus up:
//! exact duplicates, near-duplicates and consolidation candidates are found
//! read-only by the analyzer and applied transactionally by the executor.

pub mod cleanup;
pub mod config;
pub mod embedding;
pub mod memory;
pub mod service;

// Re-exports for convenience
pub use cleanup::{CleanupAnalyzer, CleanupExecutor, CleanupReport};
pub use config::ServerConfig;
pub use embedding::EmbeddingProvider;
pub use memory::{LocalMemoryStore, MemoryRecord, MemoryStore};
