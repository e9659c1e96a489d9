//! Cleanup executor
//!
//! The only path that mutates the store. Validates the approved action list
//! before touching anything, then applies each action with per-item error
//! accumulation: one failed delete never aborts the rest of the batch.
//!
//! Consolidation is insert-then-delete. The merged record must land before
//! any original member is removed, so a failed insert leaves the group
//! untouched.

use anyhow::Result;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::analyzer::{CleanupReport, ConsolidationGroupReport, DuplicateGroupReport};
use super::groups::ConsolidationGroup;
use super::{CleanupAction, CleanupError};
use crate::embedding::EmbeddingProvider;
use crate::memory::{MemoryRecord, MemoryStore};

/// Per-action tally of what happened.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub successes: Vec<String>,
    pub errors: Vec<String>,
}

/// Result of one `execute` call, keyed by action name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub executed_actions: Vec<String>,
    pub results: BTreeMap<String, ActionOutcome>,
}

pub struct CleanupExecutor {
    store: Arc<dyn MemoryStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl CleanupExecutor {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self {
            store,
            embedder: None,
        }
    }

    /// Attach an embedding provider so consolidated records are inserted
    /// with a fresh embedding for their merged content.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Apply the approved actions from `report` against the store.
    ///
    /// The whole action list is validated before the first store call;
    /// an empty list or an unknown action name rejects the call outright.
    /// Within a validated action, items fail independently.
    pub async fn execute(
        &self,
        report: &CleanupReport,
        actions_to_execute: &[String],
    ) -> Result<ExecutionSummary> {
        let actions = Self::validate_actions(actions_to_execute)?;
        info!("Executing cleanup actions: {:?}", actions_to_execute);

        let mut results = BTreeMap::new();
        for action in &actions {
            let outcome = match action {
                CleanupAction::ExactDuplicates => {
                    self.remove_duplicates(&report.analysis.exact_duplicates)
                        .await
                }
                CleanupAction::NearDuplicates => {
                    self.remove_duplicates(&report.analysis.near_duplicates)
                        .await
                }
                CleanupAction::Consolidation => {
                    self.consolidate(&report.analysis.consolidation_groups).await
                }
            };
            results.insert(action.as_str().to_string(), outcome);
        }

        Ok(ExecutionSummary {
            executed_actions: actions.iter().map(|a| a.as_str().to_string()).collect(),
            results,
        })
    }

    fn validate_actions(actions: &[String]) -> Result<Vec<CleanupAction>, CleanupError> {
        if actions.is_empty() {
            return Err(CleanupError::NoActions);
        }
        actions.iter().map(|a| CleanupAction::parse(a)).collect()
    }

    /// Delete every removal candidate across the given groups. Deletions are
    /// independent, so they are issued concurrently; ordering between them
    /// carries no meaning.
    async fn remove_duplicates(&self, groups: &[DuplicateGroupReport]) -> ActionOutcome {
        let ids: Vec<&String> = groups
            .iter()
            .flat_map(|g| g.duplicates_to_remove.iter())
            .collect();

        let deletions = ids.iter().map(|id| {
            let store = Arc::clone(&self.store);
            async move { (id.to_string(), store.delete(id).await) }
        });

        let mut outcome = ActionOutcome::default();
        for (id, result) in join_all(deletions).await {
            match result {
                Ok(true) => outcome.successes.push(id),
                Ok(false) => {
                    // Already gone, most likely deleted by a concurrent
                    // actor since the analysis ran. Not a failure.
                    warn!("Memory {} no longer exists, skipping delete", id);
                }
                Err(e) => outcome.errors.push(format!("{}: {}", id, e)),
            }
        }
        outcome
    }

    /// Merge each consolidation group into one new record. The originals are
    /// only deleted after the insert has succeeded; a member delete that
    /// fails afterwards is recorded in the tally so the caller can retry
    /// exactly that leg.
    async fn consolidate(&self, groups: &[ConsolidationGroupReport]) -> ActionOutcome {
        let mut outcome = ActionOutcome::default();

        for report in groups {
            match self.consolidate_group(report).await {
                Ok(Some((new_id, merged, delete_errors))) => {
                    outcome
                        .successes
                        .push(format!("consolidated {} memories into {}", merged, new_id));
                    outcome.errors.extend(delete_errors);
                }
                Ok(None) => {
                    warn!(
                        "Skipping consolidation group ({}): too few members remain",
                        report.reason
                    );
                }
                Err(e) => outcome.errors.push(format!("{}: {}", report.reason, e)),
            }
        }
        outcome
    }

    async fn consolidate_group(
        &self,
        report: &ConsolidationGroupReport,
    ) -> Result<Option<(String, usize, Vec<String>)>> {
        // The report only carries truncated previews; re-fetch the full
        // records. Members deleted since the analysis ran are skipped.
        let mut members = Vec::new();
        for preview in &report.memories {
            match self.store.get(&preview.id).await? {
                Some(record) => members.push(record),
                None => warn!("Memory {} no longer exists, leaving it out of the merge", preview.id),
            }
        }
        if members.len() < 2 {
            return Ok(None);
        }

        let member_ids: Vec<String> = members.iter().map(|m| m.id.clone()).collect();
        let group = ConsolidationGroup::new(members, report.reason.clone());
        let content = group.create_consolidated_content();

        let embedding = match &self.embedder {
            Some(embedder) => embedder.embed(&[content.clone()]).await?.into_iter().next(),
            None => None,
        };

        let merged = MemoryRecord {
            id: Uuid::new_v4().to_string(),
            content,
            metadata: group.consolidated_metadata(),
            embedding,
            similarity: None,
        };

        // Insert first. If this fails the originals stay untouched.
        let new_id = self.store.insert(merged).await?;

        let deletions = member_ids.iter().map(|id| {
            let store = Arc::clone(&self.store);
            async move { (id.clone(), store.delete(id).await) }
        });
        let mut delete_errors = Vec::new();
        for (id, result) in join_all(deletions).await {
            match result {
                Ok(true) => {}
                Ok(false) => warn!("Memory {} no longer exists, skipping delete", id),
                Err(e) => {
                    // The merged record landed but this original is still in
                    // the store; surface it so the caller can retry.
                    warn!("Failed to delete consolidated member {}: {}", id, e);
                    delete_errors.push(format!("{}: {}", id, e));
                }
            }
        }

        Ok(Some((new_id, member_ids.len(), delete_errors)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::analyzer::{CleanupAnalysis, EstimatedCleanup};
    use crate::cleanup::CleanupAnalyzer;
    use anyhow::{anyhow, bail};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    /// In-memory store that counts calls and can be told to fail.
    #[derive(Default)]
    struct FakeStore {
        records: RwLock<Vec<MemoryRecord>>,
        calls: AtomicUsize,
        fail_deletes: bool,
        fail_inserts: bool,
    }

    impl FakeStore {
        fn with_records(records: Vec<MemoryRecord>) -> Self {
            Self {
                records: RwLock::new(records),
                ..Default::default()
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MemoryStore for FakeStore {
        async fn insert(&self, record: MemoryRecord) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_inserts {
                bail!("insert refused");
            }
            let mut records = self.records.write().await;
            records.retain(|r| r.id != record.id);
            let id = record.id.clone();
            records.push(record);
            Ok(id)
        }

        async fn get(&self, id: &str) -> Result<Option<MemoryRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.read().await.iter().find(|r| r.id == id).cloned())
        }

        async fn delete(&self, id: &str) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_deletes {
                return Err(anyhow!("delete refused"));
            }
            let mut records = self.records.write().await;
            let before = records.len();
            records.retain(|r| r.id != id);
            Ok(records.len() < before)
        }

        async fn list_all(&self, limit: Option<usize>) -> Result<Vec<MemoryRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut all = self.records.read().await.clone();
            if let Some(limit) = limit {
                all.truncate(limit);
            }
            Ok(all)
        }

        async fn count(&self) -> Result<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.read().await.len())
        }

        async fn search_similar(
            &self,
            _embedding: &[f32],
            _top_k: usize,
            _tag: Option<&str>,
        ) -> Result<Vec<MemoryRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn persist(&self) -> Result<()> {
            Ok(())
        }
    }

    fn record(id: &str, content: &str, importance: f64, created_at: &str) -> MemoryRecord {
        let mut r = MemoryRecord::new(content)
            .with_importance(importance)
            .with_created_at(created_at);
        r.id = id.to_string();
        r
    }

    async fn analyze(store: &Arc<FakeStore>) -> CleanupReport {
        let analyzer = CleanupAnalyzer::new(Arc::clone(store) as Arc<dyn MemoryStore>);
        analyzer.analyze(0.85, 0.70).await.unwrap()
    }

    #[tokio::test]
    async fn test_unknown_action_rejected_before_any_store_call() {
        let store = Arc::new(FakeStore::default());
        let executor = CleanupExecutor::new(Arc::clone(&store) as Arc<dyn MemoryStore>);
        let report = CleanupReport {
            total_memories: 0,
            analysis: CleanupAnalysis {
                exact_duplicates: vec![],
                near_duplicates: vec![],
                consolidation_groups: vec![],
            },
            estimated_cleanup: EstimatedCleanup {
                memories_to_delete: 0,
                groups_to_consolidate: 0,
            },
        };

        let err = executor
            .execute(&report, &["exact_duplicates".into(), "bogus".into()])
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<CleanupError>().is_some());
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_action_list_rejected() {
        let store = Arc::new(FakeStore::default());
        let executor = CleanupExecutor::new(Arc::clone(&store) as Arc<dyn MemoryStore>);
        let report = analyze(&store).await;
        store.calls.store(0, Ordering::SeqCst);

        let err = executor.execute(&report, &[]).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CleanupError>(),
            Some(CleanupError::NoActions)
        ));
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_exact_duplicates_deleted_and_tallied() {
        let store = Arc::new(FakeStore::with_records(vec![
            record("a", "Buy milk", 3.0, "2024-01-01"),
            record("b", "buy milk", 7.0, "2024-01-02"),
            record("c", "unrelated", 1.0, "2024-01-03"),
        ]));
        let report = analyze(&store).await;
        let executor = CleanupExecutor::new(Arc::clone(&store) as Arc<dyn MemoryStore>);

        let summary = executor
            .execute(&report, &["exact_duplicates".into()])
            .await
            .unwrap();

        let outcome = &summary.results["exact_duplicates"];
        assert_eq!(outcome.successes, vec!["a"]);
        assert!(outcome.errors.is_empty());
        assert_eq!(store.count().await.unwrap(), 2);
        assert!(store.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_failures_recorded_not_fatal() {
        let mut store = FakeStore::with_records(vec![
            record("a", "same", 3.0, "2024-01-01"),
            record("b", "same", 7.0, "2024-01-02"),
        ]);
        store.fail_deletes = true;
        let store = Arc::new(store);
        let report = analyze(&store).await;
        let executor = CleanupExecutor::new(Arc::clone(&store) as Arc<dyn MemoryStore>);

        let summary = executor
            .execute(&report, &["exact_duplicates".into()])
            .await
            .unwrap();

        let outcome = &summary.results["exact_duplicates"];
        assert!(outcome.successes.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("a:"));
    }

    #[tokio::test]
    async fn test_missing_ids_skipped_silently() {
        let store = Arc::new(FakeStore::with_records(vec![
            record("a", "same", 3.0, "2024-01-01"),
            record("b", "same", 7.0, "2024-01-02"),
        ]));
        let report = analyze(&store).await;
        // Concurrent actor removes the candidate between analyze and execute.
        store.delete("a").await.unwrap();
        let executor = CleanupExecutor::new(Arc::clone(&store) as Arc<dyn MemoryStore>);

        let summary = executor
            .execute(&report, &["exact_duplicates".into()])
            .await
            .unwrap();

        let outcome = &summary.results["exact_duplicates"];
        assert!(outcome.successes.is_empty());
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn test_consolidation_inserts_merged_record_then_deletes_originals() {
        let store = Arc::new(FakeStore::with_records(vec![
            record("a", "Rust ownership notes", 2.0, "2024-01-01")
                .with_tags(&["rust"])
                .with_source("claude")
                .with_embedding(vec![0.0, 1.0, 0.0]),
            record("b", "Rust borrowing notes", 4.0, "2024-01-02")
                .with_tags(&["rust", "notes"])
                .with_source("api")
                .with_embedding(vec![0.0, 0.78, 0.625]),
        ]));
        let report = analyze(&store).await;
        assert_eq!(report.analysis.consolidation_groups.len(), 1);
        let executor = CleanupExecutor::new(Arc::clone(&store) as Arc<dyn MemoryStore>);

        let summary = executor
            .execute(&report, &["consolidation".into()])
            .await
            .unwrap();

        let outcome = &summary.results["consolidation"];
        assert_eq!(outcome.successes.len(), 1);
        assert!(outcome.successes[0].starts_with("consolidated 2 memories into "));

        let remaining = store.list_all(None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        let merged = &remaining[0];
        assert_eq!(merged.source(), "consolidated");
        assert_eq!(merged.importance(), 3.0);
        assert!(merged.content.contains("[1] Rust ownership notes"));
        assert!(merged.content.contains("[2] Rust borrowing notes"));
        assert_eq!(merged.tags(), vec!["notes", "rust"]);
    }

    #[tokio::test]
    async fn test_failed_member_deletes_surface_in_errors() {
        // Insert works, the delete leg does not: the merged record lands but
        // the originals stay behind. The tally must say so, not claim a
        // clean merge.
        let mut store = FakeStore::with_records(vec![
            record("a", "first note", 2.0, "2024-01-01").with_embedding(vec![0.0, 1.0, 0.0]),
            record("b", "second note", 4.0, "2024-01-02").with_embedding(vec![0.0, 0.78, 0.625]),
        ]);
        store.fail_deletes = true;
        let store = Arc::new(store);
        let report = analyze(&store).await;
        let executor = CleanupExecutor::new(Arc::clone(&store) as Arc<dyn MemoryStore>);

        let summary = executor
            .execute(&report, &["consolidation".into()])
            .await
            .unwrap();

        let outcome = &summary.results["consolidation"];
        assert_eq!(outcome.successes.len(), 1);
        assert!(outcome.successes[0].starts_with("consolidated 2 memories into "));
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors.iter().any(|e| e.starts_with("a:")));
        assert!(outcome.errors.iter().any(|e| e.starts_with("b:")));

        // Merged record plus both undeleted originals coexist; the caller
        // retries only the failed deletes.
        assert_eq!(store.count().await.unwrap(), 3);
        assert!(store.get("a").await.unwrap().is_some());
        assert!(store.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_originals_untouched() {
        let mut store = FakeStore::with_records(vec![
            record("a", "first note", 2.0, "2024-01-01").with_embedding(vec![0.0, 1.0, 0.0]),
            record("b", "second note", 4.0, "2024-01-02").with_embedding(vec![0.0, 0.78, 0.625]),
        ]);
        store.fail_inserts = true;
        let store = Arc::new(store);
        let report = analyze(&store).await;
        let executor = CleanupExecutor::new(Arc::clone(&store) as Arc<dyn MemoryStore>);

        let summary = executor
            .execute(&report, &["consolidation".into()])
            .await
            .unwrap();

        let outcome = &summary.results["consolidation"];
        assert!(outcome.successes.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        // Both originals survive a failed merge
        assert!(store.get("a").await.unwrap().is_some());
        assert!(store.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_consolidation_skips_group_with_too_few_survivors() {
        let store = Arc::new(FakeStore::with_records(vec![
            record("a", "first note", 2.0, "2024-01-01").with_embedding(vec![0.0, 1.0, 0.0]),
            record("b", "second note", 4.0, "2024-01-02").with_embedding(vec![0.0, 0.78, 0.625]),
        ]));
        let report = analyze(&store).await;
        store.delete("a").await.unwrap();
        let executor = CleanupExecutor::new(Arc::clone(&store) as Arc<dyn MemoryStore>);

        let summary = executor
            .execute(&report, &["consolidation".into()])
            .await
            .unwrap();

        let outcome = &summary.results["consolidation"];
        assert!(outcome.successes.is_empty());
        assert!(outcome.errors.is_empty());
        // The lone survivor is not consumed by a one-member merge
        assert!(store.get("b").await.unwrap().is_some());
    }
}
