//! Cleanup analyzer
//!
//! Read-only corpus analysis. Fetches every record, runs the exact,
//! near-duplicate and consolidation passes, and serializes the findings into
//! a plain report a human can review before anything is deleted. No group
//! object identity leaks into the report; the executor works from IDs alone.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use super::groups::{ConsolidationGroup, DuplicateGroup, SimilarityType};
use super::similarity::{cosine_similarity, group_by_similarity};
use crate::memory::{MemoryRecord, MemoryStore};

/// Member content is truncated to this many characters in the report.
const CONTENT_PREVIEW_CHARS: usize = 100;
/// Consolidated-content previews show this many characters.
const CONSOLIDATED_PREVIEW_CHARS: usize = 200;

/// The serialized result of one analysis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupReport {
    pub total_memories: usize,
    pub analysis: CleanupAnalysis,
    pub estimated_cleanup: EstimatedCleanup,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupAnalysis {
    pub exact_duplicates: Vec<DuplicateGroupReport>,
    pub near_duplicates: Vec<DuplicateGroupReport>,
    pub consolidation_groups: Vec<ConsolidationGroupReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroupReport {
    #[serde(rename = "type")]
    pub similarity_type: SimilarityType,
    pub confidence: f32,
    pub memories: Vec<MemoryPreview>,
    /// ID of the member to keep
    pub primary_memory: String,
    /// IDs of the members to delete
    pub duplicates_to_remove: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationGroupReport {
    pub reason: String,
    pub memory_count: usize,
    pub memories: Vec<MemoryPreview>,
    pub consolidated_content_preview: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPreview {
    pub id: String,
    /// Truncated content
    pub content: String,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatedCleanup {
    /// Distinct memories deleted if every duplicate group is applied
    pub memories_to_delete: usize,
    pub groups_to_consolidate: usize,
}

pub struct CleanupAnalyzer {
    store: Arc<dyn MemoryStore>,
}

impl CleanupAnalyzer {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }

    /// Analyze the corpus for cleanup opportunities. Never mutates the store.
    ///
    /// An empty corpus yields an empty report, and records without an
    /// embedding (or with a mismatched dimensionality) participate only in
    /// the exact-duplicate pass; neither case is an error.
    pub async fn analyze(
        &self,
        similarity_threshold: f32,
        consolidation_threshold: f32,
    ) -> Result<CleanupReport> {
        let records = self.store.list_all(None).await?;
        info!(
            "Analyzing {} memories for cleanup (similarity {:.2}, consolidation {:.2})",
            records.len(),
            similarity_threshold,
            consolidation_threshold
        );

        let exact = Self::find_exact_duplicates(&records);

        // Members of an exact group would also score ~1.0 in the embedding
        // pass; excluding them keeps each pair out of the report twice.
        let mut consumed: HashSet<String> = exact
            .iter()
            .flat_map(|g| g.memories.iter().map(|m| m.id.clone()))
            .collect();
        let near = Self::find_near_duplicates(&records, similarity_threshold, &consumed);

        consumed.extend(
            near.iter()
                .flat_map(|g| g.memories.iter().map(|m| m.id.clone())),
        );
        let consolidation =
            Self::find_consolidation_candidates(&records, consolidation_threshold, &consumed);

        debug!(
            "Found {} exact groups, {} near groups, {} consolidation groups",
            exact.len(),
            near.len(),
            consolidation.len()
        );

        let memories_to_delete: HashSet<&str> = exact
            .iter()
            .chain(near.iter())
            .flat_map(|g| g.duplicates_to_remove())
            .map(|m| m.id.as_str())
            .collect();

        Ok(CleanupReport {
            total_memories: records.len(),
            estimated_cleanup: EstimatedCleanup {
                memories_to_delete: memories_to_delete.len(),
                groups_to_consolidate: consolidation.len(),
            },
            analysis: CleanupAnalysis {
                exact_duplicates: exact.iter().map(Self::serialize_duplicate_group).collect(),
                near_duplicates: near.iter().map(Self::serialize_duplicate_group).collect(),
                consolidation_groups: consolidation
                    .iter()
                    .map(Self::serialize_consolidation_group)
                    .collect(),
            },
        })
    }

    /// Group memories whose trimmed, case-folded content is identical.
    /// Hash-map grouping, so O(n) over the corpus.
    fn find_exact_duplicates(records: &[MemoryRecord]) -> Vec<DuplicateGroup> {
        let mut by_content: HashMap<String, Vec<usize>> = HashMap::new();
        let mut key_order: Vec<String> = Vec::new();

        for (i, record) in records.iter().enumerate() {
            let key = record.content.trim().to_lowercase();
            let bucket = by_content.entry(key.clone()).or_insert_with(|| {
                key_order.push(key);
                Vec::new()
            });
            bucket.push(i);
        }

        key_order
            .iter()
            .filter_map(|key| {
                let indices = &by_content[key];
                (indices.len() >= 2).then(|| {
                    DuplicateGroup::new(
                        indices.iter().map(|&i| records[i].clone()).collect(),
                        SimilarityType::Exact,
                        1.0,
                    )
                })
            })
            .collect()
    }

    /// Cluster embedded memories above `threshold`, skipping records without
    /// an embedding and any ID in `excluded`.
    fn find_near_duplicates(
        records: &[MemoryRecord],
        threshold: f32,
        excluded: &HashSet<String>,
    ) -> Vec<DuplicateGroup> {
        Self::cluster_embedded(records, threshold, excluded)
            .into_iter()
            .map(|members| {
                let confidence = min_pairwise_similarity(&members);
                DuplicateGroup::new(members, SimilarityType::Near, confidence)
            })
            .collect()
    }

    /// Same clustering as near-duplicates, but at the lower consolidation
    /// threshold: these are related memories proposed for merging.
    fn find_consolidation_candidates(
        records: &[MemoryRecord],
        threshold: f32,
        excluded: &HashSet<String>,
    ) -> Vec<ConsolidationGroup> {
        Self::cluster_embedded(records, threshold, excluded)
            .into_iter()
            .map(|members| {
                let reason = format!(
                    "{} related memories with similarity >= {:.2}",
                    members.len(),
                    threshold
                );
                ConsolidationGroup::new(members, reason)
            })
            .collect()
    }

    fn cluster_embedded(
        records: &[MemoryRecord],
        threshold: f32,
        excluded: &HashSet<String>,
    ) -> Vec<Vec<MemoryRecord>> {
        let embedded: Vec<&MemoryRecord> = records
            .iter()
            .filter(|r| r.embedding.is_some() && !excluded.contains(&r.id))
            .collect();

        group_by_similarity(&embedded, threshold, |a, b| {
            match (&a.embedding, &b.embedding) {
                (Some(ea), Some(eb)) => cosine_similarity(ea, eb),
                _ => 0.0,
            }
        })
        .into_iter()
        .map(|group| group.into_iter().map(|i| embedded[i].clone()).collect())
        .collect()
    }

    fn serialize_duplicate_group(group: &DuplicateGroup) -> DuplicateGroupReport {
        DuplicateGroupReport {
            similarity_type: group.similarity_type,
            confidence: group.confidence,
            memories: group.memories.iter().map(preview).collect(),
            primary_memory: group.primary_memory().id.clone(),
            duplicates_to_remove: group
                .duplicates_to_remove()
                .iter()
                .map(|m| m.id.clone())
                .collect(),
        }
    }

    fn serialize_consolidation_group(group: &ConsolidationGroup) -> ConsolidationGroupReport {
        ConsolidationGroupReport {
            reason: group.consolidation_reason.clone(),
            memory_count: group.memories.len(),
            memories: group.memories.iter().map(preview).collect(),
            consolidated_content_preview: truncate(
                &group.create_consolidated_content(),
                CONSOLIDATED_PREVIEW_CHARS,
            ),
        }
    }
}

fn preview(record: &MemoryRecord) -> MemoryPreview {
    MemoryPreview {
        id: record.id.clone(),
        content: truncate(&record.content, CONTENT_PREVIEW_CHARS),
        metadata: record.metadata.clone(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// Minimum pairwise cosine similarity across group members. Reported as the
/// group's confidence so transitively-chained clusters never look more
/// similar than their weakest link.
fn min_pairwise_similarity(members: &[MemoryRecord]) -> f32 {
    let mut min = 1.0f32;
    for i in 0..members.len() {
        for j in (i + 1)..members.len() {
            if let (Some(a), Some(b)) = (&members[i].embedding, &members[j].embedding) {
                min = min.min(cosine_similarity(a, b));
            }
        }
    }
    min
}
