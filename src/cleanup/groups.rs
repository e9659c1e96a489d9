//! Duplicate and consolidation groups
//!
//! Both types are ephemeral: built during one analysis pass, serialized into
//! the report, and discarded. They carry no persisted identity.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::memory::MemoryRecord;

/// How a duplicate group was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityType {
    Exact,
    Near,
}

impl SimilarityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Near => "near",
        }
    }
}

/// A cluster of memories judged identical or near-identical. One member
/// survives; the rest are removal candidates.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    /// At least two members, in corpus order. Callers guarantee the size.
    pub memories: Vec<MemoryRecord>,
    pub similarity_type: SimilarityType,
    /// 1.0 for exact groups; the minimum pairwise cosine similarity for near
    /// groups, so chained clusters never overstate their confidence.
    pub confidence: f32,
}

impl DuplicateGroup {
    pub fn new(memories: Vec<MemoryRecord>, similarity_type: SimilarityType, confidence: f32) -> Self {
        debug_assert!(memories.len() >= 2);
        Self {
            memories,
            similarity_type,
            confidence,
        }
    }

    /// The single survivor: highest importance wins, most recent
    /// `created_at` breaks ties, the earliest member wins a full tie.
    /// Missing importance reads as 0.0 and a missing timestamp sorts
    /// earliest, so degraded metadata never excludes a record.
    pub fn primary_memory(&self) -> &MemoryRecord {
        let mut best = &self.memories[0];
        for candidate in &self.memories[1..] {
            let better = match candidate.importance().total_cmp(&best.importance()) {
                Ordering::Greater => true,
                Ordering::Equal => candidate.created_at() > best.created_at(),
                Ordering::Less => false,
            };
            if better {
                best = candidate;
            }
        }
        best
    }

    /// Every member except the primary, in original order.
    pub fn duplicates_to_remove(&self) -> Vec<&MemoryRecord> {
        let primary_id = &self.primary_memory().id;
        self.memories
            .iter()
            .filter(|m| &m.id != primary_id)
            .collect()
    }
}

/// A cluster of related-but-distinct memories proposed for merging into one
/// synthetic record.
#[derive(Debug, Clone)]
pub struct ConsolidationGroup {
    /// At least two members.
    pub memories: Vec<MemoryRecord>,
    /// Human-readable explanation of why these were grouped.
    pub consolidation_reason: String,
}

impl ConsolidationGroup {
    pub fn new(memories: Vec<MemoryRecord>, consolidation_reason: impl Into<String>) -> Self {
        debug_assert!(memories.len() >= 2);
        Self {
            memories,
            consolidation_reason: consolidation_reason.into(),
        }
    }

    /// Merge member contents into one numbered narrative, ordered by
    /// `created_at` ascending (missing timestamps sort first), so the merged
    /// text reads chronologically regardless of input order.
    pub fn create_consolidated_content(&self) -> String {
        let mut ordered: Vec<&MemoryRecord> = self.memories.iter().collect();
        ordered.sort_by_key(|m| m.created_at());

        ordered
            .iter()
            .enumerate()
            .map(|(i, m)| format!("[{}] {}", i + 1, m.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Merge member metadata into the metadata of the synthetic record.
    pub fn consolidated_metadata(&self) -> Map<String, Value> {
        let tags: BTreeSet<String> = self.memories.iter().flat_map(|m| m.tags()).collect();

        let mean_importance = self
            .memories
            .iter()
            .map(|m| m.importance())
            .sum::<f64>()
            / self.memories.len() as f64;

        let sources: BTreeSet<String> = self.memories.iter().map(|m| m.source()).collect();

        let mut metadata = Map::new();
        metadata.insert(
            "tags".to_string(),
            Value::String(tags.into_iter().collect::<Vec<_>>().join(",")),
        );
        // Inputs may already be out of range; the merged value never is.
        metadata.insert(
            "importance".to_string(),
            Value::from(mean_importance.clamp(0.0, 10.0)),
        );
        metadata.insert(
            "source".to_string(),
            Value::String("consolidated".to_string()),
        );
        metadata.insert(
            "original_sources".to_string(),
            Value::Array(sources.into_iter().map(Value::String).collect()),
        );
        metadata.insert(
            "consolidated_from".to_string(),
            Value::Array(
                self.memories
                    .iter()
                    .map(|m| Value::String(m.id.clone()))
                    .collect(),
            ),
        );
        metadata.insert(
            "consolidation_reason".to_string(),
            Value::String(self.consolidation_reason.clone()),
        );
        metadata.insert(
            "created_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        metadata
    }
}
