//! Memory cleanup engine
//!
//! Finds exact duplicates, near-duplicates and consolidation candidates in
//! the corpus, then applies approved actions against the store. Analysis is
//! strictly read-only; the executor is the only mutating path, and it acts
//! only on action kinds the caller has explicitly approved.

pub mod analyzer;
pub mod executor;
pub mod groups;
pub mod similarity;

pub use analyzer::{CleanupAnalyzer, CleanupReport};
pub use executor::{CleanupExecutor, ExecutionSummary};
pub use groups::{ConsolidationGroup, DuplicateGroup, SimilarityType};

use thiserror::Error;

/// The action kinds a caller may approve for execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CleanupAction {
    /// Remove memories with identical normalized content
    ExactDuplicates,
    /// Remove memories with very similar embeddings
    NearDuplicates,
    /// Merge related memories into single synthetic entries
    Consolidation,
}

impl CleanupAction {
    pub const ALL: [CleanupAction; 3] = [
        CleanupAction::ExactDuplicates,
        CleanupAction::NearDuplicates,
        CleanupAction::Consolidation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactDuplicates => "exact_duplicates",
            Self::NearDuplicates => "near_duplicates",
            Self::Consolidation => "consolidation",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CleanupError> {
        match s {
            "exact_duplicates" => Ok(Self::ExactDuplicates),
            "near_duplicates" => Ok(Self::NearDuplicates),
            "consolidation" => Ok(Self::Consolidation),
            other => Err(CleanupError::UnknownAction(other.to_string())),
        }
    }
}

/// Validation failures, rejected before any store call is made.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("no cleanup actions specified")]
    NoActions,
    #[error("unknown cleanup action: {0:?} (valid: exact_duplicates, near_duplicates, consolidation)")]
    UnknownAction(String),
}
