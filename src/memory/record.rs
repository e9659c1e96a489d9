//! Memory record types
//!
//! A record's metadata is a flat JSON map whose values may have been written
//! by older clients with loose types (importance as a string, tags as a
//! comma-joined blob). The typed accessors here parse defensively on read
//! and the builder helpers normalize on write, so the rest of the engine
//! never touches raw metadata values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A single stored memory: content, flat metadata, optional embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier
    pub id: String,
    /// The text to store
    pub content: String,
    /// Flat metadata map (tags, importance, source, created_at, ...)
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Optional embedding (absent for records not yet embedded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Similarity score (only set on search results)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

impl MemoryRecord {
    /// Create a new record with a fresh ID and a `created_at` of now.
    pub fn new(content: impl Into<String>) -> Self {
        let mut metadata = Map::new();
        metadata.insert(
            "created_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        metadata.insert("source".to_string(), Value::String("manual".to_string()));
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            metadata,
            embedding: None,
            similarity: None,
        }
    }

    /// Set tags, stored as a comma-joined string.
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.metadata
            .insert("tags".to_string(), Value::String(tags.join(",")));
        self
    }

    /// Set importance, clamped to the domain range [0.0, 10.0].
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.metadata.insert(
            "importance".to_string(),
            Value::from(importance.clamp(0.0, 10.0)),
        );
        self
    }

    /// Set the source tag.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata
            .insert("source".to_string(), Value::String(source.into()));
        self
    }

    /// Override the creation timestamp.
    pub fn with_created_at(mut self, ts: impl Into<String>) -> Self {
        self.metadata
            .insert("created_at".to_string(), Value::String(ts.into()));
        self
    }

    /// Attach an embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Importance score. Accepts numbers or numeric strings; anything
    /// missing or unparseable is 0.0, never an error.
    pub fn importance(&self) -> f64 {
        match self.metadata.get("importance") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Creation timestamp, if one can be parsed. Accepts RFC-3339, naive
    /// datetime, and bare date strings; anything else is `None`, which
    /// sorts earliest wherever recency matters.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.metadata.get("created_at")?.as_str()?;
        parse_timestamp(raw)
    }

    /// Tag tokens, comma-split, trimmed, empties dropped.
    pub fn tags(&self) -> Vec<String> {
        match self.metadata.get("tags") {
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Source tag, `"unknown"` when absent.
    pub fn source(&self) -> String {
        self.metadata
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}
