//! Server configuration and named thresholds

/// Default threshold for near-duplicate detection. Pairs at or above this
/// cosine similarity are close enough that one of them can go.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.85;

/// Default threshold for consolidation candidates: related enough to merge
/// into one record, not similar enough to call duplicates.
pub const DEFAULT_CONSOLIDATION_THRESHOLD: f32 = 0.70;

/// Stricter duplicate threshold for callers that only want to surface
/// all-but-identical pairs.
pub const STRICT_SIMILARITY_THRESHOLD: f32 = 0.95;

/// Env-driven configuration for the server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path of the memory snapshot file
    pub memory_path: String,
    /// Port the HTTP server binds to
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            memory_path: std::env::var("RECALL_MEMORY_PATH")
                .unwrap_or(defaults.memory_path),
            port: std::env::var("RECALL_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            memory_path: "memory.zst".to_string(),
            port: 3001,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_ordered() {
        assert!(DEFAULT_CONSOLIDATION_THRESHOLD < DEFAULT_SIMILARITY_THRESHOLD);
        assert!(DEFAULT_SIMILARITY_THRESHOLD < STRICT_SIMILARITY_THRESHOLD);
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.memory_path, "memory.zst");
        assert_eq!(config.port, 3001);
    }
}
