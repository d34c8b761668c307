//! Plain-struct configuration records, immutable after construction
//!
//! None of these read a config file format; the CLI binary wires environment
//! variables into them via `clap`'s `env` attribute.

use std::time::Duration;

/// Where the database file lives and how the connection is opened
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Resolves the default database path `~/.claude/memory.db`, honoring
/// `CLAUDE_MEMORY_DB` if set
pub fn default_db_path() -> String {
    if let Ok(path) = std::env::var("CLAUDE_MEMORY_DB") {
        return path;
    }
    let home = dirs::home_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
    home.join(".claude")
        .join("memory.db")
        .to_string_lossy()
        .into_owned()
}

/// Weights and constants for the scoring engine
#[derive(Debug, Clone, Copy)]
pub struct ScoringConfig {
    /// Days for recency decay to fall to ~63%
    pub decay_constant: f64,
    pub recency_weight: f64,
    pub frequency_weight: f64,
    pub centrality_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            decay_constant: 30.0,
            recency_weight: 0.4,
            frequency_weight: 0.3,
            centrality_weight: 0.3,
        }
    }
}

/// Thresholds for the decay/archive maintenance passes
#[derive(Debug, Clone, Copy)]
pub struct DecayConfig {
    pub soft_decay_threshold: f64,
    pub archive_after_days: f64,
    pub min_to_keep: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            soft_decay_threshold: 0.3,
            archive_after_days: 90.0,
            min_to_keep: 0.1,
        }
    }
}

/// Parameters for context assembly
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub min_importance: f64,
    pub token_budget: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            min_importance: 0.3,
            token_budget: 4000,
        }
    }
}

/// RRF smoothing constant and the cap both retrieval strategies fetch before
/// fusion
#[derive(Debug, Clone, Copy)]
pub struct FusionConfig {
    pub rrf_k: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self { rrf_k: 60.0 }
    }
}

/// Deadlines for embedder calls
#[derive(Debug, Clone, Copy)]
pub struct EmbedderTimeouts {
    pub search: Duration,
    pub probe: Duration,
}

impl Default for EmbedderTimeouts {
    fn default() -> Self {
        Self {
            search: Duration::from_secs(5),
            probe: Duration::from_secs(30),
        }
    }
}
