//! Feed and driver configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where block messages come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// JSON-lines file replayed as the feed (one message per line).
    pub path: PathBuf,
    /// Source topic label, used in logs.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Consumer group label, used in logs.
    #[serde(default)]
    pub group_id: Option<String>,
    /// Where undecodable messages are appended; `None` drops them after logging.
    #[serde(default)]
    pub dead_letter_path: Option<PathBuf>,
}

fn default_topic() -> String {
    "blocks".into()
}

/// Driver loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// How long an in-flight batch may keep running after shutdown is requested.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_drain_timeout_ms() -> u64 {
    10_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}
