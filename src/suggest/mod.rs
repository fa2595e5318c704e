pub mod dedup;
pub mod engine;
pub mod filter;

pub use dedup::DedupStore;
pub use engine::{analyze, Candidate, SuggestionEngine};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A quality-filtered, deduplicated suggestion emitted to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// Suggestion category ("insight", "question", "fact")
    #[serde(rename = "type")]
    pub kind: String,

    pub message: String,

    /// "info" | "suggestion" | "warning"
    pub severity: String,

    /// Normalized content hash tracked by the dedup store
    pub content_hash: String,

    pub emitted_at: DateTime<Utc>,
}
