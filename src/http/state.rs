use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::RelayConfig;
use crate::providers::{LlmClient, SearchClient};

/// Registry entry for one live session, kept for the status endpoint.
/// All mutable session state lives inside the session's own coordinator.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub started_at: DateTime<Utc>,
}

/// Shared application state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub llm: Arc<dyn LlmClient>,
    pub search: Arc<dyn SearchClient>,

    /// Active sessions (session_id → info)
    pub sessions: Arc<RwLock<HashMap<String, SessionInfo>>>,
}

impl AppState {
    pub fn new(
        config: Arc<RelayConfig>,
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn SearchClient>,
    ) -> Self {
        Self {
            config,
            llm,
            search,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}
