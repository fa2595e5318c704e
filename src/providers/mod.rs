mod llm;
mod search;

pub use llm::OpenAiLlm;
pub use search::BraveSearch;

use anyhow::Result;
use async_trait::async_trait;

/// Text-completion seam. Implemented over an OpenAI-style chat-completions
/// endpoint in production; tests inject scripted fakes.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// Web-search seam used to verify uncertain factual claims.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>>;
}
