use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{SearchClient, SearchResult};

/// Web-search client for a Brave-style search API.
pub struct BraveSearch {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl BraveSearch {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl SearchClient for BraveSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let resp = self
            .http
            .get(&self.base_url)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", &limit.to_string())])
            .send()
            .await
            .context("Search request failed")?
            .error_for_status()
            .context("Search request rejected")?;

        let payload: serde_json::Value =
            resp.json().await.context("Invalid search response body")?;

        let mut results = Vec::new();
        if let Some(items) = payload["web"]["results"].as_array() {
            for item in items.iter().take(limit) {
                results.push(SearchResult {
                    title: item["title"].as_str().unwrap_or_default().to_string(),
                    snippet: item["description"].as_str().unwrap_or_default().to_string(),
                    url: item["url"].as_str().unwrap_or_default().to_string(),
                });
            }
        }

        Ok(results)
    }
}
