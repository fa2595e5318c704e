use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

use super::LlmClient;

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiLlm {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiLlm {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiLlm {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": 0.4,
        });

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("LLM request failed")?
            .error_for_status()
            .context("LLM request rejected")?;

        let payload: serde_json::Value =
            resp.json().await.context("Invalid LLM response body")?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .context("LLM response missing content")?;

        Ok(content.to_string())
    }
}
