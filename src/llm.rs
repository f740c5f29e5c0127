use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{CrewError, Result};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Narrow seam to the text-generation collaborator. The execution engine
/// only ever talks to the model through this trait, which keeps runs
/// testable with a stub client.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate text for a prompt using the given model and credential.
    async fn generate(
        &self,
        model: &str,
        api_key: Option<&str>,
        prompt: &str,
        temperature: f32,
    ) -> Result<String>;
}

/// Gemini HTTP client
pub struct GeminiClient {
    client: Client,
    base_url: String,
    default_key: Option<String>,
}

impl GeminiClient {
    pub fn new(default_key: Option<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CrewError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            default_key,
        })
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(
        &self,
        model: &str,
        api_key: Option<&str>,
        prompt: &str,
        temperature: f32,
    ) -> Result<String> {
        let key = api_key
            .or(self.default_key.as_deref())
            .ok_or_else(|| CrewError::Configuration("No API key available".to_string()))?;

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, key
        );

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": temperature },
        });

        debug!("Sending generation request to model {}", model);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CrewError::Network(format!("LLM request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!("LLM request returned status {}", status);
            return Err(CrewError::Execution(format!(
                "LLM request failed with status {}: {}",
                status,
                crate::events::truncate(&detail, 200)
            ))
            .into());
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| CrewError::Parse(format!("Failed to parse LLM response: {}", e)))?;

        let text = payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| {
                CrewError::Parse("LLM response contained no generated text".to_string())
            })?;

        Ok(text.to_string())
    }
}
