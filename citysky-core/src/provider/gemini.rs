use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::{
    config::API_KEY_VAR,
    error::CoreError,
    provider::{GenerateContentResponse, http_client, truncate_body},
};

use super::ImageGenerator;

/// Google Generative Language REST API (`models/{model}:generateContent`).
#[derive(Clone)]
pub struct GeminiImageGenerator {
    api_key: Option<String>,
    model: String,
    base_url: String,
    http: Client,
}

impl std::fmt::Debug for GeminiImageGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiImageGenerator")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiImageGenerator {
    pub fn new(
        api_key: Option<String>,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            http: http_client(timeout)?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ImageGenerator for GeminiImageGenerator {
    fn check_credentials(&self) -> Result<(), CoreError> {
        match self.api_key {
            Some(_) => Ok(()),
            None => Err(CoreError::MissingCredential { var: API_KEY_VAR }),
        }
    }

    async fn generate_content(&self, prompt: &str) -> Result<GenerateContentResponse> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("{API_KEY_VAR} not configured"))?;

        let body = json!({
            "contents": [ { "role": "user", "parts": [ { "text": prompt } ] } ]
        });

        tracing::debug!(model = %self.model, "Requesting image generation");

        let res = self
            .http
            .post(self.endpoint())
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Google GenAI")?;

        let status = res.status();
        let text = res.text().await.context("Failed to read Google GenAI response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "Google GenAI error (status {}): {}",
                status,
                truncate_body(&text),
            ));
        }

        serde_json::from_str(&text).context("Failed to parse Google GenAI response JSON")
    }
}
