use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::configs::OPENAI_HOST;
use super::utils::handle_response;

pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";

/// Turns a text prompt into encoded image bytes
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>>;
}

pub struct OpenAiImageGenerator {
    client: Client,
    host: String,
    api_key: String,
    model: String,
    size: String,
}

impl OpenAiImageGenerator {
    pub fn new<K: Into<String>>(api_key: K) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self {
            client,
            host: OPENAI_HOST.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_IMAGE_MODEL.to_string(),
            size: DEFAULT_IMAGE_SIZE.to_string(),
        })
    }

    pub fn with_host<H: Into<String>>(mut self, host: H) -> Self {
        self.host = host.into();
        self
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/v1/images/generations",
            self.host.trim_end_matches('/')
        );
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "size": self.size,
            "n": 1,
            "response_format": "b64_json"
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await?;
        let body: Value = handle_response(response).await?.json().await?;

        let encoded = body["data"][0]["b64_json"]
            .as_str()
            .ok_or_else(|| anyhow!("No image data in response"))?;
        Ok(STANDARD.decode(encoded)?)
    }
}
