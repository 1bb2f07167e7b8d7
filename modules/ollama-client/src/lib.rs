pub mod error;

pub use error::OllamaError;

use std::time::Duration;

use serde::Deserialize;

pub type Result<T> = std::result::Result<T, OllamaError>;

/// Embedding dimensionality produced by the default model.
pub const DIMENSIONS: usize = 768;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Thin wrapper over a locally-hosted embedding model API.
/// The model may be absent; callers probe `health` rather than assuming
/// availability at startup.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate a dense embedding for the given text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });

        let resp = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(OllamaError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: EmbeddingResponse = resp.json().await?;
        if parsed.embedding.len() != DIMENSIONS {
            return Err(OllamaError::Dimensions {
                expected: DIMENSIONS,
                actual: parsed.embedding.len(),
            });
        }
        Ok(parsed.embedding)
    }

    /// Probe whether the model backend is reachable.
    pub async fn health(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}
