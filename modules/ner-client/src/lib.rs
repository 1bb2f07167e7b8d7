pub mod error;

pub use error::NerError;

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::OnceCell;

pub type Result<T> = std::result::Result<T, NerError>;

/// One model prediction: a labeled span with confidence.
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub text: String,
    pub label: String,
    pub start: usize,
    pub end: usize,
    pub score: f64,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    entities: Vec<Prediction>,
}

/// Thin wrapper over the local zero-shot NER service.
///
/// The model is heavy and may be absent. Availability is probed exactly once
/// (on first use, shared across callers); `model_available` never re-probes.
pub struct NerClient {
    client: reqwest::Client,
    base_url: String,
    available: OnceCell<bool>,
}

impl NerClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            available: OnceCell::new(),
        }
    }

    /// One-shot availability probe, shared across all callers.
    pub async fn model_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                let ok = match self
                    .client
                    .get(format!("{}/health", self.base_url))
                    .timeout(Duration::from_secs(5))
                    .send()
                    .await
                {
                    Ok(resp) => resp.status().is_success(),
                    Err(_) => false,
                };
                if ok {
                    tracing::info!("NER model service available");
                } else {
                    tracing::warn!("NER model service unavailable, regex fallback will be used");
                }
                ok
            })
            .await
    }

    /// Run zero-shot extraction over `text` with the requested label set.
    pub async fn predict(
        &self,
        text: &str,
        labels: &[&str],
        threshold: f64,
    ) -> Result<Vec<Prediction>> {
        let body = serde_json::json!({
            "text": text,
            "labels": labels,
            "threshold": threshold,
        });

        let resp = self
            .client
            .post(format!("{}/predict", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(NerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: PredictResponse = resp.json().await?;
        Ok(parsed.entities)
    }
}
