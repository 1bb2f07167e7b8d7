pub mod error;

pub use error::QdrantError;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, QdrantError>;

/// A single point to upsert: id, dense vector, flat payload map.
#[derive(Debug, Clone, Serialize)]
pub struct Point {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

/// A match condition applied server-side during search or deletion.
#[derive(Debug, Clone)]
pub struct FieldMatch {
    pub key: String,
    pub value: serde_json::Value,
}

impl FieldMatch {
    pub fn new(key: &str, value: impl Into<serde_json::Value>) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
        }
    }
}

/// A scored search hit with its payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoredPoint {
    pub id: serde_json::Value,
    pub score: f32,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScrollResponse {
    result: ScrollResult,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    points: Vec<ScrolledPoint>,
}

#[derive(Debug, Deserialize)]
struct ScrolledPoint {
    id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CollectionsResponse {
    result: CollectionsResult,
}

#[derive(Debug, Deserialize)]
struct CollectionsResult {
    collections: Vec<CollectionDescription>,
}

#[derive(Debug, Deserialize)]
struct CollectionDescription {
    name: String,
}

/// Thin wrapper over the vector store REST API.
/// The store is treated as external and authoritative; nothing is cached here.
pub struct QdrantClient {
    client: reqwest::Client,
    base_url: String,
}

impl QdrantClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create the collection if it does not exist (cosine distance).
    pub async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/collections", self.base_url))
            .send()
            .await?;
        let listing: CollectionsResponse = Self::parse(resp).await?;

        if listing.result.collections.iter().any(|c| c.name == name) {
            return Ok(());
        }

        let body = serde_json::json!({
            "vectors": { "size": dimensions, "distance": "Cosine" }
        });
        let resp = self
            .client
            .put(format!("{}/collections/{name}", self.base_url))
            .json(&body)
            .send()
            .await?;
        Self::check(resp).await?;
        tracing::info!(collection = name, dimensions, "Created vector collection");
        Ok(())
    }

    /// Upsert points into a collection.
    pub async fn upsert_points(&self, collection: &str, points: &[Point]) -> Result<()> {
        let body = serde_json::json!({ "points": points });
        let resp = self
            .client
            .put(format!(
                "{}/collections/{collection}/points?wait=true",
                self.base_url
            ))
            .json(&body)
            .send()
            .await?;
        Self::check(resp).await
    }

    /// Cosine-similarity search with optional must-match filters.
    pub async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filters: &[FieldMatch],
    ) -> Result<Vec<ScoredPoint>> {
        let mut body = serde_json::json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if !filters.is_empty() {
            body["filter"] = serde_json::json!({
                "must": filters
                    .iter()
                    .map(|f| serde_json::json!({
                        "key": f.key,
                        "match": { "value": f.value }
                    }))
                    .collect::<Vec<_>>()
            });
        }

        let resp = self
            .client
            .post(format!(
                "{}/collections/{collection}/points/search",
                self.base_url
            ))
            .json(&body)
            .send()
            .await?;
        let parsed: SearchResponse = Self::parse(resp).await?;
        Ok(parsed.result)
    }

    /// Delete every point whose payload matches all given filters.
    /// Returns true if any point was removed. Idempotent.
    pub async fn delete_by_filter(&self, collection: &str, filters: &[FieldMatch]) -> Result<bool> {
        let filter = serde_json::json!({
            "must": filters
                .iter()
                .map(|f| serde_json::json!({
                    "key": f.key,
                    "match": { "value": f.value }
                }))
                .collect::<Vec<_>>()
        });

        // Scroll first so the caller learns whether anything matched.
        let scroll_body = serde_json::json!({ "filter": filter, "limit": 10 });
        let resp = self
            .client
            .post(format!(
                "{}/collections/{collection}/points/scroll",
                self.base_url
            ))
            .json(&scroll_body)
            .send()
            .await?;
        let scrolled: ScrollResponse = Self::parse(resp).await?;
        if scrolled.result.points.is_empty() {
            return Ok(false);
        }

        let delete_body = serde_json::json!({ "filter": filter });
        let resp = self
            .client
            .post(format!(
                "{}/collections/{collection}/points/delete?wait=true",
                self.base_url
            ))
            .json(&delete_body)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(true)
    }

    async fn check(resp: reqwest::Response) -> Result<()> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(QdrantError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn parse<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(QdrantError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| QdrantError::Shape(e.to_string()))
    }
}
