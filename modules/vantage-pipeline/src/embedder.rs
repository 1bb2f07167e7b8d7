// Embedding generation and vector-store persistence for semantic search.
// The model backend may be absent at startup; every call degrades to a
// per-item failure rather than a crash.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, error};
use uuid::Uuid;

use ollama_client::OllamaClient;
use qdrant_client::{FieldMatch, Point, QdrantClient};
use vantage_common::NewsItem;

pub const COLLECTION_NAME: &str = "news_items";
const MAX_CONTENT_LENGTH: usize = 8000;
const DEFAULT_MAX_CONCURRENT: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingResult {
    pub item_id: Uuid,
    pub vector_id: Option<Uuid>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarItem {
    pub news_item_id: String,
    pub title: String,
    pub source_name: String,
    pub url: String,
    pub categories: Vec<String>,
    pub score: f32,
}

/// Remove null bytes and control characters (keeping \n \r \t), collapse
/// whitespace runs. Output is valid UTF-8 by construction.
pub fn sanitize_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != '\0' && (!c.is_control() || matches!(c, '\n' | '\r' | '\t')))
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compose the text handed to the embedding model.
pub fn prepare_content(item: &NewsItem) -> String {
    let mut parts = Vec::new();

    if !item.title.is_empty() {
        parts.push(format!("Title: {}", sanitize_text(&item.title)));
    }
    if !item.source_name.is_empty() {
        parts.push(format!("Source: {}", item.source_name));
    }
    if !item.categories.is_empty() {
        parts.push(format!("Categories: {}", item.categories.join(", ")));
    }

    let mut content = sanitize_text(item.body());
    if !content.is_empty() {
        if content.chars().count() > MAX_CONTENT_LENGTH {
            content = content.chars().take(MAX_CONTENT_LENGTH).collect::<String>() + "...";
        }
        parts.push(format!("Content: {content}"));
    }

    parts.join("\n\n")
}

pub struct NewsItemEmbedder {
    ollama: Arc<OllamaClient>,
    qdrant: Arc<QdrantClient>,
}

impl NewsItemEmbedder {
    pub fn new(ollama: Arc<OllamaClient>, qdrant: Arc<QdrantClient>) -> Self {
        Self { ollama, qdrant }
    }

    /// Create the vector collection if missing. Called once at startup by
    /// whoever wires the pipeline, not per embed.
    pub async fn ensure_collection(&self) -> Result<()> {
        self.qdrant
            .ensure_collection(COLLECTION_NAME, ollama_client::DIMENSIONS)
            .await?;
        Ok(())
    }

    /// Embed one item and persist the vector with its payload.
    /// The caller writes `vector_id` back onto the row.
    pub async fn embed(&self, item: &NewsItem) -> EmbeddingResult {
        let start = Instant::now();

        let content = prepare_content(item);
        if content.trim().is_empty() {
            return EmbeddingResult {
                item_id: item.id,
                vector_id: None,
                success: false,
                error: Some("No content to embed".to_string()),
                duration_ms: 0.0,
            };
        }

        let outcome = async {
            let vector = self.ollama.embed(&content).await?;
            let vector_id = Uuid::new_v4();
            let payload = serde_json::json!({
                "news_item_id": item.id.to_string(),
                "title": item.title,
                "source_type": item.source_type,
                "source_name": item.source_name,
                "url": item.url,
                "categories": item.categories,
                "published_at": item.published_at.map(|d| d.to_rfc3339()),
                "collected_at": item.collected_at.to_rfc3339(),
                "embedded_at": Utc::now().to_rfc3339(),
            });
            self.qdrant
                .upsert_points(
                    COLLECTION_NAME,
                    &[Point {
                        id: vector_id,
                        vector,
                        payload,
                    }],
                )
                .await?;
            anyhow::Ok(vector_id)
        }
        .await;

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        match outcome {
            Ok(vector_id) => {
                debug!(item = %item.id, duration_ms, "item embedded");
                EmbeddingResult {
                    item_id: item.id,
                    vector_id: Some(vector_id),
                    success: true,
                    error: None,
                    duration_ms,
                }
            }
            Err(e) => {
                error!(item = %item.id, error = %e, "embedding failed");
                EmbeddingResult {
                    item_id: item.id,
                    vector_id: None,
                    success: false,
                    error: Some(e.to_string()),
                    duration_ms,
                }
            }
        }
    }

    /// Embed a batch with bounded concurrency.
    pub async fn embed_batch(
        &self,
        items: &[NewsItem],
        max_concurrent: usize,
    ) -> Vec<EmbeddingResult> {
        let limit = if max_concurrent == 0 {
            DEFAULT_MAX_CONCURRENT
        } else {
            max_concurrent
        };
        let semaphore = Arc::new(Semaphore::new(limit));

        stream::iter(items)
            .map(|item| {
                let semaphore = Arc::clone(&semaphore);
                async move {
                    let _permit = semaphore.acquire().await.expect("semaphore closed");
                    self.embed(item).await
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await
    }

    /// Semantic search over embedded items. The query is embedded with the
    /// same model; similarity is cosine; filters apply at the store.
    pub async fn search_similar(
        &self,
        query: &str,
        limit: usize,
        source_type: Option<&str>,
        categories: Option<&[String]>,
    ) -> Result<Vec<SimilarItem>> {
        let vector = self.ollama.embed(&sanitize_text(query)).await?;

        let mut filters = Vec::new();
        if let Some(source_type) = source_type {
            filters.push(FieldMatch::new("source_type", source_type));
        }
        if let Some(categories) = categories {
            for category in categories {
                filters.push(FieldMatch::new("categories", category.as_str()));
            }
        }

        let hits = self
            .qdrant
            .search(COLLECTION_NAME, &vector, limit, &filters)
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| SimilarItem {
                news_item_id: hit.payload["news_item_id"].as_str().unwrap_or("").to_string(),
                title: hit.payload["title"].as_str().unwrap_or("").to_string(),
                source_name: hit.payload["source_name"].as_str().unwrap_or("").to_string(),
                url: hit.payload["url"].as_str().unwrap_or("").to_string(),
                categories: hit.payload["categories"]
                    .as_array()
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|c| c.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default(),
                score: hit.score,
            })
            .collect())
    }

    /// Remove any vector for this item. Idempotent: true when something
    /// was deleted.
    pub async fn delete_embedding(&self, news_item_id: Uuid) -> Result<bool> {
        let deleted = self
            .qdrant
            .delete_by_filter(
                COLLECTION_NAME,
                &[FieldMatch::new("news_item_id", news_item_id.to_string())],
            )
            .await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vantage_common::ProcessedState;

    fn item(title: &str, content: &str) -> NewsItem {
        NewsItem {
            id: Uuid::new_v4(),
            source_type: "rss".to_string(),
            source_name: "Reuters".to_string(),
            source_url: String::new(),
            title: title.to_string(),
            content: content.to_string(),
            summary: String::new(),
            url: "https://example.com/a".to_string(),
            published_at: None,
            collected_at: Utc::now(),
            author: String::new(),
            categories: vec!["geopolitics".to_string(), "military".to_string()],
            processed: ProcessedState::Pending,
            relevance_score: 0.0,
            content_hash: String::new(),
            embedding_ref: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn sanitize_drops_control_chars_keeps_structure_chars() {
        let dirty = "Hello\0 world\u{1}\u{2} again";
        assert_eq!(sanitize_text(dirty), "Hello world again");
    }

    #[test]
    fn prepare_content_has_pinned_shape() {
        let prepared = prepare_content(&item("Headline", "Body text here."));
        let sections: Vec<&str> = prepared.split("\n\n").collect();
        assert_eq!(sections[0], "Title: Headline");
        assert_eq!(sections[1], "Source: Reuters");
        assert_eq!(sections[2], "Categories: geopolitics, military");
        assert_eq!(sections[3], "Content: Body text here.");
    }

    #[test]
    fn prepare_content_truncates_long_bodies() {
        let long_body = "x".repeat(10_000);
        let prepared = prepare_content(&item("Headline", &long_body));
        let content_section = prepared
            .split("\n\n")
            .find(|s| s.starts_with("Content:"))
            .unwrap();
        assert!(content_section.chars().count() < 8100 + "Content: ...".len());
        assert!(content_section.ends_with("..."));
    }

    #[test]
    fn empty_item_prepares_to_headers_only() {
        let prepared = prepare_content(&item("Headline", ""));
        assert!(!prepared.contains("Content:"));
        assert!(prepared.contains("Title: Headline"));
    }
}
