// Research-archive adapter over the arXiv Atom query API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use vantage_common::{clean_text, truncate_text, CollectedItem};

use crate::adapter::{status_error, CollectError, SourceAdapter};
use crate::sources::{API_TIMEOUT_SECS, ARXIV_CATEGORIES};

const QUERY_API: &str = "http://export.arxiv.org/api/query";
const PAPERS_PER_CATEGORY: usize = 15;

pub struct ArxivAdapter {
    client: reqwest::Client,
    categories: Vec<&'static str>,
}

impl ArxivAdapter {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent("vantage-collect/0.1")
            .build()
            .expect("Failed to build arXiv HTTP client");
        Self {
            client,
            categories: ARXIV_CATEGORIES.to_vec(),
        }
    }

    async fn fetch_category(&self, category: &str) -> Result<Vec<CollectedItem>, CollectError> {
        debug!(category, "querying arXiv");

        let resp = self
            .client
            .get(QUERY_API)
            .query(&[
                ("search_query", format!("cat:{category}").as_str()),
                ("sortBy", "submittedDate"),
                ("sortOrder", "descending"),
                ("max_results", &PAPERS_PER_CATEGORY.to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(
                status.as_u16(),
                format!("category {category} returned {status}"),
            ));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| CollectError::Network(e.to_string()))?;
        let feed = feed_rs::parser::parse(&bytes[..])
            .map_err(|e| CollectError::Parse(format!("{category}: {e}")))?;

        let items = feed
            .entries
            .into_iter()
            .filter_map(|entry| {
                let url = entry
                    .links
                    .iter()
                    .find(|l| l.media_type.as_deref() == Some("text/html"))
                    .or_else(|| entry.links.first())
                    .map(|l| l.href.clone())?;
                let title = entry.title.map(|t| clean_text(&t.content))?;
                let abstract_text = entry
                    .summary
                    .map(|s| clean_text(&s.content))
                    .unwrap_or_default();
                let authors: Vec<String> =
                    entry.authors.iter().map(|a| a.name.clone()).collect();
                let published = entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.with_timezone(&Utc));

                Some(CollectedItem {
                    source: "arxiv".to_string(),
                    source_name: "ArXiv".to_string(),
                    source_url: "https://arxiv.org".to_string(),
                    category: "research".to_string(),
                    title,
                    summary: truncate_text(&abstract_text, 500),
                    url,
                    published,
                    author: authors.first().cloned().unwrap_or_default(),
                    metadata: serde_json::json!({
                        "arxiv_category": category,
                        "authors": authors,
                    }),
                    raw_content: abstract_text,
                })
            })
            .collect::<Vec<_>>();

        debug!(category, items = items.len(), "arXiv category fetched");
        Ok(items)
    }
}

impl Default for ArxivAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for ArxivAdapter {
    fn name(&self) -> &str {
        "ArXiv"
    }

    fn source_type(&self) -> &str {
        "arxiv"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, CollectError> {
        info!(categories = self.categories.len(), "querying arXiv");

        let mut all_items = Vec::new();
        for category in &self.categories {
            match self.fetch_category(category).await {
                Ok(items) => all_items.extend(items),
                Err(e) => warn!(category = %category, error = %e, "arXiv category failed"),
            }
        }

        info!(items = all_items.len(), "arXiv collection complete");
        Ok(all_items)
    }
}
