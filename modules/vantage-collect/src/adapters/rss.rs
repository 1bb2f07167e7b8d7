// RSS/Atom adapter. One feed's failure is isolated: the batch carries on.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use vantage_common::{clean_text, truncate_text, CollectedItem};

use crate::adapter::{CollectError, SourceAdapter};
use crate::sources::{rss_display_name, RSS_FEEDS, RSS_TIMEOUT_SECS};

const ITEMS_PER_FEED: usize = 25;

pub struct RssAdapter {
    client: reqwest::Client,
    feeds: Vec<(String, String, String)>,
}

impl RssAdapter {
    pub fn new() -> Self {
        Self::with_feeds(
            RSS_FEEDS
                .iter()
                .map(|(k, u, c)| (k.to_string(), u.to_string(), c.to_string()))
                .collect(),
        )
    }

    /// Construct with an explicit feed list (key, url, category).
    pub fn with_feeds(feeds: Vec<(String, String, String)>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(RSS_TIMEOUT_SECS))
            .user_agent("vantage-collect/0.1")
            .build()
            .expect("Failed to build RSS HTTP client");
        Self { client, feeds }
    }

    async fn fetch_feed(
        &self,
        feed_key: &str,
        feed_url: &str,
        category: &str,
    ) -> Result<Vec<CollectedItem>, CollectError> {
        debug!(feed = feed_key, "fetching feed");

        let resp = self.client.get(feed_url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(crate::adapter::status_error(
                status.as_u16(),
                format!("feed {feed_key} returned {status}"),
            ));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| CollectError::Network(e.to_string()))?;
        let feed = feed_rs::parser::parse(&bytes[..])
            .map_err(|e| CollectError::Parse(format!("{feed_key}: {e}")))?;

        let source_name = rss_display_name(feed_key);
        let items = feed
            .entries
            .into_iter()
            .take(ITEMS_PER_FEED)
            .filter_map(|entry| {
                let url = entry.links.first().map(|l| l.href.clone())?;
                let title = entry
                    .title
                    .map(|t| clean_text(&t.content))
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| "Untitled".to_string());
                let summary = entry
                    .summary
                    .map(|s| clean_text(&s.content))
                    .unwrap_or_default();
                let published = entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.with_timezone(&Utc));
                let author = entry
                    .authors
                    .first()
                    .map(|a| a.name.clone())
                    .unwrap_or_default();

                Some(CollectedItem {
                    source: "rss".to_string(),
                    source_name: source_name.clone(),
                    source_url: feed_url.to_string(),
                    category: category.to_string(),
                    title,
                    summary: truncate_text(&summary, 500),
                    url,
                    published,
                    author: author.clone(),
                    metadata: serde_json::json!({ "feed": feed_key, "author": author }),
                    raw_content: summary,
                })
            })
            .collect::<Vec<_>>();

        debug!(feed = feed_key, items = items.len(), "feed parsed");
        Ok(items)
    }
}

impl Default for RssAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for RssAdapter {
    fn name(&self) -> &str {
        "RSS Feeds"
    }

    fn source_type(&self) -> &str {
        "rss"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, CollectError> {
        info!(feeds = self.feeds.len(), "fetching RSS feeds");

        let futures = self
            .feeds
            .iter()
            .map(|(key, url, category)| self.fetch_feed(key, url, category));
        let results = futures::future::join_all(futures).await;

        let mut all_items = Vec::new();
        for ((key, _, _), result) in self.feeds.iter().zip(results) {
            match result {
                Ok(items) => all_items.extend(items),
                Err(e) => warn!(feed = %key, error = %e, "feed failed"),
            }
        }

        info!(
            items = all_items.len(),
            feeds = self.feeds.len(),
            "RSS collection complete"
        );
        Ok(all_items)
    }
}
