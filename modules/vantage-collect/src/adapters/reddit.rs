// Community/forum adapter over the unauthenticated reddit JSON endpoint.
// One-second pause between subreddits keeps us under the anonymous limits.

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use tracing::{debug, info, warn};

use vantage_common::{clean_text, truncate_text, CollectedItem};

use crate::adapter::{status_error, CollectError, SourceAdapter};
use crate::sources::{API_TIMEOUT_SECS, REDDIT_SUBREDDITS};

const SUBREDDIT_PAUSE: Duration = Duration::from_secs(1);
const POSTS_PER_SUB: usize = 25;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: i64,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    stickied: bool,
}

pub struct RedditAdapter {
    client: reqwest::Client,
    subreddits: Vec<(String, String)>,
}

impl RedditAdapter {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent("vantage-collect/0.1")
            .build()
            .expect("Failed to build reddit HTTP client");
        Self {
            client,
            subreddits: REDDIT_SUBREDDITS
                .iter()
                .map(|(s, c)| (s.to_string(), c.to_string()))
                .collect(),
        }
    }

    async fn fetch_subreddit(
        &self,
        subreddit: &str,
        category: &str,
    ) -> Result<Vec<CollectedItem>, CollectError> {
        debug!(subreddit, "fetching hot posts");

        let url = format!("https://www.reddit.com/r/{subreddit}/hot.json?limit={POSTS_PER_SUB}");
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(
                status.as_u16(),
                format!("r/{subreddit} returned {status}"),
            ));
        }

        let listing: Listing = resp
            .json()
            .await
            .map_err(|e| CollectError::Parse(format!("r/{subreddit}: {e}")))?;

        let items = listing
            .data
            .children
            .into_iter()
            .map(|c| c.data)
            .filter(|p| !p.stickied && !p.title.is_empty())
            .map(|post| {
                // Link posts carry no selftext; the title stands in so they
                // still have a body for validation and ranking.
                let body = if post.selftext.is_empty() {
                    clean_text(&post.title)
                } else {
                    clean_text(&post.selftext)
                };
                let published = DateTime::from_timestamp(post.created_utc as i64, 0);
                CollectedItem {
                    source: "reddit".to_string(),
                    source_name: format!("r/{}", post.subreddit),
                    source_url: format!("https://reddit.com/r/{}", post.subreddit),
                    category: category.to_string(),
                    title: clean_text(&post.title),
                    summary: truncate_text(&body, 500),
                    url: format!("https://reddit.com{}", post.permalink),
                    published,
                    author: post.author.clone(),
                    metadata: serde_json::json!({
                        "subreddit": post.subreddit,
                        "score": post.score,
                        "num_comments": post.num_comments,
                    }),
                    raw_content: body,
                }
            })
            .collect::<Vec<_>>();

        debug!(subreddit, items = items.len(), "subreddit fetched");
        Ok(items)
    }
}

impl Default for RedditAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for RedditAdapter {
    fn name(&self) -> &str {
        "Reddit"
    }

    fn source_type(&self) -> &str {
        "reddit"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, CollectError> {
        info!(subreddits = self.subreddits.len(), "fetching subreddits");

        let mut all_items = Vec::new();
        for (i, (subreddit, category)) in self.subreddits.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(SUBREDDIT_PAUSE).await;
            }
            match self.fetch_subreddit(subreddit, category).await {
                Ok(items) => all_items.extend(items),
                Err(CollectError::RateLimited) => return Err(CollectError::RateLimited),
                Err(e) => warn!(subreddit = %subreddit, error = %e, "subreddit failed"),
            }
        }

        info!(items = all_items.len(), "reddit collection complete");
        Ok(all_items)
    }
}
