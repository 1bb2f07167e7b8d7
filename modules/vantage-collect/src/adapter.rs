use async_trait::async_trait;
use thiserror::Error;

use vantage_common::CollectedItem;

/// Failure modes of a single adapter run. The scheduler treats them
/// uniformly as a failed run; `RateLimited` additionally suggests a longer
/// wait before the next attempt.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream rejected request ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Malformed payload: {0}")]
    Parse(String),

    #[error("Rate limited by upstream")]
    RateLimited,
}

impl From<reqwest::Error> for CollectError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            if status.as_u16() == 429 {
                return CollectError::RateLimited;
            }
            return CollectError::Upstream {
                status: status.as_u16(),
                message: e.to_string(),
            };
        }
        CollectError::Network(e.to_string())
    }
}

/// Map a non-success HTTP status to the right failure kind.
pub fn status_error(status: u16, message: String) -> CollectError {
    if status == 429 {
        CollectError::RateLimited
    } else {
        CollectError::Upstream { status, message }
    }
}

/// One external source. Adapters are stateless beyond what the scheduler
/// tracks for them; they fetch, normalize, classify, and never persist.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Human-readable name, e.g. "RSS Feeds".
    fn name(&self) -> &str;

    /// Short source tag, e.g. "rss", "gdelt".
    fn source_type(&self) -> &str;

    /// Fetch items from the source.
    async fn collect(&self) -> Result<Vec<CollectedItem>, CollectError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_maps_to_rate_limited() {
        assert!(matches!(
            status_error(429, String::new()),
            CollectError::RateLimited
        ));
    }

    #[test]
    fn status_401_maps_to_upstream() {
        match status_error(401, "unauthorized".to_string()) {
            CollectError::Upstream { status, .. } => assert_eq!(status, 401),
            other => panic!("expected Upstream, got {other:?}"),
        }
    }
}
