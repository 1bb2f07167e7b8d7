// Court-opinion adapter over the CourtListener REST API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use vantage_common::{clean_text, truncate_text, CollectedItem};

use crate::adapter::{status_error, CollectError, SourceAdapter};
use crate::sources::API_TIMEOUT_SECS;

const API_BASE: &str = "https://www.courtlistener.com/api/rest/v3";

/// Supreme Court plus the federal circuits. District courts produce far too
/// many opinions to poll by default.
const COURT_FILTER: &[&str] = &[
    "scotus", "ca1", "ca2", "ca3", "ca4", "ca5", "ca6", "ca7", "ca8", "ca9", "ca10", "ca11",
    "cadc", "cafc",
];

#[derive(Debug, Deserialize)]
struct OpinionsResponse {
    #[serde(default)]
    results: Vec<Opinion>,
}

#[derive(Debug, Deserialize)]
struct Opinion {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    case_name: String,
    #[serde(default)]
    date_filed: Option<String>,
    #[serde(default)]
    plain_text: String,
    #[serde(default)]
    html: String,
    #[serde(default)]
    author_str: String,
    #[serde(default)]
    absolute_url: String,
}

pub struct CourtListenerAdapter {
    client: reqwest::Client,
    days_back: i64,
    max_opinions: usize,
}

impl CourtListenerAdapter {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent("vantage-collect/0.1")
            .build()
            .expect("Failed to build CourtListener HTTP client");
        Self {
            client,
            days_back: 7,
            max_opinions: 50,
        }
    }
}

impl Default for CourtListenerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_date_filed(raw: &Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[async_trait]
impl SourceAdapter for CourtListenerAdapter {
    fn name(&self) -> &str {
        "CourtListener"
    }

    fn source_type(&self) -> &str {
        "courtlistener"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, CollectError> {
        let since = (Utc::now() - chrono::Duration::days(self.days_back))
            .format("%Y-%m-%d")
            .to_string();
        debug!(since = %since, "querying CourtListener opinions");

        let resp = self
            .client
            .get(format!("{API_BASE}/opinions/"))
            .query(&[
                ("date_filed__gte", since.as_str()),
                ("order_by", "-date_filed"),
                ("page_size", &self.max_opinions.min(100).to_string()),
                ("cluster__docket__court__in", &COURT_FILTER.join(",")),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(
                status.as_u16(),
                format!("CourtListener returned {status}"),
            ));
        }

        let body: OpinionsResponse = resp
            .json()
            .await
            .map_err(|e| CollectError::Parse(e.to_string()))?;

        let items = body
            .results
            .into_iter()
            .map(|opinion| {
                let case_name = if opinion.case_name.is_empty() {
                    format!("Opinion #{}", opinion.id)
                } else {
                    opinion.case_name.clone()
                };

                let text = if !opinion.plain_text.is_empty() {
                    opinion.plain_text.clone()
                } else {
                    clean_text(&opinion.html)
                };

                let url = if opinion.absolute_url.is_empty() {
                    format!("{API_BASE}/opinions/{}/", opinion.id)
                } else {
                    format!("https://www.courtlistener.com{}", opinion.absolute_url)
                };

                CollectedItem {
                    source: "courtlistener".to_string(),
                    source_name: "CourtListener".to_string(),
                    source_url: API_BASE.to_string(),
                    category: "legal".to_string(),
                    title: clean_text(&case_name),
                    summary: truncate_text(&text, 500),
                    url,
                    published: parse_date_filed(&opinion.date_filed),
                    author: opinion.author_str.clone(),
                    metadata: serde_json::json!({
                        "opinion_id": opinion.id,
                        "date_filed": opinion.date_filed,
                        "author": opinion.author_str,
                    }),
                    raw_content: text.chars().take(5000).collect(),
                }
            })
            .collect::<Vec<_>>();

        info!(items = items.len(), "CourtListener collection complete");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_filed_parses_bare_dates() {
        assert!(parse_date_filed(&Some("2026-07-14".to_string())).is_some());
        assert!(parse_date_filed(&Some("last tuesday".to_string())).is_none());
        assert!(parse_date_filed(&None).is_none());
    }

    #[test]
    fn court_filter_covers_scotus_and_circuits() {
        assert!(COURT_FILTER.contains(&"scotus"));
        assert_eq!(COURT_FILTER.len(), 14);
    }
}
