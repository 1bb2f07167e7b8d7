// Global news/events adapter over the GDELT DOC 2.0 API.
// Query templates are data (sources.rs), not code.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use vantage_common::{clean_text, truncate_text, CollectedItem};

use crate::adapter::{status_error, CollectError, SourceAdapter};
use crate::sources::{API_TIMEOUT_SECS, GDELT_QUERY_TEMPLATES};

const DOC_API: &str = "https://api.gdeltproject.org/api/v2/doc/doc";

#[derive(Debug, Deserialize)]
struct DocResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    seendate: String,
    #[serde(default)]
    domain: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    sourcecountry: String,
}

pub struct GdeltAdapter {
    client: reqwest::Client,
    templates: Vec<&'static str>,
    max_items: usize,
    /// Recency window understood by the API: "24h", "48h", "7d".
    timespan: String,
}

impl GdeltAdapter {
    pub fn new() -> Self {
        Self::with_templates(
            GDELT_QUERY_TEMPLATES.iter().map(|t| t.0).collect(),
            50,
            "24h",
        )
    }

    pub fn with_templates(templates: Vec<&'static str>, max_items: usize, timespan: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent("vantage-collect/0.1")
            .build()
            .expect("Failed to build GDELT HTTP client");
        Self {
            client,
            templates,
            max_items,
            timespan: timespan.to_string(),
        }
    }

    fn template(name: &str) -> Option<(&'static str, &'static str)> {
        GDELT_QUERY_TEMPLATES
            .iter()
            .find(|t| t.0 == name)
            .map(|t| (t.1, t.2))
    }

    async fn fetch_template(&self, template: &str) -> Result<Vec<CollectedItem>, CollectError> {
        let (query, category) = Self::template(template)
            .ok_or_else(|| CollectError::Parse(format!("unknown query template: {template}")))?;

        debug!(template, "querying GDELT");
        let resp = self
            .client
            .get(DOC_API)
            .query(&[
                ("format", "json"),
                ("maxrecords", &self.max_items.to_string()),
                ("timespan", &self.timespan),
                ("sort", "DateDesc"),
                ("query", query),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(
                status.as_u16(),
                format!("template {template} returned {status}"),
            ));
        }

        let body: DocResponse = resp
            .json()
            .await
            .map_err(|e| CollectError::Parse(e.to_string()))?;

        let items = body
            .articles
            .into_iter()
            .filter(|a| !a.url.is_empty())
            .map(|article| {
                let published = parse_seendate(&article.seendate);
                let title = clean_text(&article.title);
                CollectedItem {
                    source: "gdelt".to_string(),
                    source_name: format_domain(&article.domain),
                    source_url: DOC_API.to_string(),
                    category: category.to_string(),
                    title: if title.is_empty() {
                        "Untitled".to_string()
                    } else {
                        title.clone()
                    },
                    // GDELT articles carry no body; the title doubles as summary.
                    summary: truncate_text(&title, 500),
                    url: article.url,
                    published,
                    author: String::new(),
                    metadata: serde_json::json!({
                        "domain": article.domain,
                        "language": article.language,
                        "sourcecountry": article.sourcecountry,
                        "query_template": template,
                    }),
                    raw_content: String::new(),
                }
            })
            .collect::<Vec<_>>();

        debug!(template, items = items.len(), "GDELT template fetched");
        Ok(items)
    }
}

impl Default for GdeltAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for GdeltAdapter {
    fn name(&self) -> &str {
        "GDELT"
    }

    fn source_type(&self) -> &str {
        "gdelt"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, CollectError> {
        info!(templates = self.templates.len(), "querying GDELT templates");

        let futures = self.templates.iter().map(|t| self.fetch_template(t));
        let results = futures::future::join_all(futures).await;

        let mut all_items = Vec::new();
        for (template, result) in self.templates.iter().zip(results) {
            match result {
                Ok(items) => all_items.extend(items),
                Err(e) => warn!(template = %template, error = %e, "GDELT template failed"),
            }
        }

        info!(items = all_items.len(), "GDELT collection complete");
        Ok(all_items)
    }
}

/// GDELT timestamps look like `20260214T131500Z`.
fn parse_seendate(raw: &str) -> Option<DateTime<Utc>> {
    if raw.len() < 15 {
        return None;
    }
    NaiveDateTime::parse_from_str(&raw[..15], "%Y%m%dT%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn format_domain(domain: &str) -> String {
    let known = [
        ("reuters.com", "Reuters (via GDELT)"),
        ("apnews.com", "AP News (via GDELT)"),
        ("bbc.com", "BBC (via GDELT)"),
        ("bbc.co.uk", "BBC (via GDELT)"),
        ("nytimes.com", "NY Times (via GDELT)"),
        ("washingtonpost.com", "Washington Post (via GDELT)"),
        ("theguardian.com", "The Guardian (via GDELT)"),
    ];
    for (d, name) in known {
        if domain == d {
            return name.to_string();
        }
    }
    if domain.is_empty() {
        "GDELT".to_string()
    } else {
        format!("{domain} (via GDELT)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_seendate_valid() {
        let dt = parse_seendate("20260214T131500Z").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2026-02-14 13:15");
    }

    #[test]
    fn parse_seendate_garbage_is_none() {
        assert!(parse_seendate("").is_none());
        assert!(parse_seendate("not-a-date").is_none());
    }

    #[test]
    fn format_domain_known_and_unknown() {
        assert_eq!(format_domain("reuters.com"), "Reuters (via GDELT)");
        assert_eq!(format_domain("example.org"), "example.org (via GDELT)");
        assert_eq!(format_domain(""), "GDELT");
    }
}
