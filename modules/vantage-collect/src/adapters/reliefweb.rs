// Humanitarian-reports adapter over the ReliefWeb API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use vantage_common::{clean_text, truncate_text, CollectedItem};

use crate::adapter::{status_error, CollectError, SourceAdapter};
use crate::sources::API_TIMEOUT_SECS;

const API_BASE: &str = "https://api.reliefweb.int/v1";

#[derive(Debug, Deserialize)]
struct ReportsResponse {
    #[serde(default)]
    data: Vec<Report>,
}

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(default)]
    id: serde_json::Value,
    #[serde(default)]
    href: String,
    #[serde(default)]
    fields: ReportFields,
}

#[derive(Debug, Default, Deserialize)]
struct ReportFields {
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    date: ReportDates,
    #[serde(default)]
    source: Vec<Named>,
    #[serde(default)]
    country: Vec<Named>,
    #[serde(default)]
    disaster_type: Vec<Named>,
}

#[derive(Debug, Default, Deserialize)]
struct ReportDates {
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    original: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Named {
    #[serde(default)]
    name: String,
}

pub struct ReliefWebAdapter {
    client: reqwest::Client,
    days_back: i64,
    max_reports: usize,
}

impl ReliefWebAdapter {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent("vantage-collect/0.1")
            .build()
            .expect("Failed to build ReliefWeb HTTP client");
        Self {
            client,
            days_back: 3,
            max_reports: 50,
        }
    }
}

impl Default for ReliefWebAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_iso(raw: &Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(&s.replace('Z', "+00:00")).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl SourceAdapter for ReliefWebAdapter {
    fn name(&self) -> &str {
        "ReliefWeb"
    }

    fn source_type(&self) -> &str {
        "reliefweb"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, CollectError> {
        let since = (Utc::now() - chrono::Duration::days(self.days_back))
            .format("%Y-%m-%dT%H:%M:%S+00:00")
            .to_string();
        debug!(since = %since, "querying ReliefWeb");

        let payload = serde_json::json!({
            "appname": "vantage",
            "limit": self.max_reports,
            "preset": "latest",
            "fields": {
                "include": ["id", "title", "body", "url", "date.created",
                            "date.original", "source", "country", "disaster_type"]
            },
            "filter": {
                "field": "date.created",
                "value": { "from": since }
            },
            "sort": ["date.created:desc"]
        });

        let resp = self
            .client
            .post(format!("{API_BASE}/reports"))
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(
                status.as_u16(),
                format!("ReliefWeb returned {status}"),
            ));
        }

        let body: ReportsResponse = resp
            .json()
            .await
            .map_err(|e| CollectError::Parse(e.to_string()))?;

        let items = body
            .data
            .into_iter()
            .map(|report| {
                let report_id = report
                    .id
                    .as_str()
                    .map(String::from)
                    .unwrap_or_else(|| report.id.to_string());
                let fields = report.fields;
                let source_name = fields
                    .source
                    .first()
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|| "ReliefWeb".to_string());
                let countries: Vec<&str> = fields
                    .country
                    .iter()
                    .map(|c| c.name.as_str())
                    .take(3)
                    .collect();
                let disaster_types: Vec<&str> = fields
                    .disaster_type
                    .iter()
                    .map(|d| d.name.as_str())
                    .take(2)
                    .collect();

                let body_text = clean_text(&fields.body);
                let mut summary_parts = Vec::new();
                if !countries.is_empty() {
                    summary_parts.push(format!("Countries: {}", countries.join(", ")));
                }
                if !disaster_types.is_empty() {
                    summary_parts.push(format!("Type: {}", disaster_types.join(", ")));
                }
                if !body_text.is_empty() {
                    summary_parts.push(body_text.chars().take(300).collect());
                }
                let summary = if summary_parts.is_empty() {
                    fields.title.clone()
                } else {
                    summary_parts.join(" | ")
                };

                let url = if !fields.url.is_empty() {
                    fields.url.clone()
                } else if !report.href.is_empty() {
                    report.href.clone()
                } else {
                    format!("https://reliefweb.int/node/{report_id}")
                };

                let published = parse_iso(&fields.date.created)
                    .or_else(|| parse_iso(&fields.date.original));

                CollectedItem {
                    source: "reliefweb".to_string(),
                    source_name: format!("ReliefWeb ({source_name})"),
                    source_url: API_BASE.to_string(),
                    category: "humanitarian".to_string(),
                    title: clean_text(&fields.title),
                    summary: truncate_text(&summary, 500),
                    url,
                    published,
                    author: source_name,
                    metadata: serde_json::json!({
                        "report_id": report_id,
                        "countries": countries,
                        "disaster_types": disaster_types,
                    }),
                    raw_content: body_text.chars().take(5000).collect(),
                }
            })
            .collect::<Vec<_>>();

        info!(items = items.len(), "ReliefWeb collection complete");
        Ok(items)
    }
}
