// Humanitarian Data Exchange adapter over the CKAN package-search API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use vantage_common::{clean_text, truncate_text, CollectedItem};

use crate::adapter::{status_error, CollectError, SourceAdapter};
use crate::sources::API_TIMEOUT_SECS;

const API_BASE: &str = "https://data.humdata.org/api/3";

#[derive(Debug, Deserialize)]
struct CkanResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: CkanResult,
}

#[derive(Debug, Default, Deserialize)]
struct CkanResult {
    #[serde(default)]
    results: Vec<Dataset>,
}

#[derive(Debug, Deserialize)]
struct Dataset {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    metadata_modified: Option<String>,
    #[serde(default)]
    organization: Option<Organization>,
    #[serde(default)]
    groups: Vec<Named>,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    resources: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Organization {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct Named {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct Tag {
    #[serde(default)]
    name: String,
}

pub struct HdxAdapter {
    client: reqwest::Client,
    days_back: i64,
    max_datasets: usize,
}

impl HdxAdapter {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent("vantage-collect/0.1")
            .build()
            .expect("Failed to build HDX HTTP client");
        Self {
            client,
            days_back: 3,
            max_datasets: 50,
        }
    }
}

impl Default for HdxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_iso(raw: &Option<String>) -> Option<DateTime<Utc>> {
    let s = raw.as_deref()?;
    let normalized = if s.ends_with('Z') || s.contains('+') {
        s.replace('Z', "+00:00")
    } else {
        format!("{s}+00:00")
    };
    DateTime::parse_from_rfc3339(&normalized)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl SourceAdapter for HdxAdapter {
    fn name(&self) -> &str {
        "Humanitarian Data Exchange"
    }

    fn source_type(&self) -> &str {
        "hdx"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, CollectError> {
        let since = (Utc::now() - chrono::Duration::days(self.days_back))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();
        debug!(since = %since, "querying HDX datasets");

        let resp = self
            .client
            .get(format!("{API_BASE}/action/package_search"))
            .query(&[
                ("rows", self.max_datasets.to_string()),
                ("sort", "metadata_modified desc".to_string()),
                ("fq", format!("metadata_modified:[{since} TO *]")),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(
                status.as_u16(),
                format!("HDX returned {status}"),
            ));
        }

        let body: CkanResponse = resp
            .json()
            .await
            .map_err(|e| CollectError::Parse(e.to_string()))?;
        if !body.success {
            return Err(CollectError::Upstream {
                status: 200,
                message: "CKAN reported failure".to_string(),
            });
        }

        let items = body
            .result
            .results
            .into_iter()
            .filter(|d| !d.id.is_empty())
            .map(|dataset| {
                let org_title = dataset
                    .organization
                    .as_ref()
                    .map(|o| o.title.clone())
                    .unwrap_or_default();
                let countries: Vec<&str> = dataset
                    .groups
                    .iter()
                    .map(|g| g.title.as_str())
                    .filter(|t| !t.is_empty())
                    .take(3)
                    .collect();
                let tags: Vec<&str> = dataset
                    .tags
                    .iter()
                    .map(|t| t.name.as_str())
                    .filter(|n| !n.is_empty())
                    .take(5)
                    .collect();

                let notes = clean_text(&dataset.notes);
                let mut summary_parts = Vec::new();
                if !countries.is_empty() {
                    summary_parts.push(format!("Countries: {}", countries.join(", ")));
                }
                if !org_title.is_empty() {
                    summary_parts.push(format!("By: {org_title}"));
                }
                if !tags.is_empty() {
                    summary_parts.push(format!("Tags: {}", tags.join(", ")));
                }
                if !notes.is_empty() {
                    summary_parts.push(notes.chars().take(300).collect());
                }
                let summary = if summary_parts.is_empty() {
                    dataset.title.clone()
                } else {
                    summary_parts.join(" | ")
                };

                let title = if dataset.title.is_empty() {
                    dataset.name.clone()
                } else {
                    dataset.title.clone()
                };

                CollectedItem {
                    source: "hdx".to_string(),
                    source_name: if org_title.is_empty() {
                        "HDX".to_string()
                    } else {
                        format!("HDX ({org_title})")
                    },
                    source_url: API_BASE.to_string(),
                    category: "humanitarian".to_string(),
                    title: format!("Dataset updated: {}", clean_text(&title)),
                    summary: truncate_text(&summary, 500),
                    url: format!("https://data.humdata.org/dataset/{}", dataset.name),
                    published: parse_iso(&dataset.metadata_modified),
                    author: org_title.clone(),
                    metadata: serde_json::json!({
                        "dataset_id": dataset.id,
                        "organization": org_title,
                        "countries": countries,
                        "tags": tags,
                        "resources_count": dataset.resources.len(),
                    }),
                    raw_content: notes,
                }
            })
            .collect::<Vec<_>>();

        info!(items = items.len(), "HDX collection complete");
        Ok(items)
    }
}
