// Threat-intel adapter over the AlienVault OTX pulses API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use vantage_common::{clean_text, truncate_text, CollectedItem};

use crate::adapter::{status_error, CollectError, SourceAdapter};
use crate::sources::API_TIMEOUT_SECS;

const API_BASE: &str = "https://otx.alienvault.com/api/v1";

#[derive(Debug, Deserialize)]
struct PulsesResponse {
    #[serde(default)]
    results: Vec<Pulse>,
}

#[derive(Debug, Deserialize)]
struct Pulse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    modified: Option<String>,
    #[serde(default)]
    author: Option<Author>,
    #[serde(default)]
    adversary: String,
    #[serde(default)]
    malware_families: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    indicators: Vec<Indicator>,
}

#[derive(Debug, Default, Deserialize)]
struct Author {
    #[serde(default)]
    username: String,
}

#[derive(Debug, Deserialize)]
struct Indicator {
    #[serde(default, rename = "type")]
    indicator_type: String,
    #[serde(default)]
    indicator: String,
}

pub struct OtxAdapter {
    client: reqwest::Client,
    api_key: String,
    days_back: i64,
    max_pulses: usize,
}

impl OtxAdapter {
    pub fn new(api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent("vantage-collect/0.1")
            .build()
            .expect("Failed to build OTX HTTP client");
        Self {
            client,
            api_key: api_key.to_string(),
            days_back: 3,
            max_pulses: 50,
        }
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

/// Count indicators of compromise by type.
fn ioc_counts(indicators: &[Indicator]) -> serde_json::Value {
    let mut counts = std::collections::BTreeMap::new();
    for indicator in indicators {
        if indicator.indicator.is_empty() {
            continue;
        }
        *counts.entry(indicator.indicator_type.clone()).or_insert(0u64) += 1;
    }
    serde_json::to_value(counts).unwrap_or(serde_json::Value::Null)
}

#[async_trait]
impl SourceAdapter for OtxAdapter {
    fn name(&self) -> &str {
        "AlienVault OTX"
    }

    fn source_type(&self) -> &str {
        "otx"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, CollectError> {
        if self.api_key.is_empty() {
            warn!("OTX API key not configured, skipping run");
            return Ok(vec![]);
        }

        let modified_since = (Utc::now() - chrono::Duration::days(self.days_back))
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string();
        debug!(since = %modified_since, "querying OTX subscribed pulses");

        let resp = self
            .client
            .get(format!("{API_BASE}/pulses/subscribed"))
            .header("X-OTX-API-KEY", &self.api_key)
            .query(&[
                ("limit", self.max_pulses.to_string()),
                ("modified_since", modified_since),
            ])
            .send()
            .await?;

        let status = resp.status().as_u16();
        match status {
            200 => {}
            403 => {
                return Err(CollectError::Upstream {
                    status: 403,
                    message: "OTX API key invalid or expired".to_string(),
                })
            }
            429 => return Err(CollectError::RateLimited),
            other => {
                return Err(status_error(other, format!("OTX returned {other}")));
            }
        }

        let body: PulsesResponse = resp
            .json()
            .await
            .map_err(|e| CollectError::Parse(e.to_string()))?;

        let items = body
            .results
            .into_iter()
            .filter(|p| !p.id.is_empty())
            .map(|pulse| {
                let iocs = ioc_counts(&pulse.indicators);
                let ioc_total: u64 = iocs
                    .as_object()
                    .map(|m| m.values().filter_map(|v| v.as_u64()).sum())
                    .unwrap_or(0);

                let mut summary_parts = Vec::new();
                if !pulse.adversary.is_empty() {
                    summary_parts.push(format!("Adversary: {}", pulse.adversary));
                }
                if !pulse.malware_families.is_empty() {
                    let families: Vec<&str> = pulse
                        .malware_families
                        .iter()
                        .map(String::as_str)
                        .take(3)
                        .collect();
                    summary_parts.push(format!("Malware: {}", families.join(", ")));
                }
                if ioc_total > 0 {
                    summary_parts.push(format!("{ioc_total} IOCs"));
                }
                if !pulse.tags.is_empty() {
                    let tags: Vec<&str> = pulse.tags.iter().map(String::as_str).take(5).collect();
                    summary_parts.push(format!("Tags: {}", tags.join(", ")));
                }
                let description = clean_text(&pulse.description);
                let summary = if summary_parts.is_empty() {
                    description.chars().take(500).collect()
                } else {
                    summary_parts.join(" | ")
                };

                let published = parse_iso(&pulse.modified).or_else(|| parse_iso(&pulse.created));
                let author = pulse.author.map(|a| a.username).unwrap_or_default();

                CollectedItem {
                    source: "otx".to_string(),
                    source_name: "AlienVault OTX".to_string(),
                    source_url: API_BASE.to_string(),
                    category: "cyber".to_string(),
                    title: clean_text(&pulse.name),
                    summary: truncate_text(&summary, 500),
                    url: format!("https://otx.alienvault.com/pulse/{}", pulse.id),
                    published,
                    author,
                    metadata: serde_json::json!({
                        "pulse_id": pulse.id,
                        "adversary": pulse.adversary,
                        "malware_families": pulse.malware_families,
                        "tags": pulse.tags,
                        "ioc_counts": iocs,
                    }),
                    raw_content: description,
                }
            })
            .collect::<Vec<_>>();

        info!(items = items.len(), "OTX collection complete");
        Ok(items)
    }
}
