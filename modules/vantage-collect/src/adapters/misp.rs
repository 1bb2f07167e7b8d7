// Threat-sharing adapter over a MISP instance's restSearch API.
// Both the instance URL and the API key come from deployment config; the
// run is skipped when either is missing.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use vantage_common::{clean_text, truncate_text, CollectedItem};

use crate::adapter::{status_error, CollectError, SourceAdapter};
use crate::sources::API_TIMEOUT_SECS;

#[derive(Debug, Deserialize)]
struct RestSearchResponse {
    #[serde(default)]
    response: Vec<EventWrapper>,
}

#[derive(Debug, Deserialize)]
struct EventWrapper {
    #[serde(rename = "Event")]
    event: Option<Event>,
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(default)]
    id: String,
    #[serde(default)]
    uuid: String,
    #[serde(default)]
    info: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    threat_level_id: String,
    #[serde(default)]
    analysis: String,
    #[serde(rename = "Orgc", default)]
    orgc: Option<Org>,
    #[serde(rename = "Tag", default)]
    tags: Vec<Tag>,
    #[serde(rename = "Attribute", default)]
    attributes: Vec<Attribute>,
    #[serde(rename = "Galaxy", default)]
    galaxies: Vec<Galaxy>,
}

#[derive(Debug, Deserialize)]
struct Org {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Tag {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Attribute {
    #[serde(rename = "type", default)]
    attribute_type: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Galaxy {
    #[serde(rename = "GalaxyCluster", default)]
    clusters: Vec<GalaxyCluster>,
}

#[derive(Debug, Deserialize)]
struct GalaxyCluster {
    #[serde(default)]
    value: String,
}

pub struct MispAdapter {
    client: reqwest::Client,
    misp_url: String,
    api_key: String,
    days_back: i64,
    max_events: usize,
}

impl MispAdapter {
    pub fn new(misp_url: &str, api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent("vantage-collect/0.1")
            .build()
            .expect("Failed to build MISP HTTP client");
        Self {
            client,
            misp_url: misp_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            days_back: 7,
            max_events: 50,
        }
    }
}

fn threat_level(id: &str) -> &'static str {
    match id {
        "1" => "High",
        "2" => "Medium",
        "3" => "Low",
        "4" => "Undefined",
        _ => "Unknown",
    }
}

fn parse_published(timestamp: &str, date: &str) -> Option<DateTime<Utc>> {
    if let Ok(epoch) = timestamp.parse::<i64>() {
        if let Some(dt) = DateTime::from_timestamp(epoch, 0) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Count attributes by IOC type (ip-dst, domain, hashes, ...).
fn ioc_counts(attributes: &[Attribute]) -> serde_json::Value {
    let mut counts = std::collections::BTreeMap::new();
    for attribute in attributes {
        if attribute.value.is_empty() {
            continue;
        }
        *counts
            .entry(attribute.attribute_type.clone())
            .or_insert(0u64) += 1;
    }
    serde_json::to_value(counts).unwrap_or(serde_json::Value::Null)
}

#[async_trait]
impl SourceAdapter for MispAdapter {
    fn name(&self) -> &str {
        "MISP"
    }

    fn source_type(&self) -> &str {
        "misp"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, CollectError> {
        if self.misp_url.is_empty() || self.api_key.is_empty() {
            warn!("MISP instance not configured, skipping run");
            return Ok(vec![]);
        }

        let since = Utc::now() - chrono::Duration::days(self.days_back);
        debug!(since = %since, "querying MISP events");

        let payload = serde_json::json!({
            "returnFormat": "json",
            "timestamp": since.timestamp(),
            "limit": self.max_events,
            "published": true,
        });

        let resp = self
            .client
            .post(format!("{}/events/restSearch", self.misp_url))
            .header("Authorization", &self.api_key)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = resp.status().as_u16();
        match status {
            200 => {}
            403 => {
                return Err(CollectError::Upstream {
                    status: 403,
                    message: "MISP API key invalid or insufficient permissions".to_string(),
                })
            }
            429 => return Err(CollectError::RateLimited),
            other => return Err(status_error(other, format!("MISP returned {other}"))),
        }

        let body: RestSearchResponse = resp
            .json()
            .await
            .map_err(|e| CollectError::Parse(e.to_string()))?;

        let items = body
            .response
            .into_iter()
            .filter_map(|wrapper| wrapper.event)
            .filter(|event| !event.id.is_empty())
            .map(|event| {
                let org_name = event
                    .orgc
                    .as_ref()
                    .map(|o| o.name.clone())
                    .unwrap_or_default();
                let level = threat_level(&event.threat_level_id);
                let iocs = ioc_counts(&event.attributes);
                let ioc_total: u64 = iocs
                    .as_object()
                    .map(|m| m.values().filter_map(|v| v.as_u64()).sum())
                    .unwrap_or(0);
                let galaxy_names: Vec<String> = event
                    .galaxies
                    .iter()
                    .flat_map(|g| g.clusters.iter())
                    .map(|c| c.value.clone())
                    .filter(|v| !v.is_empty())
                    .collect();
                let tag_names: Vec<&str> = event
                    .tags
                    .iter()
                    .map(|t| t.name.as_str())
                    .filter(|n| !n.is_empty() && !n.starts_with("misp-galaxy"))
                    .take(5)
                    .collect();

                let mut summary_parts = Vec::new();
                if level != "Undefined" {
                    summary_parts.push(format!("Threat: {level}"));
                }
                if ioc_total > 0 {
                    summary_parts.push(format!("{ioc_total} IOCs"));
                }
                if !galaxy_names.is_empty() {
                    let related: Vec<&str> =
                        galaxy_names.iter().map(String::as_str).take(3).collect();
                    summary_parts.push(format!("Related: {}", related.join(", ")));
                }
                if !tag_names.is_empty() {
                    summary_parts.push(format!("Tags: {}", tag_names.join(", ")));
                }
                let summary = if summary_parts.is_empty() {
                    event.info.chars().take(500).collect()
                } else {
                    summary_parts.join(" | ")
                };

                let published = parse_published(&event.timestamp, &event.date);

                CollectedItem {
                    source: "misp".to_string(),
                    source_name: if org_name.is_empty() {
                        "MISP".to_string()
                    } else {
                        format!("MISP ({org_name})")
                    },
                    source_url: self.misp_url.clone(),
                    category: "cyber".to_string(),
                    title: clean_text(&event.info),
                    summary: truncate_text(&summary, 500),
                    url: format!("{}/events/view/{}", self.misp_url, event.id),
                    published,
                    author: org_name.clone(),
                    metadata: serde_json::json!({
                        "event_id": event.id,
                        "uuid": event.uuid,
                        "threat_level": level,
                        "analysis": event.analysis,
                        "organization": org_name,
                        "galaxies": galaxy_names,
                        "ioc_counts": iocs,
                        "attribute_count": event.attributes.len(),
                    }),
                    raw_content: String::new(),
                }
            })
            .collect::<Vec<_>>();

        info!(items = items.len(), "MISP collection complete");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threat_levels_map() {
        assert_eq!(threat_level("1"), "High");
        assert_eq!(threat_level("3"), "Low");
        assert_eq!(threat_level("4"), "Undefined");
        assert_eq!(threat_level("x"), "Unknown");
    }

    #[test]
    fn published_prefers_epoch_timestamp() {
        let from_epoch = parse_published("1767225600", "2020-01-01").unwrap();
        assert_eq!(from_epoch.format("%Y").to_string(), "2026");

        let from_date = parse_published("", "2026-07-02").unwrap();
        assert_eq!(from_date.format("%Y-%m-%d").to_string(), "2026-07-02");

        assert!(parse_published("", "garbage").is_none());
    }

    #[test]
    fn ioc_counts_group_by_attribute_type() {
        let attributes = vec![
            Attribute {
                attribute_type: "ip-dst".to_string(),
                value: "203.0.113.9".to_string(),
            },
            Attribute {
                attribute_type: "ip-dst".to_string(),
                value: "203.0.113.10".to_string(),
            },
            Attribute {
                attribute_type: "sha256".to_string(),
                value: "abc".to_string(),
            },
            Attribute {
                attribute_type: "domain".to_string(),
                value: String::new(),
            },
        ];
        let counts = ioc_counts(&attributes);
        assert_eq!(counts["ip-dst"], 2);
        assert_eq!(counts["sha256"], 1);
        assert!(counts.get("domain").is_none());
    }
}
