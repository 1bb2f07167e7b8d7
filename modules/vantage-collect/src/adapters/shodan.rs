// Exposed-infrastructure adapter over the Shodan host-search API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use vantage_common::{truncate_text, CollectedItem};

use crate::adapter::{status_error, CollectError, SourceAdapter};
use crate::sources::API_TIMEOUT_SECS;

const API_BASE: &str = "https://api.shodan.io";

/// Default monitoring queries for exposed critical services.
const DEFAULT_QUERIES: &[&str] = &[
    "product:scada",
    "port:502 modbus",
    "port:102 siemens",
];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    matches: Vec<HostMatch>,
}

#[derive(Debug, Deserialize)]
struct HostMatch {
    #[serde(default)]
    ip_str: String,
    #[serde(default)]
    port: u16,
    #[serde(default)]
    transport: String,
    #[serde(default)]
    product: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    os: Option<String>,
    #[serde(default)]
    org: Option<String>,
    #[serde(default)]
    asn: Option<String>,
    #[serde(default)]
    location: Location,
    #[serde(default)]
    vulns: serde_json::Value,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Location {
    #[serde(default)]
    country_name: Option<String>,
    #[serde(default)]
    city: Option<String>,
}

pub struct ShodanAdapter {
    client: reqwest::Client,
    api_key: String,
    queries: Vec<&'static str>,
    max_results: usize,
}

impl ShodanAdapter {
    pub fn new(api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent("vantage-collect/0.1")
            .build()
            .expect("Failed to build Shodan HTTP client");
        Self {
            client,
            api_key: api_key.to_string(),
            queries: DEFAULT_QUERIES.to_vec(),
            max_results: 25,
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<HostMatch>, CollectError> {
        debug!(query, "running Shodan search");

        let resp = self
            .client
            .get(format!("{API_BASE}/shodan/host/search"))
            .query(&[
                ("key", self.api_key.as_str()),
                ("query", query),
                ("minify", "true"),
            ])
            .send()
            .await?;

        let status = resp.status().as_u16();
        match status {
            200 => {}
            401 => {
                return Err(CollectError::Upstream {
                    status: 401,
                    message: "Shodan API key invalid".to_string(),
                })
            }
            402 => {
                return Err(CollectError::Upstream {
                    status: 402,
                    message: format!("query requires paid tier: {query}"),
                })
            }
            429 => return Err(CollectError::RateLimited),
            other => return Err(status_error(other, format!("search returned {other}"))),
        }

        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| CollectError::Parse(e.to_string()))?;
        Ok(body.matches.into_iter().take(self.max_results).collect())
    }
}

fn parse_timestamp(raw: &Option<String>) -> Option<DateTime<Utc>> {
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

fn vuln_ids(vulns: &serde_json::Value) -> Vec<String> {
    match vulns {
        serde_json::Value::Object(map) => map.keys().cloned().collect(),
        serde_json::Value::Array(arr) => arr
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => vec![],
    }
}

fn match_to_item(host: &HostMatch, query: &str) -> Option<CollectedItem> {
    if host.ip_str.is_empty() {
        return None;
    }

    let service_name = if host.product.is_empty() {
        format!("port {}", host.port)
    } else {
        host.product.clone()
    };
    let title = format!("Exposed: {service_name} on {}:{}", host.ip_str, host.port);

    let org = host.org.clone().unwrap_or_default();
    let country = host.location.country_name.clone().unwrap_or_default();
    let city = host.location.city.clone().unwrap_or_default();
    let os_info = host.os.clone().unwrap_or_default();
    let vulns = vuln_ids(&host.vulns);

    let mut summary_parts = Vec::new();
    if !org.is_empty() {
        summary_parts.push(format!("Org: {org}"));
    }
    if !country.is_empty() {
        if city.is_empty() {
            summary_parts.push(format!("Location: {country}"));
        } else {
            summary_parts.push(format!("Location: {city}, {country}"));
        }
    }
    if !vulns.is_empty() {
        let shown: Vec<&str> = vulns.iter().map(String::as_str).take(3).collect();
        summary_parts.push(format!("Vulns: {}", shown.join(", ")));
    }
    if !os_info.is_empty() {
        summary_parts.push(format!("OS: {os_info}"));
    }
    let summary = if summary_parts.is_empty() {
        format!("{}:{}", host.ip_str, host.port)
    } else {
        summary_parts.join(" | ")
    };

    Some(CollectedItem {
        source: "shodan".to_string(),
        source_name: "Shodan".to_string(),
        source_url: API_BASE.to_string(),
        category: "cyber".to_string(),
        title,
        summary: truncate_text(&summary, 500),
        url: format!("https://www.shodan.io/host/{}", host.ip_str),
        published: parse_timestamp(&host.timestamp),
        author: String::new(),
        metadata: serde_json::json!({
            "ip": host.ip_str,
            "port": host.port,
            "transport": host.transport,
            "product": host.product,
            "version": host.version,
            "os": os_info,
            "organization": org,
            "asn": host.asn,
            "country": country,
            "city": city,
            "vulns": vulns,
            "query": query,
        }),
        raw_content: String::new(),
    })
}

#[async_trait]
impl SourceAdapter for ShodanAdapter {
    fn name(&self) -> &str {
        "Shodan"
    }

    fn source_type(&self) -> &str {
        "shodan"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, CollectError> {
        if self.api_key.is_empty() {
            warn!("Shodan API key not configured, skipping run");
            return Ok(vec![]);
        }

        let mut items = Vec::new();
        for query in &self.queries {
            match self.search(query).await {
                Ok(matches) => {
                    items.extend(matches.iter().filter_map(|m| match_to_item(m, query)));
                }
                Err(CollectError::RateLimited) => return Err(CollectError::RateLimited),
                Err(e) => warn!(query = %query, error = %e, "Shodan query failed"),
            }
        }

        info!(items = items.len(), "Shodan collection complete");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(product: &str, vulns: serde_json::Value) -> HostMatch {
        HostMatch {
            ip_str: "198.51.100.7".to_string(),
            port: 502,
            transport: "tcp".to_string(),
            product: product.to_string(),
            version: String::new(),
            os: None,
            org: Some("Example Utility Co".to_string()),
            asn: Some("AS64500".to_string()),
            location: Location {
                country_name: Some("Germany".to_string()),
                city: Some("Essen".to_string()),
            },
            vulns,
            timestamp: Some("2026-07-30T12:00:00".to_string()),
        }
    }

    #[test]
    fn match_builds_title_and_summary() {
        let item = match_to_item(
            &host("Modbus", serde_json::json!({"CVE-2024-0001": {}})),
            "port:502 modbus",
        )
        .unwrap();
        assert_eq!(item.title, "Exposed: Modbus on 198.51.100.7:502");
        assert!(item.summary.contains("Org: Example Utility Co"));
        assert!(item.summary.contains("Location: Essen, Germany"));
        assert!(item.summary.contains("CVE-2024-0001"));
        assert_eq!(item.category, "cyber");
    }

    #[test]
    fn missing_product_falls_back_to_port() {
        let item = match_to_item(&host("", serde_json::Value::Null), "q").unwrap();
        assert_eq!(item.title, "Exposed: port 502 on 198.51.100.7:502");
    }

    #[test]
    fn vulns_accepts_map_or_array() {
        assert_eq!(
            vuln_ids(&serde_json::json!({"CVE-1": {}, "CVE-2": {}})).len(),
            2
        );
        assert_eq!(vuln_ids(&serde_json::json!(["CVE-3"])), vec!["CVE-3"]);
        assert!(vuln_ids(&serde_json::Value::Null).is_empty());
    }

    #[test]
    fn empty_ip_is_dropped() {
        let mut h = host("x", serde_json::Value::Null);
        h.ip_str = String::new();
        assert!(match_to_item(&h, "q").is_none());
    }
}
