// Breach-disclosure adapter over the Have I Been Pwned v3 API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use vantage_common::{clean_text, truncate_text, CollectedItem};

use crate::adapter::{status_error, CollectError, SourceAdapter};
use crate::sources::API_TIMEOUT_SECS;

const API_BASE: &str = "https://haveibeenpwned.com/api/v3";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Breach {
    #[serde(default)]
    name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    domain: String,
    #[serde(default)]
    breach_date: String,
    #[serde(default)]
    added_date: String,
    #[serde(default)]
    pwn_count: i64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    data_classes: Vec<String>,
    #[serde(default)]
    is_verified: bool,
    #[serde(default)]
    is_fabricated: bool,
    #[serde(default)]
    is_spam_list: bool,
}

pub struct HibpAdapter {
    client: reqwest::Client,
    api_key: String,
    days_back: i64,
}

impl HibpAdapter {
    pub fn new(api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent("vantage-collect/0.1")
            .build()
            .expect("Failed to build HIBP HTTP client");
        Self {
            client,
            api_key: api_key.to_string(),
            days_back: 30,
        }
    }
}

/// Fabricated and spam-list catalog entries are not breach intelligence.
fn is_reportable(breach: &Breach) -> bool {
    !breach.name.is_empty() && !breach.is_fabricated && !breach.is_spam_list
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    // AddedDate is RFC 3339; BreachDate is a bare date.
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

#[async_trait]
impl SourceAdapter for HibpAdapter {
    fn name(&self) -> &str {
        "Have I Been Pwned"
    }

    fn source_type(&self) -> &str {
        "hibp"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, CollectError> {
        if self.api_key.is_empty() {
            warn!("HIBP API key not configured, skipping run");
            return Ok(vec![]);
        }

        debug!("fetching HIBP breach catalog");
        let resp = self
            .client
            .get(format!("{API_BASE}/breaches"))
            .header("hibp-api-key", &self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(
                status.as_u16(),
                format!("HIBP returned {status}"),
            ));
        }

        let breaches: Vec<Breach> = resp
            .json()
            .await
            .map_err(|e| CollectError::Parse(e.to_string()))?;

        let cutoff = Utc::now() - chrono::Duration::days(self.days_back);
        let items = breaches
            .into_iter()
            .filter(is_reportable)
            .filter(|b| parse_date(&b.added_date).map(|d| d >= cutoff).unwrap_or(false))
            .map(|breach| {
                let description = clean_text(&breach.description);
                let classes: Vec<&str> =
                    breach.data_classes.iter().map(String::as_str).take(6).collect();
                let mut summary = format!(
                    "{} accounts affected ({})",
                    breach.pwn_count,
                    if breach.is_verified { "verified" } else { "unverified" },
                );
                if !classes.is_empty() {
                    summary.push_str(&format!(" | Exposed: {}", classes.join(", ")));
                }
                if !description.is_empty() {
                    summary.push_str(" | ");
                    summary.push_str(&description);
                }

                CollectedItem {
                    source: "hibp".to_string(),
                    source_name: "Have I Been Pwned".to_string(),
                    source_url: API_BASE.to_string(),
                    category: "cyber".to_string(),
                    title: format!("Data breach: {}", breach.title),
                    summary: truncate_text(&summary, 500),
                    url: format!("https://haveibeenpwned.com/PwnedWebsites#{}", breach.name),
                    published: parse_date(&breach.breach_date),
                    author: String::new(),
                    metadata: serde_json::json!({
                        "breach_name": breach.name,
                        "domain": breach.domain,
                        "pwn_count": breach.pwn_count,
                        "data_classes": breach.data_classes,
                        "is_verified": breach.is_verified,
                        "added_date": breach.added_date,
                    }),
                    raw_content: description,
                }
            })
            .collect::<Vec<_>>();

        info!(items = items.len(), "HIBP collection complete");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_date_shapes() {
        assert!(parse_date("2026-05-14T03:21:00Z").is_some());
        assert!(parse_date("2026-05-14").is_some());
        assert!(parse_date("garbage").is_none());
    }

    #[test]
    fn fabricated_and_spam_list_breaches_are_skipped() {
        let breach = |fabricated: bool, spam: bool| Breach {
            name: "SomeSite".to_string(),
            title: "SomeSite".to_string(),
            domain: "somesite.example".to_string(),
            breach_date: "2026-05-14".to_string(),
            added_date: "2026-05-14T03:21:00Z".to_string(),
            pwn_count: 1000,
            description: String::new(),
            data_classes: vec![],
            is_verified: true,
            is_fabricated: fabricated,
            is_spam_list: spam,
        };
        assert!(is_reportable(&breach(false, false)));
        assert!(!is_reportable(&breach(true, false)));
        assert!(!is_reportable(&breach(false, true)));
    }

    #[test]
    fn breach_wire_fields_are_pascal_case() {
        let raw = r#"{"Name":"X","Title":"X","Domain":"x.example","BreachDate":"2026-05-14",
                      "AddedDate":"2026-05-14T03:21:00Z","PwnCount":5,"Description":"",
                      "DataClasses":["Email addresses"],"IsVerified":true,
                      "IsFabricated":true,"IsSpamList":false}"#;
        let breach: Breach = serde_json::from_str(raw).unwrap();
        assert!(breach.is_fabricated);
        assert!(!breach.is_spam_list);
        assert!(breach.is_verified);
    }
}
