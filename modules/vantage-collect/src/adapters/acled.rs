// Conflict-events adapter over the ACLED API.
// Requires `key` + `email` query parameters; skips the run when unconfigured.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use vantage_common::{truncate_text, CollectedItem};

use crate::adapter::{status_error, CollectError, SourceAdapter};
use crate::sources::{ACLED_EVENT_TYPES, API_TIMEOUT_SECS};

const API_BASE: &str = "https://api.acleddata.com/acled/read";

#[derive(Debug, Deserialize)]
struct AcledResponse {
    #[serde(default = "default_true")]
    success: bool,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    data: Vec<AcledEvent>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AcledEvent {
    #[serde(default)]
    pub event_id_cnty: String,
    #[serde(default)]
    pub event_date: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub sub_event_type: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub actor1: String,
    #[serde(default)]
    pub actor2: String,
    #[serde(default)]
    pub fatalities: serde_json::Value,
    #[serde(default)]
    pub notes: String,
}

impl AcledEvent {
    fn fatalities_count(&self) -> i64 {
        match &self.fatalities {
            serde_json::Value::Number(n) => n.as_i64().unwrap_or(0),
            serde_json::Value::String(s) => s.parse().unwrap_or(0),
            _ => 0,
        }
    }
}

pub struct AcledAdapter {
    client: reqwest::Client,
    api_key: String,
    email: String,
    days_back: i64,
    max_items: usize,
}

impl AcledAdapter {
    pub fn new(api_key: &str, email: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent("vantage-collect/0.1")
            .build()
            .expect("Failed to build ACLED HTTP client");
        Self {
            client,
            api_key: api_key.to_string(),
            email: email.to_string(),
            days_back: 7,
            max_items: 500,
        }
    }

    fn configured(&self) -> bool {
        !self.api_key.is_empty() && !self.email.is_empty()
    }
}

/// Severity by event-type weight plus fatality bucket, with a bump when a
/// state actor is involved. >=8 critical, >=5 high, >=3 medium, else low.
pub fn severity_for(event: &AcledEvent) -> &'static str {
    let mut score = ACLED_EVENT_TYPES
        .iter()
        .find(|(name, _, _)| *name == event.event_type)
        .map(|(_, _, weight)| *weight)
        .unwrap_or(1);

    let fatalities = event.fatalities_count();
    score += match fatalities {
        f if f >= 100 => 5,
        f if f >= 50 => 4,
        f if f >= 10 => 3,
        f if f >= 1 => 2,
        _ => 0,
    };

    let actors = format!("{} {}", event.actor1, event.actor2).to_lowercase();
    if ["military", "government", "police", "army"]
        .iter()
        .any(|term| actors.contains(term))
    {
        score += 1;
    }

    match score {
        s if s >= 8 => "critical",
        s if s >= 5 => "high",
        s if s >= 3 => "medium",
        _ => "low",
    }
}

pub fn category_for(event_type: &str) -> &'static str {
    ACLED_EVENT_TYPES
        .iter()
        .find(|(name, _, _)| *name == event_type)
        .map(|(_, category, _)| *category)
        .unwrap_or("conflict")
}

fn parse_event_date(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[async_trait]
impl SourceAdapter for AcledAdapter {
    fn name(&self) -> &str {
        "ACLED Conflict Data"
    }

    fn source_type(&self) -> &str {
        "acled"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, CollectError> {
        if !self.configured() {
            warn!("ACLED credentials not configured, skipping run");
            return Ok(vec![]);
        }

        let start_date = (Utc::now() - chrono::Duration::days(self.days_back))
            .format("%Y-%m-%d")
            .to_string();
        info!(since = %start_date, "querying ACLED");

        let resp = self
            .client
            .get(API_BASE)
            .query(&[
                ("key", self.api_key.as_str()),
                ("email", self.email.as_str()),
                ("event_date", start_date.as_str()),
                ("event_date_where", ">="),
                ("limit", &self.max_items.to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(status.as_u16(), format!("ACLED returned {status}")));
        }

        let body: AcledResponse = resp
            .json()
            .await
            .map_err(|e| CollectError::Parse(e.to_string()))?;

        if !body.success {
            let error = body
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(CollectError::Upstream {
                status: 200,
                message: error,
            });
        }

        let items = body
            .data
            .into_iter()
            .map(|event| {
                let severity = severity_for(&event);
                let category = category_for(&event.event_type);
                let fatalities = event.fatalities_count();

                let mut title = event.event_type.clone();
                if !event.sub_event_type.is_empty() {
                    title.push_str(&format!(" ({})", event.sub_event_type));
                }
                title.push_str(&format!(" in {}, {}", event.location, event.country));

                let mut summary = truncate_text(&event.notes, 500);
                if fatalities > 0 {
                    summary = format!("[{fatalities} fatalities] {summary}");
                }

                let url = format!(
                    "https://acleddata.com/data-export-tool/?event_id={}",
                    event.event_id_cnty
                );

                CollectedItem {
                    source: "acled".to_string(),
                    source_name: "ACLED".to_string(),
                    source_url: API_BASE.to_string(),
                    category: category.to_string(),
                    title,
                    summary,
                    url,
                    published: parse_event_date(&event.event_date),
                    author: String::new(),
                    metadata: serde_json::json!({
                        "event_type": event.event_type,
                        "sub_event_type": event.sub_event_type,
                        "region": event.region,
                        "country": event.country,
                        "actor1": event.actor1,
                        "actor2": event.actor2,
                        "fatalities": fatalities,
                        "severity": severity,
                    }),
                    raw_content: event.notes,
                }
            })
            .collect::<Vec<_>>();

        info!(items = items.len(), "ACLED collection complete");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: &str, fatalities: i64, actor1: &str) -> AcledEvent {
        AcledEvent {
            event_id_cnty: "UKR12345".to_string(),
            event_date: "2026-07-20".to_string(),
            event_type: event_type.to_string(),
            sub_event_type: String::new(),
            location: "Kharkiv".to_string(),
            country: "Ukraine".to_string(),
            region: "Europe".to_string(),
            actor1: actor1.to_string(),
            actor2: String::new(),
            fatalities: serde_json::json!(fatalities),
            notes: String::new(),
        }
    }

    #[test]
    fn battle_with_mass_fatalities_is_critical() {
        // 3 (Battles) + 5 (>=100 dead) = 8
        assert_eq!(severity_for(&event("Battles", 120, "rebels")), "critical");
    }

    #[test]
    fn protest_without_fatalities_is_low() {
        assert_eq!(severity_for(&event("Protests", 0, "civilians")), "low");
    }

    #[test]
    fn state_actor_bumps_score() {
        // Riots(2) + 1 fatality(2) = 4 medium; +1 for police = 5 high
        assert_eq!(severity_for(&event("Riots", 1, "local police")), "high");
        assert_eq!(severity_for(&event("Riots", 1, "residents")), "medium");
    }

    #[test]
    fn category_maps_event_types() {
        assert_eq!(category_for("Battles"), "conflict");
        assert_eq!(category_for("Protests"), "political");
        assert_eq!(category_for("Strategic developments"), "military");
        assert_eq!(category_for("Something new"), "conflict");
    }

    #[test]
    fn string_fatalities_parse() {
        let mut e = event("Battles", 0, "army");
        e.fatalities = serde_json::json!("12");
        assert_eq!(e.fatalities_count(), 12);
    }
}
