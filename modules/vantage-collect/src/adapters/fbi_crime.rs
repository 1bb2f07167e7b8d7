// National/state crime statistics adapter over the FBI Crime Data Explorer.
// Requires a free api.usa.gov key; skips the run when unconfigured.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, TimeZone, Utc};
use tracing::{debug, info, warn};

use vantage_common::CollectedItem;

use crate::adapter::{status_error, CollectError, SourceAdapter};
use crate::sources::API_TIMEOUT_SECS;

const API_BASE: &str = "https://api.usa.gov/crime/fbi/cde";

const OFFENSE_CATEGORIES: &[&str] = &[
    "violent-crime",
    "property-crime",
    "homicide",
    "robbery",
    "aggravated-assault",
    "burglary",
    "larceny",
    "motor-vehicle-theft",
    "arson",
];

const DEFAULT_STATES: &[&str] = &["GA", "TN", "CA", "TX", "FL", "NY"];

pub struct FbiCrimeAdapter {
    client: reqwest::Client,
    api_key: String,
    states: Vec<&'static str>,
    years_back: i32,
}

impl FbiCrimeAdapter {
    pub fn new(api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent("vantage-collect/0.1")
            .build()
            .expect("Failed to build FBI CDE HTTP client");
        Self {
            client,
            api_key: api_key.to_string(),
            states: DEFAULT_STATES.to_vec(),
            years_back: 3,
        }
    }

    async fn fetch_estimates(
        &self,
        path: &str,
        from_year: i32,
        to_year: i32,
    ) -> Result<serde_json::Value, CollectError> {
        let resp = self
            .client
            .get(format!("{API_BASE}/estimate/{path}"))
            .query(&[
                ("from", from_year.to_string()),
                ("to", to_year.to_string()),
                ("API_KEY", self.api_key.clone()),
            ])
            .send()
            .await?;

        let status = resp.status().as_u16();
        match status {
            200 => {}
            401 => {
                return Err(CollectError::Upstream {
                    status: 401,
                    message: "FBI CDE API key invalid".to_string(),
                })
            }
            429 => return Err(CollectError::RateLimited),
            other => return Err(status_error(other, format!("{path} returned {other}"))),
        }

        resp.json()
            .await
            .map_err(|e| CollectError::Parse(e.to_string()))
    }
}

/// Pick the most recent year's entry from whatever shape the API returned
/// (results array, data array, or a bare array).
pub fn latest_entry(data: &serde_json::Value) -> Option<&serde_json::Value> {
    let entries = data
        .get("results")
        .and_then(|v| v.as_array())
        .or_else(|| data.get("data").and_then(|v| v.as_array()))
        .or_else(|| data.as_array())?;

    entries
        .iter()
        .filter(|e| entry_year(e).is_some())
        .max_by_key(|e| entry_year(e).unwrap_or(0))
}

fn entry_year(entry: &serde_json::Value) -> Option<i64> {
    entry
        .get("year")
        .or_else(|| entry.get("data_year"))
        .and_then(|v| v.as_i64())
}

fn entry_count(entry: &serde_json::Value) -> i64 {
    ["value", "actual", "count"]
        .iter()
        .find_map(|k| entry.get(k).and_then(|v| v.as_i64()))
        .unwrap_or(0)
}

fn entry_rate(entry: &serde_json::Value) -> Option<f64> {
    ["rate", "rate_per_100k"]
        .iter()
        .find_map(|k| entry.get(k).and_then(|v| v.as_f64()))
}

pub fn format_offense_name(offense: &str) -> String {
    offense
        .split('-')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn estimate_to_item(
    offense: &str,
    jurisdiction: Option<&str>,
    data: &serde_json::Value,
    fallback_year: i32,
) -> Option<CollectedItem> {
    let latest = latest_entry(data)?;
    let year = entry_year(latest).unwrap_or(fallback_year as i64);
    let count = entry_count(latest);
    let rate = entry_rate(latest);

    let offense_name = format_offense_name(offense);
    let (title, jurisdiction_label) = match jurisdiction {
        Some(state) => (
            format!("{state} {offense_name} Statistics ({year})"),
            state.to_string(),
        ),
        None => (
            format!("National {offense_name} Statistics ({year})"),
            "United States".to_string(),
        ),
    };

    let mut summary = format!("{offense_name}: {count} incidents");
    if let Some(rate) = rate {
        summary.push_str(&format!(" ({rate:.1} per 100,000)"));
    }

    let published = Utc
        .with_ymd_and_hms(year as i32, 12, 31, 0, 0, 0)
        .single();

    Some(CollectedItem {
        source: "fbi_crime".to_string(),
        source_name: "FBI Crime Data Explorer".to_string(),
        source_url: API_BASE.to_string(),
        category: "crime_national".to_string(),
        title,
        summary,
        url: format!("https://cde.ucr.cjis.gov/#{jurisdiction_label}-{offense}-{year}"),
        published,
        author: String::new(),
        metadata: serde_json::json!({
            "year": year,
            "jurisdiction": jurisdiction_label,
            "jurisdiction_level": if jurisdiction.is_some() { "state" } else { "national" },
            "offense_type": offense,
            "count": count,
            "rate_per_100k": rate,
        }),
        raw_content: String::new(),
    })
}

#[async_trait]
impl SourceAdapter for FbiCrimeAdapter {
    fn name(&self) -> &str {
        "FBI Crime Data"
    }

    fn source_type(&self) -> &str {
        "fbi_crime"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, CollectError> {
        if self.api_key.is_empty() {
            warn!("FBI CDE API key not configured, skipping run");
            return Ok(vec![]);
        }

        // Published estimates lag the calendar year.
        let end_year = Utc::now().year() - 1;
        let start_year = end_year - self.years_back + 1;
        debug!(start_year, end_year, "querying FBI crime estimates");

        let mut items = Vec::new();

        for offense in OFFENSE_CATEGORIES {
            match self
                .fetch_estimates(&format!("national/{offense}"), start_year, end_year)
                .await
            {
                Ok(data) => {
                    if let Some(item) = estimate_to_item(offense, None, &data, end_year) {
                        items.push(item);
                    }
                }
                Err(CollectError::RateLimited) => return Err(CollectError::RateLimited),
                Err(e) => debug!(offense = %offense, error = %e, "national estimate failed"),
            }
        }

        // State-level pulls only for the headline offenses.
        for state in &self.states {
            for offense in &OFFENSE_CATEGORIES[..2] {
                match self
                    .fetch_estimates(&format!("state/{state}/{offense}"), start_year, end_year)
                    .await
                {
                    Ok(data) => {
                        if let Some(item) =
                            estimate_to_item(offense, Some(*state), &data, end_year)
                        {
                            items.push(item);
                        }
                    }
                    Err(CollectError::RateLimited) => return Err(CollectError::RateLimited),
                    Err(e) => debug!(state = %state, offense = %offense, error = %e, "state estimate failed"),
                }
            }
        }

        info!(items = items.len(), "FBI crime collection complete");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_entry_picks_most_recent_year() {
        let data = serde_json::json!({
            "results": [
                {"year": 2023, "actual": 100},
                {"year": 2025, "actual": 300},
                {"year": 2024, "actual": 200},
            ]
        });
        let latest = latest_entry(&data).unwrap();
        assert_eq!(entry_year(latest), Some(2025));
        assert_eq!(entry_count(latest), 300);
    }

    #[test]
    fn latest_entry_handles_data_year_field_and_bare_arrays() {
        let data = serde_json::json!([
            {"data_year": 2024, "count": 7},
            {"data_year": 2022, "count": 5},
        ]);
        let latest = latest_entry(&data).unwrap();
        assert_eq!(entry_year(latest), Some(2024));
    }

    #[test]
    fn offense_slug_formats_to_title_case() {
        assert_eq!(format_offense_name("violent-crime"), "Violent Crime");
        assert_eq!(
            format_offense_name("motor-vehicle-theft"),
            "Motor Vehicle Theft"
        );
    }

    #[test]
    fn estimate_item_carries_rate_when_present() {
        let data = serde_json::json!({
            "results": [{"year": 2025, "actual": 1200, "rate": 36.4}]
        });
        let item = estimate_to_item("robbery", Some("GA"), &data, 2025).unwrap();
        assert!(item.title.starts_with("GA Robbery Statistics"));
        assert!(item.summary.contains("1200 incidents"));
        assert!(item.summary.contains("36.4 per 100,000"));
        assert_eq!(item.category, "crime_national");
    }

    #[test]
    fn empty_results_yield_no_item() {
        let data = serde_json::json!({"results": []});
        assert!(estimate_to_item("arson", None, &data, 2025).is_none());
    }
}
