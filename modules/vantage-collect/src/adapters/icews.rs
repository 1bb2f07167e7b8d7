// ICEWS political-event adapter. The event archive lives on Harvard
// Dataverse as registration-gated tab-delimited exports; this adapter
// probes the Dataverse catalog for freshness and reads a locally staged
// file, skipping the run when none is configured.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use vantage_common::{clean_text, truncate_text, CollectedItem};

use crate::adapter::{CollectError, SourceAdapter};
use crate::sources::API_TIMEOUT_SECS;

const DATAVERSE_API: &str = "https://dataverse.harvard.edu/api";
const INFO_URL: &str = "https://dataverse.harvard.edu/dataverse/icews";
const MAX_EVENTS: usize = 100;

/// CAMEO top-level event categories.
const CAMEO_CATEGORIES: &[(&str, &str)] = &[
    ("01", "Make public statement"),
    ("02", "Appeal"),
    ("03", "Express intent to cooperate"),
    ("04", "Consult"),
    ("05", "Engage in diplomatic cooperation"),
    ("06", "Engage in material cooperation"),
    ("07", "Provide aid"),
    ("08", "Yield"),
    ("09", "Investigate"),
    ("10", "Demand"),
    ("11", "Disapprove"),
    ("12", "Reject"),
    ("13", "Threaten"),
    ("14", "Protest"),
    ("15", "Exhibit military posture"),
    ("16", "Reduce relations"),
    ("17", "Coerce"),
    ("18", "Assault"),
    ("19", "Fight"),
    ("20", "Engage in unconventional mass violence"),
];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: SearchData,
}

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    name: String,
}

pub struct IcewsAdapter {
    client: reqwest::Client,
    data_file: String,
    days_back: i64,
}

impl IcewsAdapter {
    pub fn new(data_file: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent("vantage-collect/0.1")
            .build()
            .expect("Failed to build Dataverse HTTP client");
        Self {
            client,
            data_file: data_file.to_string(),
            days_back: 30,
        }
    }

    /// Log the newest catalog entry so operators notice stale local files.
    async fn probe_catalog(&self) {
        let result = self
            .client
            .get(format!("{DATAVERSE_API}/search"))
            .query(&[
                ("q", "ICEWS"),
                ("type", "dataset"),
                ("subtree", "icews"),
                ("per_page", "5"),
                ("sort", "date"),
                ("order", "desc"),
            ])
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                if let Ok(body) = resp.json::<SearchResponse>().await {
                    if let Some(latest) = body.data.items.first() {
                        info!(dataset = %latest.name, "latest ICEWS catalog entry");
                    }
                }
            }
            Ok(resp) => debug!(status = resp.status().as_u16(), "Dataverse probe rejected"),
            Err(e) => debug!(error = %e, "Dataverse probe failed"),
        }
    }

    fn parse_event(
        &self,
        row: &csv::StringRecord,
        headers: &csv::StringRecord,
    ) -> Option<CollectedItem> {
        let field = |name: &str| -> &str {
            headers
                .iter()
                .position(|h| h == name)
                .and_then(|i| row.get(i))
                .unwrap_or("")
        };

        let event_id = field("Event ID").to_string();
        if event_id.is_empty() {
            return None;
        }

        let published = parse_event_date(field("Event Date"));
        let source_actor = field("Source Name").to_string();
        let source_country = field("Source Country").to_string();
        let target_actor = field("Target Name").to_string();
        let target_country = field("Target Country").to_string();
        let event_text = field("Event Text").to_string();
        let cameo_code = field("CAMEO Code").to_string();
        let intensity: f64 = field("Intensity").parse().unwrap_or(0.0);

        let event_type = cameo_category(&cameo_code);

        let title = if !source_actor.is_empty() && !target_actor.is_empty() {
            format!("{source_actor} -> {target_actor}: {event_type}")
        } else {
            let place = if source_country.is_empty() {
                "Unknown"
            } else {
                source_country.as_str()
            };
            format!("{event_type}: {place}")
        };

        let mut summary = if event_text.is_empty() {
            title.clone()
        } else {
            event_text.clone()
        };
        if intensity != 0.0 {
            let label = if intensity > 0.0 {
                "cooperative"
            } else {
                "conflictual"
            };
            summary.push_str(&format!(" (Intensity: {intensity:.1}, {label})"));
        }

        Some(CollectedItem {
            source: "icews".to_string(),
            source_name: "ICEWS Early Warning".to_string(),
            source_url: INFO_URL.to_string(),
            category: "geopolitics".to_string(),
            title: clean_text(&title).chars().take(200).collect(),
            summary: truncate_text(&summary, 500),
            url: format!("{INFO_URL}#{event_id}"),
            published,
            author: String::new(),
            metadata: serde_json::json!({
                "event_id": event_id,
                "source_actor": source_actor,
                "source_country": source_country,
                "target_actor": target_actor,
                "target_country": target_country,
                "cameo_code": cameo_code,
                "event_type": event_type,
                "intensity": intensity,
            }),
            raw_content: event_text,
        })
    }
}

/// Event type from the top two digits of the CAMEO code.
fn cameo_category(code: &str) -> &'static str {
    if let Some(top) = code.get(..2) {
        for (prefix, name) in CAMEO_CATEGORIES {
            if *prefix == top {
                return name;
            }
        }
    }
    "Political Event"
}

fn parse_event_date(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[async_trait]
impl SourceAdapter for IcewsAdapter {
    fn name(&self) -> &str {
        "ICEWS"
    }

    fn source_type(&self) -> &str {
        "icews"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, CollectError> {
        self.probe_catalog().await;

        if self.data_file.is_empty() {
            warn!("no ICEWS data file configured, skipping run (download from Dataverse)");
            return Ok(vec![]);
        }

        let path = self.data_file.clone();
        let cutoff = Utc::now() - chrono::Duration::days(self.days_back);
        let parse = move || -> Result<Vec<csv::StringRecord>, CollectError> {
            // ICEWS exports are tab-delimited.
            let mut reader = csv::ReaderBuilder::new()
                .delimiter(b'\t')
                .flexible(true)
                .from_path(&path)
                .map_err(|e| CollectError::Parse(format!("ICEWS file: {e}")))?;
            let headers = reader
                .headers()
                .map_err(|e| CollectError::Parse(e.to_string()))?
                .clone();
            let date_index = headers.iter().position(|h| h == "Event Date");

            let mut rows = vec![headers];
            for record in reader.records() {
                let record = record.map_err(|e| CollectError::Parse(e.to_string()))?;
                if let Some(date) = date_index
                    .and_then(|i| record.get(i))
                    .and_then(parse_event_date)
                {
                    if date < cutoff {
                        continue;
                    }
                }
                rows.push(record);
                if rows.len() > MAX_EVENTS {
                    break;
                }
            }
            Ok(rows)
        };

        let rows = tokio::task::spawn_blocking(parse)
            .await
            .map_err(|e| CollectError::Parse(e.to_string()))??;

        let Some((headers, records)) = rows.split_first() else {
            return Ok(vec![]);
        };
        let items: Vec<CollectedItem> = records
            .iter()
            .filter_map(|record| self.parse_event(record, headers))
            .collect();

        info!(items = items.len(), "ICEWS collection complete");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> csv::StringRecord {
        csv::StringRecord::from(vec![
            "Event ID", "Event Date", "Source Name", "Source Country", "Target Name",
            "Target Country", "Event Text", "CAMEO Code", "Intensity",
        ])
    }

    #[test]
    fn event_row_parses_with_cameo_lookup() {
        let adapter = IcewsAdapter::new("/tmp/icews.tsv");
        let row = csv::StringRecord::from(vec![
            "9912345", "2026-07-02", "Russia", "Russia", "Ukraine", "Ukraine",
            "Use conventional military force", "19", "-10.0",
        ]);
        let item = adapter.parse_event(&row, &headers()).unwrap();
        assert_eq!(item.title, "Russia -> Ukraine: Fight");
        assert!(item.summary.contains("conflictual"));
        assert_eq!(item.category, "geopolitics");
        assert_eq!(item.metadata["cameo_code"], "19");
    }

    #[test]
    fn cameo_prefix_drives_event_type() {
        assert_eq!(cameo_category("1823"), "Assault");
        assert_eq!(cameo_category("07"), "Provide aid");
        assert_eq!(cameo_category(""), "Political Event");
        assert_eq!(cameo_category("99"), "Political Event");
    }

    #[test]
    fn missing_event_id_is_dropped() {
        let adapter = IcewsAdapter::new("/tmp/icews.tsv");
        let row = csv::StringRecord::from(vec!["", "2026-07-02", "", "", "", "", "", "", ""]);
        assert!(adapter.parse_event(&row, &headers()).is_none());
    }
}
