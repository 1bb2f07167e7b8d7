// EU crime-statistics adapter over the Eurostat SDMX dissemination API.
// Responses are JSON-stat: a flat value map keyed by linear index over the
// dimension grid, decoded here into (offense, country, year) observations.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use vantage_common::CollectedItem;

use crate::adapter::{status_error, CollectError, SourceAdapter};
use crate::sources::API_TIMEOUT_SECS;

const API_BASE: &str = "https://ec.europa.eu/eurostat/api/dissemination/sdmx/2.1";

/// Crime statistics datasets: (code, description).
const DATASETS: &[(&str, &str)] = &[
    ("crim_off_cat", "Recorded offences by offence category"),
    ("crim_hom_soff", "Intentional homicide"),
];

const EU_COUNTRIES: &[&str] = &[
    "DE", "FR", "IT", "ES", "PL", "NL", "BE", "SE", "AT", "EU27_2020",
];

/// ICCS offense classification codes.
const OFFENSE_CATEGORIES: &[(&str, &str)] = &[
    ("ICCS0101", "Intentional homicide"),
    ("ICCS0201", "Assault"),
    ("ICCS0301", "Sexual violence"),
    ("ICCS0401", "Robbery"),
    ("ICCS0501", "Burglary"),
    ("ICCS0502", "Theft"),
    ("ICCS0601", "Fraud"),
];

#[derive(Debug, Deserialize)]
struct JsonStat {
    #[serde(default)]
    id: Vec<String>,
    #[serde(default)]
    size: Vec<usize>,
    #[serde(default)]
    dimension: HashMap<String, Dimension>,
    #[serde(default)]
    value: HashMap<String, f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Dimension {
    #[serde(default)]
    category: Category,
}

#[derive(Debug, Default, Deserialize)]
struct Category {
    #[serde(default)]
    index: HashMap<String, usize>,
    #[serde(default)]
    label: HashMap<String, String>,
}

/// One decoded data point.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub country_code: String,
    pub country_name: String,
    pub offense_code: String,
    pub year: i32,
    pub count: i64,
}

fn offense_name(code: &str) -> &str {
    OFFENSE_CATEGORIES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or(code)
}

/// Decode the JSON-stat linear value map into observations. The linear
/// index is row-major over `size` in `id` dimension order.
fn decode_observations(stat: &JsonStat) -> Vec<Observation> {
    if stat.id.len() != stat.size.len() || stat.id.is_empty() {
        return vec![];
    }

    // Reverse lookup per dimension: position -> code.
    let mut code_by_position: HashMap<&str, HashMap<usize, &str>> = HashMap::new();
    for dim_id in &stat.id {
        let Some(dimension) = stat.dimension.get(dim_id) else {
            continue;
        };
        let reverse: HashMap<usize, &str> = dimension
            .category
            .index
            .iter()
            .map(|(code, position)| (*position, code.as_str()))
            .collect();
        code_by_position.insert(dim_id.as_str(), reverse);
    }

    let geo_labels = stat
        .dimension
        .get("geo")
        .map(|d| &d.category.label);

    let mut observations = Vec::new();
    for (key, value) in &stat.value {
        let Ok(mut linear) = key.parse::<usize>() else {
            continue;
        };
        if *value <= 0.0 {
            continue;
        }

        // Decode right-to-left: the last dimension varies fastest.
        let mut coordinates = vec![0usize; stat.size.len()];
        for position in (0..stat.size.len()).rev() {
            let size = stat.size[position].max(1);
            coordinates[position] = linear % size;
            linear /= size;
        }

        let mut country_code = String::new();
        let mut offense_code = String::new();
        let mut year = 0i32;
        for (dim_position, dim_id) in stat.id.iter().enumerate() {
            let code = code_by_position
                .get(dim_id.as_str())
                .and_then(|reverse| reverse.get(&coordinates[dim_position]))
                .copied()
                .unwrap_or("");
            match dim_id.as_str() {
                "geo" => country_code = code.to_string(),
                "iccs" => offense_code = code.to_string(),
                "time" => year = code.parse().unwrap_or(0),
                _ => {}
            }
        }

        if country_code.is_empty() || year == 0 {
            continue;
        }
        let country_name = geo_labels
            .and_then(|labels| labels.get(&country_code))
            .cloned()
            .unwrap_or_else(|| country_code.clone());

        observations.push(Observation {
            country_code,
            country_name,
            offense_code,
            year,
            count: *value as i64,
        });
    }

    observations
}

pub struct EurostatAdapter {
    client: reqwest::Client,
    countries: Vec<&'static str>,
    years_back: i32,
}

impl EurostatAdapter {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent("vantage-collect/0.1")
            .build()
            .expect("Failed to build Eurostat HTTP client");
        Self {
            client,
            countries: EU_COUNTRIES.to_vec(),
            years_back: 3,
        }
    }

    async fn fetch_dataset(&self, dataset: &str) -> Result<Vec<Observation>, CollectError> {
        // Published figures lag one to two years.
        let end_year = Utc::now().year() - 1;
        let start_year = end_year - self.years_back + 1;
        debug!(dataset, start_year, end_year, "querying Eurostat");

        let resp = self
            .client
            .get(format!("{API_BASE}/data/{dataset}"))
            .query(&[
                ("format", "JSON".to_string()),
                ("geo", self.countries.join("+")),
                ("startPeriod", start_year.to_string()),
                ("endPeriod", end_year.to_string()),
            ])
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(
                status.as_u16(),
                format!("dataset {dataset} returned {status}"),
            ));
        }

        let stat: JsonStat = resp
            .json()
            .await
            .map_err(|e| CollectError::Parse(format!("{dataset}: {e}")))?;
        Ok(decode_observations(&stat))
    }
}

impl Default for EurostatAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for EurostatAdapter {
    fn name(&self) -> &str {
        "Eurostat Crime Statistics"
    }

    fn source_type(&self) -> &str {
        "eurostat"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, CollectError> {
        let mut items = Vec::new();

        for (dataset, description) in DATASETS {
            let observations = match self.fetch_dataset(dataset).await {
                Ok(observations) => observations,
                Err(e) => {
                    warn!(dataset = %dataset, error = %e, "Eurostat dataset failed");
                    continue;
                }
            };

            for obs in observations {
                let offense = offense_name(&obs.offense_code);
                let title = format!(
                    "EU Crime: {} - {offense} ({})",
                    obs.country_name, obs.year
                );
                let summary = format!("{} recorded offenses", obs.count);

                items.push(CollectedItem {
                    source: "eurostat".to_string(),
                    source_name: "Eurostat Crime Statistics".to_string(),
                    source_url: API_BASE.to_string(),
                    category: "crime_international".to_string(),
                    title,
                    summary,
                    url: format!(
                        "https://ec.europa.eu/eurostat/databrowser/view/{dataset}/?geo={}&time={}",
                        obs.country_code, obs.year
                    ),
                    published: Utc
                        .with_ymd_and_hms(obs.year, 12, 31, 0, 0, 0)
                        .single(),
                    author: String::new(),
                    metadata: serde_json::json!({
                        "dataset": dataset,
                        "dataset_description": description,
                        "country": obs.country_name,
                        "country_code": obs.country_code,
                        "year": obs.year,
                        "offense_code": obs.offense_code,
                        "offense_type": offense,
                        "count": obs.count,
                    }),
                    raw_content: String::new(),
                });
            }
        }

        info!(items = items.len(), "Eurostat collection complete");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stat() -> JsonStat {
        // 2 countries x 2 years; linear index is row-major, time fastest.
        serde_json::from_value(serde_json::json!({
            "id": ["geo", "time"],
            "size": [2, 2],
            "dimension": {
                "geo": {
                    "category": {
                        "index": {"DE": 0, "FR": 1},
                        "label": {"DE": "Germany", "FR": "France"}
                    }
                },
                "time": {
                    "category": {
                        "index": {"2024": 0, "2025": 1},
                        "label": {}
                    }
                }
            },
            "value": {"0": 100.0, "1": 120.0, "3": 90.0}
        }))
        .unwrap()
    }

    #[test]
    fn linear_index_decodes_to_country_and_year() {
        let mut observations = decode_observations(&sample_stat());
        observations.sort_by_key(|o| (o.country_code.clone(), o.year));

        assert_eq!(observations.len(), 3);
        assert_eq!(observations[0].country_name, "Germany");
        assert_eq!(observations[0].year, 2024);
        assert_eq!(observations[0].count, 100);
        assert_eq!(observations[1].year, 2025);
        assert_eq!(observations[1].count, 120);
        // index 3 = FR (1) x 2025 (1)
        assert_eq!(observations[2].country_code, "FR");
        assert_eq!(observations[2].year, 2025);
        assert_eq!(observations[2].count, 90);
    }

    #[test]
    fn zero_values_and_bad_keys_are_skipped() {
        let mut stat = sample_stat();
        stat.value.insert("2".to_string(), 0.0);
        stat.value.insert("junk".to_string(), 50.0);
        let observations = decode_observations(&stat);
        assert_eq!(observations.len(), 3);
    }

    #[test]
    fn mismatched_dimensions_yield_nothing() {
        let mut stat = sample_stat();
        stat.size = vec![2];
        assert!(decode_observations(&stat).is_empty());
    }

    #[test]
    fn offense_codes_resolve_to_names() {
        assert_eq!(offense_name("ICCS0401"), "Robbery");
        assert_eq!(offense_name("ICCS9999"), "ICCS9999");
    }
}
