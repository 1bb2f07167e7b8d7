// Sanctions registry adapter. Bearer token optional; 401 and 429 are
// per-run outcomes, not crashes.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use vantage_common::{truncate_text, CollectedItem};

use crate::adapter::{CollectError, SourceAdapter};
use crate::sources::API_TIMEOUT_SECS;

const API_BASE: &str = "https://api.opensanctions.org";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SanctionedEntity>,
}

#[derive(Debug, Deserialize)]
pub struct SanctionedEntity {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub datasets: Vec<String>,
    #[serde(default)]
    pub properties: serde_json::Value,
}

pub struct OpenSanctionsAdapter {
    client: reqwest::Client,
    api_key: String,
    datasets: Vec<String>,
    max_items: usize,
}

impl OpenSanctionsAdapter {
    pub fn new(api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent("vantage-collect/0.1")
            .build()
            .expect("Failed to build OpenSanctions HTTP client");
        Self {
            client,
            api_key: api_key.to_string(),
            datasets: vec!["default".to_string()],
            max_items: 100,
        }
    }

    async fn fetch_dataset(&self, dataset: &str) -> Result<Vec<CollectedItem>, CollectError> {
        debug!(dataset, "querying sanctions dataset");

        let mut request = self
            .client
            .get(format!("{API_BASE}/search/{dataset}"))
            .query(&[("limit", self.max_items.to_string())]);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let resp = request.send().await?;
        let status = resp.status().as_u16();
        match status {
            200 => {}
            401 => {
                return Err(CollectError::Upstream {
                    status: 401,
                    message: "authentication failed; check API key".to_string(),
                })
            }
            429 => return Err(CollectError::RateLimited),
            other => {
                return Err(CollectError::Upstream {
                    status: other,
                    message: format!("dataset {dataset} returned {other}"),
                })
            }
        }

        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| CollectError::Parse(e.to_string()))?;

        let items = body
            .results
            .into_iter()
            .filter(|e| !e.id.is_empty())
            .map(|entity| {
                let category = category_for(&entity);
                let title = build_title(&entity);
                let summary = build_summary(&entity);
                let url = format!("https://www.opensanctions.org/entities/{}/", entity.id);

                CollectedItem {
                    source: "opensanctions".to_string(),
                    source_name: "OpenSanctions".to_string(),
                    source_url: API_BASE.to_string(),
                    category: category.to_string(),
                    title,
                    summary: truncate_text(&summary, 500),
                    url,
                    published: None,
                    author: String::new(),
                    metadata: serde_json::json!({
                        "entity_id": entity.id,
                        "schema": entity.schema,
                        "datasets": entity.datasets,
                    }),
                    raw_content: summary,
                }
            })
            .collect::<Vec<_>>();

        Ok(items)
    }
}

/// Category from entity schema and datasets.
pub fn category_for(entity: &SanctionedEntity) -> &'static str {
    if entity.schema.to_lowercase().contains("person") {
        let props = &entity.properties;
        if props.get("position").is_some() || props.get("political").is_some() {
            return "pep";
        }
    }

    for dataset in &entity.datasets {
        let lower = dataset.to_lowercase();
        if lower.contains("sanction") || lower.contains("ofac") {
            return "sanctions";
        }
        if lower.contains("pep") || lower.contains("politically") {
            return "pep";
        }
        if lower.contains("crime") || lower.contains("interpol") {
            return "crime";
        }
    }
    "sanctions"
}

pub fn build_title(entity: &SanctionedEntity) -> String {
    let caption = if entity.caption.is_empty() {
        "Unknown Entity"
    } else {
        &entity.caption
    };
    let primary_dataset = entity
        .datasets
        .first()
        .map(String::as_str)
        .unwrap_or("Unknown Source");
    format!("{caption} ({}) - {primary_dataset}", entity.schema)
}

fn first_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(arr) => arr.first().and_then(first_string),
        _ => None,
    }
}

pub fn build_summary(entity: &SanctionedEntity) -> String {
    let props = &entity.properties;
    let mut parts = Vec::new();

    if let Some(desc) = props.get("description").and_then(first_string) {
        parts.push(desc);
    }
    if let Some(notes) = props.get("notes").and_then(first_string) {
        parts.push(notes);
    }
    if let Some(reason) = props.get("reason").and_then(first_string) {
        parts.push(format!("Reason: {reason}"));
    }
    if let Some(serde_json::Value::Array(programs)) = props.get("program") {
        let joined: Vec<&str> = programs.iter().filter_map(|p| p.as_str()).collect();
        if !joined.is_empty() {
            parts.push(format!("Program: {}", joined.join(", ")));
        }
    }
    if let Some(serde_json::Value::Array(countries)) = props.get("country") {
        let joined: Vec<&str> = countries.iter().filter_map(|c| c.as_str()).take(3).collect();
        if !joined.is_empty() {
            parts.push(format!("Country: {}", joined.join(", ")));
        }
    }

    if parts.is_empty() {
        parts.push(format!("Entity listed in {} dataset(s)", entity.datasets.len()));
    }
    parts.join(" | ")
}

#[async_trait]
impl SourceAdapter for OpenSanctionsAdapter {
    fn name(&self) -> &str {
        "OpenSanctions"
    }

    fn source_type(&self) -> &str {
        "opensanctions"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, CollectError> {
        if self.api_key.is_empty() {
            warn!("OpenSanctions API key not configured, skipping run");
            return Ok(vec![]);
        }

        let mut items = Vec::new();
        for dataset in &self.datasets {
            items.extend(self.fetch_dataset(dataset).await?);
        }

        info!(items = items.len(), "OpenSanctions collection complete");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(schema: &str, datasets: &[&str], properties: serde_json::Value) -> SanctionedEntity {
        SanctionedEntity {
            id: "NK-abc123".to_string(),
            caption: "Test Person".to_string(),
            schema: schema.to_string(),
            datasets: datasets.iter().map(|s| s.to_string()).collect(),
            properties,
        }
    }

    #[test]
    fn person_with_position_is_pep() {
        let e = entity(
            "Person",
            &["some_list"],
            serde_json::json!({"position": ["Minister of Defense"]}),
        );
        assert_eq!(category_for(&e), "pep");
    }

    #[test]
    fn ofac_dataset_is_sanctions() {
        let e = entity("Company", &["us_ofac_sdn"], serde_json::json!({}));
        assert_eq!(category_for(&e), "sanctions");
    }

    #[test]
    fn interpol_dataset_is_crime() {
        let e = entity("Company", &["interpol_red_notices"], serde_json::json!({}));
        assert_eq!(category_for(&e), "crime");
    }

    #[test]
    fn title_includes_schema_and_dataset() {
        let e = entity("Person", &["eu_fsf"], serde_json::json!({}));
        assert_eq!(build_title(&e), "Test Person (Person) - eu_fsf");
    }

    #[test]
    fn summary_joins_property_parts() {
        let e = entity(
            "Person",
            &["eu_fsf"],
            serde_json::json!({
                "reason": ["arms trafficking"],
                "country": ["ru", "by"],
            }),
        );
        let summary = build_summary(&e);
        assert!(summary.contains("Reason: arms trafficking"));
        assert!(summary.contains("Country: ru, by"));
    }

    #[test]
    fn summary_falls_back_to_dataset_count() {
        let e = entity("Company", &["a", "b"], serde_json::json!({}));
        assert_eq!(build_summary(&e), "Entity listed in 2 dataset(s)");
    }
}
