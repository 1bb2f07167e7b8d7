// Corporate-filings adapter over SEC EDGAR.
// Upstream policy REQUIRES a User-Agent identifying a contact email.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use vantage_common::{clean_text, truncate_text, CollectedItem};

use crate::adapter::{status_error, CollectError, SourceAdapter};
use crate::sources::{API_TIMEOUT_SECS, SEC_FORM_TYPES};

const BROWSE_API: &str = "https://www.sec.gov/cgi-bin/browse-edgar";

pub struct SecEdgarAdapter {
    client: reqwest::Client,
    contact_email: String,
    max_items: usize,
}

impl SecEdgarAdapter {
    pub fn new(contact_email: &str) -> Self {
        // SEC rejects anonymous agents; identify ourselves per their policy.
        let user_agent = format!("vantage-collect/0.1 ({contact_email})");
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent(user_agent)
            .build()
            .expect("Failed to build SEC HTTP client");
        Self {
            client,
            contact_email: contact_email.to_string(),
            max_items: 40,
        }
    }

    async fn fetch_form(&self, form_type: &str, category: &str) -> Result<Vec<CollectedItem>, CollectError> {
        debug!(form_type, "fetching recent SEC filings");

        let resp = self
            .client
            .get(BROWSE_API)
            .query(&[
                ("action", "getcurrent"),
                ("type", form_type),
                ("company", ""),
                ("dateb", ""),
                ("owner", "include"),
                ("count", &self.max_items.to_string()),
                ("output", "atom"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(
                status.as_u16(),
                format!("form {form_type} returned {status}"),
            ));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| CollectError::Network(e.to_string()))?;
        let feed = feed_rs::parser::parse(&bytes[..])
            .map_err(|e| CollectError::Parse(format!("{form_type}: {e}")))?;

        let items = feed
            .entries
            .into_iter()
            .filter_map(|entry| {
                let url = entry.links.first().map(|l| l.href.clone())?;
                let title = entry
                    .title
                    .map(|t| clean_text(&t.content))
                    .unwrap_or_else(|| format!("{form_type} Filing"));
                let summary = entry
                    .summary
                    .map(|s| clean_text(&s.content))
                    .unwrap_or_else(|| form_description(form_type).to_string());
                let published = entry
                    .updated
                    .or(entry.published)
                    .map(|dt| dt.with_timezone(&Utc));

                Some(CollectedItem {
                    source: "sec_edgar".to_string(),
                    source_name: "SEC EDGAR".to_string(),
                    source_url: "https://www.sec.gov/edgar".to_string(),
                    category: category.to_string(),
                    title,
                    summary: truncate_text(&summary, 500),
                    url,
                    published,
                    author: String::new(),
                    metadata: serde_json::json!({
                        "form_type": form_type,
                        "description": form_description(form_type),
                    }),
                    raw_content: String::new(),
                })
            })
            .collect::<Vec<_>>();

        debug!(form_type, items = items.len(), "SEC form fetched");
        Ok(items)
    }
}

/// Human description of a form type, for summaries.
pub fn form_description(form_type: &str) -> &'static str {
    match form_type {
        "8-K" => "Current report of material events",
        "10-K" => "Annual report",
        "10-Q" => "Quarterly report",
        "13-F" => "Institutional investment holdings",
        "4" => "Insider trading disclosure",
        "S-1" => "Initial registration statement",
        "SC 13D" => "Beneficial ownership report (active)",
        "SC 13G" => "Beneficial ownership report (passive)",
        _ => "SEC filing",
    }
}

/// Index page URL for a filing, from CIK + accession number.
pub fn filing_index_url(cik: &str, accession_number: &str) -> String {
    let cik_padded = cik.trim_start_matches('0');
    let acc_clean = accession_number.replace('-', "");
    format!(
        "https://www.sec.gov/Archives/edgar/data/{cik_padded}/{acc_clean}/{accession_number}-index.htm"
    )
}

#[async_trait]
impl SourceAdapter for SecEdgarAdapter {
    fn name(&self) -> &str {
        "SEC EDGAR"
    }

    fn source_type(&self) -> &str {
        "sec_edgar"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, CollectError> {
        if self.contact_email.is_empty() {
            warn!("SEC contact email not configured, skipping run");
            return Ok(vec![]);
        }

        let mut all_items = Vec::new();
        for (form_type, category) in SEC_FORM_TYPES {
            match self.fetch_form(form_type, category).await {
                Ok(items) => all_items.extend(items),
                Err(e) => warn!(form_type = %form_type, error = %e, "SEC form fetch failed"),
            }
        }

        info!(items = all_items.len(), "SEC EDGAR collection complete");
        Ok(all_items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filing_index_url_strips_leading_zeros_and_dashes() {
        let url = filing_index_url("0000320193", "0000320193-26-000005");
        assert_eq!(
            url,
            "https://www.sec.gov/Archives/edgar/data/320193/000032019326000005/0000320193-26-000005-index.htm"
        );
    }

    #[test]
    fn form_descriptions_cover_configured_forms() {
        for (form, _) in SEC_FORM_TYPES {
            assert_ne!(form_description(form), "SEC filing", "{form} missing description");
        }
    }
}
