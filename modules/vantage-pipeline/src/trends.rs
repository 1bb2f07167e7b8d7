// Rolling trend indicators: current-period counts against a long baseline,
// with direction, alert level, and a per-day sparkline.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use vantage_store::{EntityStore, NewsStore, RunStore};

const STABLE_THRESHOLD: f64 = 5.0;
const ELEVATED_THRESHOLD: f64 = 25.0;
const CRITICAL_THRESHOLD: f64 = 50.0;
const SPARKLINE_DAYS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Normal,
    Elevated,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendIndicator {
    pub name: String,
    pub description: String,
    pub current_value: f64,
    pub baseline_value: f64,
    pub change_percent: f64,
    pub direction: TrendDirection,
    pub alert_level: AlertLevel,
    pub sparkline: Vec<f64>,
    pub last_updated: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendSnapshot {
    pub generated_at: DateTime<Utc>,
    pub period_days: i64,
    pub baseline_days: i64,
    pub indicators: HashMap<String, TrendIndicator>,
    pub summary: String,
    pub overall_status: AlertLevel,
}

/// Category sets per indicator, with source-type proxies for items whose
/// adapter implies the category even when the tag is absent.
struct IndicatorSpec {
    key: &'static str,
    name: &'static str,
    description: &'static str,
    categories: &'static [&'static str],
    source_types: &'static [&'static str],
}

const CATEGORY_INDICATORS: &[IndicatorSpec] = &[
    IndicatorSpec {
        key: "conflict_index",
        name: "Conflict Index",
        description: "Armed conflict, military activity, and security events",
        categories: &[
            "conflict", "military", "violence", "security", "defense", "war", "attack",
            "casualties", "armed_conflict",
        ],
        source_types: &["acled", "gdelt"],
    },
    IndicatorSpec {
        key: "market_volatility",
        name: "Market Volatility",
        description: "Financial, business, and economic event activity",
        categories: &[
            "financial", "market", "business", "economic", "trade", "banking", "investment",
            "commerce",
        ],
        source_types: &["sec_edgar"],
    },
    IndicatorSpec {
        key: "political_instability",
        name: "Political Instability",
        description: "Political turmoil, governance, and election events",
        categories: &[
            "political", "governance", "election", "government", "diplomacy", "policy",
            "legislative", "regulatory",
        ],
        source_types: &[],
    },
    IndicatorSpec {
        key: "tech_activity",
        name: "Tech Activity",
        description: "Technology, AI, and cyber event activity",
        categories: &[
            "tech_ai", "technology", "science", "research", "cyber", "innovation", "digital",
        ],
        source_types: &["arxiv"],
    },
];

pub fn change_percent(current: f64, baseline: f64) -> f64 {
    if baseline == 0.0 {
        if current > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        (current - baseline) / baseline * 100.0
    }
}

pub fn direction_for(change: f64) -> TrendDirection {
    if change > STABLE_THRESHOLD {
        TrendDirection::Rising
    } else if change < -STABLE_THRESHOLD {
        TrendDirection::Falling
    } else {
        TrendDirection::Stable
    }
}

pub fn alert_level_for(change: f64) -> AlertLevel {
    let magnitude = change.abs();
    if magnitude >= CRITICAL_THRESHOLD {
        AlertLevel::Critical
    } else if magnitude >= ELEVATED_THRESHOLD {
        AlertLevel::Elevated
    } else {
        AlertLevel::Normal
    }
}

/// Zero-fill daily counts over the continuous [start, end] date range,
/// keeping the trailing `SPARKLINE_DAYS` points.
pub fn build_sparkline(
    counts: &[(NaiveDate, i64)],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<f64> {
    let by_day: HashMap<NaiveDate, i64> = counts.iter().copied().collect();
    let mut sparkline = Vec::new();
    let mut day = start;
    while day <= end {
        sparkline.push(*by_day.get(&day).unwrap_or(&0) as f64);
        day = day + Duration::days(1);
    }
    let skip = sparkline.len().saturating_sub(SPARKLINE_DAYS);
    sparkline.into_iter().skip(skip).collect()
}

pub struct TrendIndicatorService {
    news: NewsStore,
    runs: RunStore,
    entities: EntityStore,
}

impl TrendIndicatorService {
    pub fn new(news: NewsStore, runs: RunStore, entities: EntityStore) -> Self {
        Self {
            news,
            runs,
            entities,
        }
    }

    /// Compute every indicator over (period_days, baseline_days).
    pub async fn compute_all(
        &self,
        user_id: Option<Uuid>,
        period_days: i64,
        baseline_days: i64,
    ) -> Result<TrendSnapshot> {
        info!(period_days, baseline_days, "computing trend indicators");
        let now = Utc::now();
        let mut indicators = HashMap::new();

        for spec in CATEGORY_INDICATORS {
            let indicator = self
                .category_indicator(spec, period_days, baseline_days, now)
                .await?;
            indicators.insert(spec.key.to_string(), indicator);
        }

        indicators.insert(
            "entity_activity".to_string(),
            self.entity_activity(user_id, period_days, baseline_days, now)
                .await?,
        );
        indicators.insert(
            "collection_health".to_string(),
            self.collection_health(period_days, now).await?,
        );

        let overall_status = indicators
            .values()
            .map(|i| i.alert_level)
            .max()
            .unwrap_or(AlertLevel::Normal);
        let summary = summarize(&indicators);

        info!(status = ?overall_status, "trend indicators computed");
        Ok(TrendSnapshot {
            generated_at: now,
            period_days,
            baseline_days,
            indicators,
            summary,
            overall_status,
        })
    }

    async fn category_indicator(
        &self,
        spec: &IndicatorSpec,
        period_days: i64,
        baseline_days: i64,
        now: DateTime<Utc>,
    ) -> Result<TrendIndicator> {
        let period_start = now - Duration::days(period_days);
        let baseline_start = now - Duration::days(baseline_days);

        let categories: Vec<String> = spec.categories.iter().map(|c| c.to_string()).collect();
        let source_types: Vec<String> = spec.source_types.iter().map(|s| s.to_string()).collect();

        let current = self
            .news
            .count_matching(&categories, &source_types, period_start, now)
            .await? as f64;
        let baseline_total = self
            .news
            .count_matching(&categories, &source_types, baseline_start, now)
            .await? as f64;

        let periods_in_baseline = baseline_days as f64 / period_days as f64;
        let baseline = if periods_in_baseline > 0.0 {
            baseline_total / periods_in_baseline
        } else {
            0.0
        };

        let change = change_percent(current, baseline);
        let daily = self
            .news
            .daily_counts_matching(&categories, &source_types, period_start, now)
            .await?;
        let sparkline = build_sparkline(&daily, period_start.date_naive(), now.date_naive());

        Ok(TrendIndicator {
            name: spec.name.to_string(),
            description: spec.description.to_string(),
            current_value: current,
            baseline_value: baseline,
            change_percent: change,
            direction: direction_for(change),
            alert_level: alert_level_for(change),
            sparkline,
            last_updated: now,
            metadata: serde_json::json!({
                "categories": spec.categories,
                "period_days": period_days,
                "baseline_days": baseline_days,
            }),
        })
    }

    async fn entity_activity(
        &self,
        user_id: Option<Uuid>,
        period_days: i64,
        baseline_days: i64,
        now: DateTime<Utc>,
    ) -> Result<TrendIndicator> {
        let period_start = now - Duration::days(period_days);
        let baseline_start = now - Duration::days(baseline_days);

        let (current, baseline_total, tracked) = match user_id {
            Some(uid) => (
                self.entities.count_mentions_since(uid, period_start).await? as f64,
                self.entities.count_mentions_since(uid, baseline_start).await? as f64,
                self.entities.count_tracked(uid).await?,
            ),
            None => (0.0, 0.0, 0),
        };

        let periods_in_baseline = (baseline_days as f64 / period_days as f64).max(1.0);
        let baseline = baseline_total / periods_in_baseline;
        let change = change_percent(current, baseline);

        Ok(TrendIndicator {
            name: "Entity Activity".to_string(),
            description: "Tracked entity mention frequency".to_string(),
            current_value: current,
            baseline_value: baseline,
            change_percent: change,
            direction: direction_for(change),
            alert_level: alert_level_for(change),
            sparkline: vec![],
            last_updated: now,
            metadata: serde_json::json!({
                "user_id": user_id.map(|u| u.to_string()),
                "tracked_entities": tracked,
                "period_days": period_days,
            }),
        })
    }

    async fn collection_health(
        &self,
        period_days: i64,
        now: DateTime<Utc>,
    ) -> Result<TrendIndicator> {
        let period_start = now - Duration::days(period_days);
        let (successful, total) = self.runs.success_counts_since(period_start).await?;
        let items_collected = self.runs.items_new_since(period_start).await?;

        let success_rate = if total > 0 {
            successful as f64 / total as f64 * 100.0
        } else {
            100.0
        };

        let (alert_level, direction) = if success_rate >= 95.0 {
            (AlertLevel::Normal, TrendDirection::Stable)
        } else if success_rate >= 80.0 {
            (AlertLevel::Elevated, TrendDirection::Falling)
        } else {
            (AlertLevel::Critical, TrendDirection::Falling)
        };

        Ok(TrendIndicator {
            name: "Collection Health".to_string(),
            description: "Data collection system success rate".to_string(),
            current_value: success_rate,
            baseline_value: 95.0,
            change_percent: success_rate - 95.0,
            direction,
            alert_level,
            sparkline: vec![],
            last_updated: now,
            metadata: serde_json::json!({
                "successful_runs": successful,
                "total_runs": total,
                "items_collected": items_collected,
                "period_days": period_days,
            }),
        })
    }
}

/// Summary text: critical and elevated indicators, plus movers beyond 20%.
pub fn summarize(indicators: &HashMap<String, TrendIndicator>) -> String {
    let mut parts = Vec::new();

    let mut critical: Vec<&str> = indicators
        .iter()
        .filter(|(_, i)| i.alert_level == AlertLevel::Critical)
        .map(|(k, _)| k.as_str())
        .collect();
    critical.sort();
    if !critical.is_empty() {
        parts.push(format!("CRITICAL: {} require attention", critical.join(", ")));
    }

    let mut elevated: Vec<&str> = indicators
        .iter()
        .filter(|(_, i)| i.alert_level == AlertLevel::Elevated)
        .map(|(k, _)| k.as_str())
        .collect();
    elevated.sort();
    if !elevated.is_empty() {
        parts.push(format!("ELEVATED: {} above normal", elevated.join(", ")));
    }

    let mut rising: Vec<String> = indicators
        .iter()
        .filter(|(_, i)| i.direction == TrendDirection::Rising && i.change_percent > 20.0)
        .map(|(k, i)| format!("{k} (+{:.0}%)", i.change_percent))
        .collect();
    rising.sort();
    if !rising.is_empty() {
        parts.push(format!("Rising: {}", rising.join(", ")));
    }

    let mut falling: Vec<String> = indicators
        .iter()
        .filter(|(_, i)| i.direction == TrendDirection::Falling && i.change_percent < -20.0)
        .map(|(k, i)| format!("{k} ({:.0}%)", i.change_percent))
        .collect();
    falling.sort();
    if !falling.is_empty() {
        parts.push(format!("Falling: {}", falling.join(", ")));
    }

    if parts.is_empty() {
        "All indicators within normal parameters".to_string()
    } else {
        parts.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indicator(change: f64) -> TrendIndicator {
        TrendIndicator {
            name: "Test".to_string(),
            description: String::new(),
            current_value: 0.0,
            baseline_value: 0.0,
            change_percent: change,
            direction: direction_for(change),
            alert_level: alert_level_for(change),
            sparkline: vec![],
            last_updated: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn change_percent_handles_zero_baseline() {
        assert_eq!(change_percent(5.0, 0.0), 100.0);
        assert_eq!(change_percent(0.0, 0.0), 0.0);
        assert_eq!(change_percent(150.0, 100.0), 50.0);
        assert_eq!(change_percent(50.0, 100.0), -50.0);
    }

    #[test]
    fn direction_thresholds_are_plus_minus_five() {
        assert_eq!(direction_for(6.0), TrendDirection::Rising);
        assert_eq!(direction_for(5.0), TrendDirection::Stable);
        assert_eq!(direction_for(-5.0), TrendDirection::Stable);
        assert_eq!(direction_for(-6.0), TrendDirection::Falling);
    }

    #[test]
    fn alert_levels_use_absolute_change() {
        assert_eq!(alert_level_for(10.0), AlertLevel::Normal);
        assert_eq!(alert_level_for(25.0), AlertLevel::Elevated);
        assert_eq!(alert_level_for(-30.0), AlertLevel::Elevated);
        assert_eq!(alert_level_for(50.0), AlertLevel::Critical);
        assert_eq!(alert_level_for(-75.0), AlertLevel::Critical);
    }

    #[test]
    fn alert_level_ordering_supports_max() {
        assert!(AlertLevel::Critical > AlertLevel::Elevated);
        assert!(AlertLevel::Elevated > AlertLevel::Normal);
    }

    #[test]
    fn sparkline_zero_fills_gaps() {
        let start = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 7, 5).unwrap();
        let counts = vec![
            (NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(), 3),
            (NaiveDate::from_ymd_opt(2026, 7, 4).unwrap(), 7),
        ];
        let sparkline = build_sparkline(&counts, start, end);
        assert_eq!(sparkline, vec![3.0, 0.0, 0.0, 7.0, 0.0]);
    }

    #[test]
    fn sparkline_caps_at_thirty_days() {
        let start = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let sparkline = build_sparkline(&[], start, end);
        assert_eq!(sparkline.len(), SPARKLINE_DAYS);
    }

    #[test]
    fn summary_lists_critical_and_movers() {
        let mut indicators = HashMap::new();
        indicators.insert("conflict_index".to_string(), indicator(60.0));
        indicators.insert("tech_activity".to_string(), indicator(30.0));
        indicators.insert("market_volatility".to_string(), indicator(-1.0));

        let summary = summarize(&indicators);
        assert!(summary.contains("CRITICAL: conflict_index"));
        assert!(summary.contains("ELEVATED: tech_activity"));
        assert!(summary.contains("Rising: conflict_index (+60%)"));
    }

    #[test]
    fn quiet_indicators_summarize_as_normal() {
        let mut indicators = HashMap::new();
        indicators.insert("conflict_index".to_string(), indicator(2.0));
        assert_eq!(
            summarize(&indicators),
            "All indicators within normal parameters"
        );
    }
}
