// Relevance ranking: weighted blend of source credibility, recency,
// category importance, tracked-entity mentions, and content quality.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use vantage_common::NewsItem;

#[derive(Debug, Clone)]
pub struct RankingConfig {
    pub source_weight: f64,
    pub recency_weight: f64,
    pub category_weight: f64,
    pub entity_weight: f64,
    pub content_weight: f64,

    /// Score halves after this many hours.
    pub recency_half_life_hours: f64,
    /// Items older than this score zero on recency.
    pub recency_max_age_hours: f64,

    /// Source credibility, 0-10. Matched by substring against source_name.
    pub source_scores: Vec<(&'static str, f64)>,
    /// Category importance, 0-10.
    pub category_importance: Vec<(&'static str, f64)>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            source_weight: 0.25,
            recency_weight: 0.30,
            category_weight: 0.20,
            entity_weight: 0.15,
            content_weight: 0.10,
            recency_half_life_hours: 24.0,
            recency_max_age_hours: 168.0,
            source_scores: vec![
                // Wire services and international press
                ("reuters", 10.0),
                ("ap", 10.0),
                ("bbc", 9.5),
                ("al jazeera", 8.5),
                ("guardian", 8.5),
                ("washington post", 8.5),
                ("ny times", 8.5),
                // Event and registry data
                ("gdelt", 9.0),
                ("acled", 9.5),
                ("opensanctions", 9.0),
                ("sec edgar", 8.5),
                ("reliefweb", 8.5),
                // Research
                ("arxiv", 9.0),
                ("nature", 10.0),
                ("science", 10.0),
                ("biorxiv", 8.5),
                ("medrxiv", 8.5),
                // AI provider blogs
                ("openai", 9.5),
                ("google ai", 9.0),
                ("deepmind", 9.5),
                ("huggingface", 8.5),
                ("nvidia", 8.5),
                // Security press and threat intel
                ("hacker news security", 8.0),
                ("the hacker news", 8.0),
                ("bleeping", 8.0),
                ("the register", 7.5),
                ("dark reading", 7.5),
                ("krebs", 8.5),
                ("alienvault", 8.0),
                ("have i been pwned", 8.0),
                // Government
                ("fbi", 10.0),
                // Analysis and think tanks
                ("just security", 9.0),
                ("cipher brief", 8.5),
                ("long war journal", 8.5),
                ("csis", 9.0),
                ("rand", 9.5),
                ("atlantic council", 8.5),
                ("lawfare", 8.5),
                ("foreign policy", 8.5),
                ("council on foreign relations", 8.5),
                ("war on the rocks", 8.5),
                ("defense news", 8.5),
                ("breaking defense", 8.0),
                // Tech press
                ("ars technica", 7.5),
                ("hacker news", 7.0),
                // Community sources sit low by design
                ("reddit", 3.0),
                ("r/", 3.0),
                // Hobby sources suppressed to near-zero
                ("horizon hobby", 1.0),
                ("traxxas", 1.0),
                ("big squid rc", 1.0),
                ("rcgroups", 1.0),
            ],
            category_importance: vec![
                ("geopolitics", 9.5),
                ("military", 9.5),
                ("conflict", 9.0),
                ("crime_international", 9.0),
                ("crime_national", 9.0),
                ("crime_local", 8.5),
                ("sanctions", 9.0),
                ("pep", 8.5),
                ("crime", 8.5),
                ("cyber", 9.0),
                ("political", 8.5),
                ("government", 8.0),
                ("humanitarian", 8.0),
                ("tech_ai", 8.5),
                ("tech_general", 7.0),
                ("research", 8.0),
                ("local", 7.5),
                ("financial", 6.5),
                ("business", 6.0),
                ("weather", 5.0),
                // Hobby categories suppressed rather than filtered
                ("rc_industry", 0.5),
                ("rc", 0.5),
                ("hobby", 0.5),
                ("fpv", 0.5),
                ("rccars", 0.5),
                ("rcplanes", 0.5),
                ("multicopter", 0.5),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingResult {
    pub item_id: Uuid,
    pub score: f64,
    pub components: HashMap<String, f64>,
}

/// Computes relevance scores. Pure over its inputs given a fixed clock, so
/// re-ranking the same batch yields identical scores.
pub struct RelevanceRanker {
    config: RankingConfig,
    tracked_entities: HashSet<String>,
}

impl RelevanceRanker {
    pub fn new() -> Self {
        Self::with_config(RankingConfig::default())
    }

    pub fn with_config(config: RankingConfig) -> Self {
        Self {
            config,
            tracked_entities: HashSet::new(),
        }
    }

    /// Replace the tracked-entity set (lowercased names).
    pub fn update_tracked_entities(&mut self, entities: impl IntoIterator<Item = String>) {
        self.tracked_entities = entities.into_iter().map(|e| e.to_lowercase()).collect();
    }

    pub fn score(&self, item: &NewsItem, now: DateTime<Utc>) -> RankingResult {
        let source = self.score_source(item);
        let recency = self.score_recency(item, now);
        let category = self.score_category(item);
        let entity = self.score_entities(item);
        let content = self.score_content(item);

        let cfg = &self.config;
        let score = source * cfg.source_weight
            + recency * cfg.recency_weight
            + category * cfg.category_weight
            + entity * cfg.entity_weight
            + content * cfg.content_weight;

        let mut components = HashMap::new();
        components.insert("source".to_string(), source);
        components.insert("recency".to_string(), recency);
        components.insert("category".to_string(), category);
        components.insert("entity".to_string(), entity);
        components.insert("content".to_string(), content);

        RankingResult {
            item_id: item.id,
            score: score.clamp(0.0, 1.0),
            components,
        }
    }

    fn score_source(&self, item: &NewsItem) -> f64 {
        let source_name = item.source_name.to_lowercase();
        for (name, score) in &self.config.source_scores {
            if source_name.contains(name) {
                return score / 10.0;
            }
        }
        0.5
    }

    fn score_recency(&self, item: &NewsItem, now: DateTime<Utc>) -> f64 {
        let pub_time = item.published_at.unwrap_or(item.collected_at);
        let age_hours = (now - pub_time).num_seconds() as f64 / 3600.0;

        if age_hours >= self.config.recency_max_age_hours {
            return 0.0;
        }
        let age_hours = age_hours.max(0.0);
        0.5_f64.powf(age_hours / self.config.recency_half_life_hours)
    }

    fn score_category(&self, item: &NewsItem) -> f64 {
        if item.categories.is_empty() {
            return 0.5;
        }
        let max_importance = item
            .categories
            .iter()
            .map(|category| {
                let lower = category.to_lowercase();
                self.config
                    .category_importance
                    .iter()
                    .find(|(name, _)| *name == lower)
                    .map(|(_, importance)| *importance)
                    .unwrap_or(5.0)
            })
            .fold(0.0, f64::max);
        max_importance / 10.0
    }

    fn score_entities(&self, item: &NewsItem) -> f64 {
        if self.tracked_entities.is_empty() {
            return 0.5;
        }

        let haystack =
            format!("{} {} {}", item.title, item.content, item.summary).to_lowercase();
        if haystack.trim().is_empty() {
            return 0.3;
        }

        let mentions = self
            .tracked_entities
            .iter()
            .filter(|entity| haystack.contains(entity.as_str()))
            .count();

        match mentions {
            0 => 0.3,
            1 => 0.6,
            2 => 0.75,
            3 => 0.85,
            _ => 0.95,
        }
    }

    fn score_content(&self, item: &NewsItem) -> f64 {
        let content = item.body();
        if content.is_empty() {
            return 0.3;
        }

        let length = content.chars().count();
        let length_score = match length {
            l if l < 100 => 0.3,
            l if l < 500 => 0.5,
            l if l < 1000 => 0.7,
            l if l < 3000 => 0.85,
            _ => 0.95,
        };

        let paragraphs = content.matches("\n\n").count() + 1;
        let structure_score = match paragraphs {
            p if p >= 3 => 1.0,
            2 => 0.8,
            _ => 0.6,
        };

        length_score * 0.7 + structure_score * 0.3
    }

    /// Rank a batch, sorted by descending score.
    pub fn rank_batch(&self, items: &[NewsItem], now: DateTime<Utc>) -> Vec<RankingResult> {
        let mut results: Vec<RankingResult> =
            items.iter().map(|item| self.score(item, now)).collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results
    }

    /// Write scores back onto items in place.
    pub fn apply_scores(items: &mut [NewsItem], results: &[RankingResult]) {
        let by_id: HashMap<Uuid, f64> = results.iter().map(|r| (r.item_id, r.score)).collect();
        for item in items {
            match by_id.get(&item.id) {
                Some(score) => item.relevance_score = *score,
                None => warn!(item = %item.id, "no ranking result for item"),
            }
        }
    }
}

impl Default for RelevanceRanker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vantage_common::ProcessedState;

    fn item(source_name: &str, categories: &[&str], age_hours: i64, now: DateTime<Utc>) -> NewsItem {
        NewsItem {
            id: Uuid::new_v4(),
            source_type: "rss".to_string(),
            source_name: source_name.to_string(),
            source_url: String::new(),
            title: "A headline about events".to_string(),
            content: "Body text.".to_string(),
            summary: String::new(),
            url: format!("https://example.com/{}", Uuid::new_v4()),
            published_at: Some(now - Duration::hours(age_hours)),
            collected_at: now,
            author: String::new(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            processed: ProcessedState::Pending,
            relevance_score: 0.0,
            content_hash: String::new(),
            embedding_ref: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn recency_is_exact_at_boundaries() {
        let ranker = RelevanceRanker::new();
        let now = Utc::now();

        let fresh = ranker.score(&item("Unknown", &[], 0, now), now);
        let day_old = ranker.score(&item("Unknown", &[], 24, now), now);
        let week_old = ranker.score(&item("Unknown", &[], 168, now), now);

        assert!((fresh.components["recency"] - 1.0).abs() < 1e-9);
        assert!((day_old.components["recency"] - 0.5).abs() < 1e-6);
        assert_eq!(week_old.components["recency"], 0.0);
    }

    #[test]
    fn overall_score_is_monotone_in_recency() {
        let ranker = RelevanceRanker::new();
        let now = Utc::now();
        let a = ranker.score(&item("Unknown", &[], 0, now), now);
        let b = ranker.score(&item("Unknown", &[], 24, now), now);
        let c = ranker.score(&item("Unknown", &[], 168, now), now);
        assert!(a.score > b.score);
        assert!(b.score > c.score);
    }

    #[test]
    fn known_source_beats_unknown() {
        let ranker = RelevanceRanker::new();
        let now = Utc::now();
        let reuters = ranker.score(&item("Reuters", &[], 1, now), now);
        let unknown = ranker.score(&item("Some Blog", &[], 1, now), now);
        assert_eq!(reuters.components["source"], 1.0);
        assert_eq!(unknown.components["source"], 0.5);
    }

    #[test]
    fn hobby_category_is_suppressed_not_filtered() {
        let ranker = RelevanceRanker::new();
        let now = Utc::now();
        let hobby = ranker.score(&item("Unknown", &["rc_industry"], 1, now), now);
        let geo = ranker.score(&item("Unknown", &["geopolitics"], 1, now), now);
        // Suppressed to near-zero, but still a score.
        assert!(hobby.components["category"] < 0.1);
        assert!(geo.components["category"] > 0.9);
        assert!(hobby.score > 0.0);
    }

    #[test]
    fn entity_mention_buckets() {
        let mut ranker = RelevanceRanker::new();
        let now = Utc::now();
        ranker.update_tracked_entities(vec![
            "putin".to_string(),
            "xi jinping".to_string(),
            "nato".to_string(),
            "kremlin".to_string(),
        ]);

        let mut zero = item("Unknown", &[], 1, now);
        zero.content = "Nothing relevant here.".to_string();
        assert_eq!(ranker.score(&zero, now).components["entity"], 0.3);

        let mut one = item("Unknown", &[], 1, now);
        one.content = "Putin spoke today.".to_string();
        assert_eq!(ranker.score(&one, now).components["entity"], 0.6);

        let mut two = item("Unknown", &[], 1, now);
        two.content = "Putin met Xi Jinping.".to_string();
        assert_eq!(ranker.score(&two, now).components["entity"], 0.75);

        let mut four = item("Unknown", &[], 1, now);
        four.content = "Putin, Xi Jinping, NATO and the Kremlin.".to_string();
        assert_eq!(ranker.score(&four, now).components["entity"], 0.95);
    }

    #[test]
    fn no_tracked_entities_is_neutral() {
        let ranker = RelevanceRanker::new();
        let now = Utc::now();
        let result = ranker.score(&item("Unknown", &[], 1, now), now);
        assert_eq!(result.components["entity"], 0.5);
    }

    #[test]
    fn content_score_rewards_length_and_structure() {
        let ranker = RelevanceRanker::new();
        let now = Utc::now();

        let mut short = item("Unknown", &[], 1, now);
        short.content = "Tiny.".to_string();
        let mut long = item("Unknown", &[], 1, now);
        long.content = format!(
            "{}\n\n{}\n\n{}",
            "x".repeat(1200),
            "y".repeat(1200),
            "z".repeat(1200)
        );

        let short_score = ranker.score(&short, now).components["content"];
        let long_score = ranker.score(&long, now).components["content"];
        assert!(long_score > short_score);
        // 0.95 length band * 0.7 + 1.0 structure * 0.3
        assert!((long_score - 0.965).abs() < 1e-9);
    }

    #[test]
    fn rank_batch_is_deterministic_and_sorted() {
        let ranker = RelevanceRanker::new();
        let now = Utc::now();
        let items = vec![
            item("Unknown", &[], 100, now),
            item("Reuters", &["geopolitics"], 1, now),
            item("Unknown", &[], 48, now),
        ];

        let first = ranker.rank_batch(&items, now);
        let second = ranker.rank_batch(&items, now);
        let first_scores: Vec<f64> = first.iter().map(|r| r.score).collect();
        let second_scores: Vec<f64> = second.iter().map(|r| r.score).collect();
        assert_eq!(first_scores, second_scores);
        assert!(first_scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn apply_scores_writes_back() {
        let ranker = RelevanceRanker::new();
        let now = Utc::now();
        let mut items = vec![item("Reuters", &["geopolitics"], 1, now)];
        let results = ranker.rank_batch(&items, now);
        RelevanceRanker::apply_scores(&mut items, &results);
        assert!(items[0].relevance_score > 0.0);
        assert_eq!(items[0].relevance_score, results[0].score);
    }
}
