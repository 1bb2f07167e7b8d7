// Content quality validation. Rejects spam and junk before the rest of the
// pipeline spends model time on it.

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use vantage_common::NewsItem;

const MIN_TITLE_LENGTH: usize = 10;
const MIN_CONTENT_LENGTH: usize = 50;
const MAX_CAPS_RATIO: f64 = 0.5;
const MAX_SPECIAL_CHAR_RATIO: f64 = 0.2;
const MAX_URL_RATIO: f64 = 0.15;

/// Sub-score weights: title, content, url, spam.
const WEIGHTS: [f64; 4] = [0.25, 0.35, 0.15, 0.25];

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub score: f64,
    pub issues: Vec<String>,
}

/// Validates content quality for collected items.
pub struct ContentValidator {
    strict_mode: bool,
    spam_patterns: Vec<Regex>,
    placeholder_patterns: Vec<Regex>,
    suspicious_url_patterns: Vec<Regex>,
    url_pattern: Regex,
    valid_url_pattern: Regex,
}

impl ContentValidator {
    pub fn new(strict_mode: bool) -> Self {
        let spam_patterns = [
            r"(?i)\b(buy now|click here|limited time|act now|free money)\b",
            r"(?i)\b(winner|congratulations|you've won)\b",
            r"(?i)\$\d+[\s,]*\d*[\s,]*\d*\s*(per|a)\s*(day|week|month)\b",
            r"(?i)\b(viagra|cialis|casino|poker|betting)\b",
            r"[A-Z]{20,}",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("invalid spam pattern"))
        .collect();

        let placeholder_patterns = [
            r"(?i)^(untitled|no title|test|placeholder)\b",
            r"^\[.*\]$",
            r"^https?://",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("invalid placeholder pattern"))
        .collect();

        let suspicious_url_patterns = [r"(?i)\.(exe|zip|rar|scr)$", r"(?i)bit\.ly|tinyurl|goo\.gl"]
            .iter()
            .map(|p| Regex::new(p).expect("invalid url pattern"))
            .collect();

        Self {
            strict_mode,
            spam_patterns,
            placeholder_patterns,
            suspicious_url_patterns,
            url_pattern: Regex::new(r"https?://\S+").expect("invalid url regex"),
            valid_url_pattern: Regex::new(
                r"^https?://(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)*[a-zA-Z]{2,}(?:/[^\s]*)?$",
            )
            .expect("invalid url format regex"),
        }
    }

    /// Validate a news item: weighted sum of title/content/url/spam scores,
    /// rejected outright on any CRITICAL issue.
    pub fn validate(&self, item: &NewsItem) -> ValidationResult {
        let mut issues = Vec::new();

        let content = if !item.content.is_empty() {
            item.content.as_str()
        } else {
            item.summary.as_str()
        };

        let (title_score, title_issues) = self.validate_title(&item.title);
        issues.extend(title_issues);

        let (content_score, content_issues) = self.validate_content(content);
        issues.extend(content_issues);

        let (url_score, url_issues) = self.validate_url(&item.url);
        issues.extend(url_issues);

        let (spam_score, spam_issues) = self.detect_spam(&item.title, content);
        issues.extend(spam_issues);

        let scores = [title_score, content_score, url_score, spam_score];
        let score: f64 = scores.iter().zip(WEIGHTS.iter()).map(|(s, w)| s * w).sum();

        let threshold = if self.strict_mode { 0.6 } else { 0.4 };
        let has_critical = issues.iter().any(|i| i.contains("CRITICAL"));
        let is_valid = score >= threshold && !has_critical;

        let result = ValidationResult {
            is_valid,
            score,
            issues,
        };
        if !result.is_valid {
            debug!(score = result.score, issues = result.issues.len(), "item failed validation");
        }
        result
    }

    fn validate_title(&self, title: &str) -> (f64, Vec<String>) {
        let title = title.trim();
        if title.is_empty() {
            return (0.0, vec!["CRITICAL: Missing title".to_string()]);
        }

        let mut issues = Vec::new();
        let mut score: f64 = 1.0;

        if title.chars().count() < MIN_TITLE_LENGTH {
            issues.push(format!(
                "Title too short ({} chars, min {MIN_TITLE_LENGTH})",
                title.chars().count()
            ));
            score -= 0.4;
        }

        if self.placeholder_patterns.iter().any(|p| p.is_match(title)) {
            issues.push("Title appears to be a placeholder".to_string());
            score -= 0.5;
        }

        let is_all_upper = title.chars().any(|c| c.is_alphabetic())
            && !title.chars().any(|c| c.is_lowercase());
        if is_all_upper && title.chars().count() > 20 {
            issues.push("Title is all uppercase".to_string());
            score -= 0.2;
        }

        (score.max(0.0), issues)
    }

    fn validate_content(&self, content: &str) -> (f64, Vec<String>) {
        let content = content.trim();
        if content.is_empty() {
            return (
                0.3,
                vec!["Content is empty (summary may still be useful)".to_string()],
            );
        }

        let mut issues = Vec::new();
        let total_chars = content.chars().count();

        // Length bands, then penalties on top.
        let mut score: f64 = match total_chars {
            l if l <= 100 => 0.3,
            l if l <= 500 => 0.5,
            l if l <= 1000 => 0.7,
            l if l <= 3000 => 0.85,
            _ => 0.95,
        };

        if total_chars < MIN_CONTENT_LENGTH {
            issues.push(format!(
                "Content too short ({total_chars} chars, min {MIN_CONTENT_LENGTH})"
            ));
        }

        let special_chars = content
            .chars()
            .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
            .count();
        let special_ratio = special_chars as f64 / total_chars as f64;
        if special_ratio > MAX_SPECIAL_CHAR_RATIO {
            issues.push(format!(
                "Excessive special characters ({:.0}%)",
                special_ratio * 100.0
            ));
            score -= 0.2;
        }

        let url_chars: usize = self
            .url_pattern
            .find_iter(content)
            .map(|m| m.as_str().chars().count())
            .sum();
        let url_ratio = url_chars as f64 / total_chars as f64;
        if url_ratio > MAX_URL_RATIO {
            issues.push(format!("Excessive URLs in content ({:.0}%)", url_ratio * 100.0));
            score -= 0.2;
        }

        let alpha_chars: Vec<char> = content.chars().filter(|c| c.is_alphabetic()).collect();
        if !alpha_chars.is_empty() {
            let caps_ratio = alpha_chars.iter().filter(|c| c.is_uppercase()).count() as f64
                / alpha_chars.len() as f64;
            if caps_ratio > MAX_CAPS_RATIO {
                issues.push(format!(
                    "Excessive capitalization ({:.0}%)",
                    caps_ratio * 100.0
                ));
                score -= 0.15;
            }
        }

        (score.max(0.0), issues)
    }

    fn validate_url(&self, url: &str) -> (f64, Vec<String>) {
        let url = url.trim();
        if url.is_empty() {
            return (0.5, vec!["Missing URL".to_string()]);
        }

        let mut issues = Vec::new();
        let mut score: f64 = 1.0;

        if !self.valid_url_pattern.is_match(url) {
            issues.push("Invalid URL format".to_string());
            score -= 0.5;
        }

        if self.suspicious_url_patterns.iter().any(|p| p.is_match(url)) {
            issues.push("URL contains suspicious pattern".to_string());
            score -= 0.3;
        }

        (score.max(0.0), issues)
    }

    fn detect_spam(&self, title: &str, content: &str) -> (f64, Vec<String>) {
        let combined = format!("{title} {content}");
        if combined.trim().is_empty() {
            return (0.5, vec!["No content to analyze for spam".to_string()]);
        }

        let mut issues = Vec::new();
        let mut score: f64 = 1.0;

        // Flat penalty per matching pattern, not per occurrence.
        for pattern in &self.spam_patterns {
            if let Some(hit) = pattern.find(&combined) {
                let sample: String = hit.as_str().chars().take(30).collect();
                issues.push(format!("CRITICAL: Spam pattern detected: {sample}"));
                score -= 0.4;
            }
        }

        // Lexical uniqueness: heavily repeated wording reads as spam.
        let words: Vec<String> = combined
            .to_lowercase()
            .split_whitespace()
            .map(String::from)
            .collect();
        if words.len() > 10 {
            let unique: std::collections::HashSet<&String> = words.iter().collect();
            let uniqueness = unique.len() as f64 / words.len() as f64;
            if uniqueness < 0.3 {
                issues.push(format!(
                    "Repetitive content detected (uniqueness: {:.0}%)",
                    uniqueness * 100.0
                ));
                score -= 0.3;
            }
        }

        (score.max(0.0), issues)
    }

    pub fn validate_batch(&self, items: &[NewsItem]) -> Vec<(uuid::Uuid, ValidationResult)> {
        items
            .iter()
            .map(|item| (item.id, self.validate(item)))
            .collect()
    }

    /// Filter a batch down to the items that passed.
    pub fn filter_valid<'a>(
        &self,
        items: &'a [NewsItem],
        results: &[(uuid::Uuid, ValidationResult)],
    ) -> Vec<&'a NewsItem> {
        items
            .iter()
            .filter(|item| {
                results
                    .iter()
                    .any(|(id, r)| *id == item.id && r.is_valid)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;
    use vantage_common::ProcessedState;

    fn item(title: &str, content: &str, url: &str) -> NewsItem {
        NewsItem {
            id: Uuid::new_v4(),
            source_type: "rss".to_string(),
            source_name: "Test".to_string(),
            source_url: String::new(),
            title: title.to_string(),
            content: content.to_string(),
            summary: String::new(),
            url: url.to_string(),
            published_at: None,
            collected_at: Utc::now(),
            author: String::new(),
            categories: vec![],
            processed: ProcessedState::Pending,
            relevance_score: 0.0,
            content_hash: String::new(),
            embedding_ref: None,
            metadata: serde_json::Value::Null,
        }
    }

    fn good_item() -> NewsItem {
        item(
            "Government announces new defense budget for next year",
            "The ministry confirmed on Tuesday that the annual defense budget will rise \
             by four percent, citing regional security concerns. Lawmakers from both \
             parties signalled support for the measure during the committee hearing.\n\n\
             Analysts noted the increase follows two years of flat spending.\n\n\
             A final vote is expected next month.",
            "https://example.com/news/defense-budget",
        )
    }

    #[test]
    fn well_formed_item_is_valid() {
        let validator = ContentValidator::new(false);
        let result = validator.validate(&good_item());
        assert!(result.is_valid, "issues: {:?}", result.issues);
        assert!(result.score > 0.6);
    }

    #[test]
    fn spam_item_is_rejected_with_critical_issue() {
        let validator = ContentValidator::new(false);
        let result = validator.validate(&item(
            "BUY NOW!!! FREE MONEY CLICK HERE",
            "Click here click here click here",
            "",
        ));
        assert!(!result.is_valid);
        assert!(result.issues.iter().any(|i| i.contains("CRITICAL")));
        assert!(result.score < 0.6, "score was {}", result.score);
    }

    #[test]
    fn multiple_spam_patterns_drive_score_below_point_four() {
        let validator = ContentValidator::new(false);
        let result = validator.validate(&item(
            "BUY NOW!!! FREE MONEY CLICK HERE",
            "CONGRATULATIONS! YOU'VE WON FREE MONEY! CLICK HERE NOW!",
            "",
        ));
        assert!(!result.is_valid);
        assert!(result.issues.iter().filter(|i| i.contains("CRITICAL")).count() >= 2);
        assert!(result.score < 0.4, "score was {}", result.score);
    }

    #[test]
    fn repeated_spam_phrase_penalized_once_per_pattern() {
        let validator = ContentValidator::new(false);
        // One pattern matching five times must not cost more than one hit.
        let once = validator.validate(&item(
            "A perfectly reasonable headline",
            "Unrelated filler text then click here at the end.",
            "https://example.com/a",
        ));
        let repeated = validator.validate(&item(
            "A perfectly reasonable headline",
            "click here click here click here click here click here",
            "https://example.com/a",
        ));
        let spam_issues =
            |r: &ValidationResult| r.issues.iter().filter(|i| i.contains("Spam")).count();
        assert_eq!(spam_issues(&once), 1);
        assert_eq!(spam_issues(&repeated), 1);
    }

    #[test]
    fn short_title_gets_dedicated_issue() {
        let validator = ContentValidator::new(false);
        let mut subject = good_item();
        subject.title = "Short".to_string();
        let result = validator.validate(&subject);
        assert!(result.issues.iter().any(|i| i.contains("Title too short")));
    }

    #[test]
    fn missing_title_is_critical() {
        let validator = ContentValidator::new(false);
        let mut subject = good_item();
        subject.title = String::new();
        let result = validator.validate(&subject);
        assert!(!result.is_valid);
        assert!(result.issues.iter().any(|i| i.contains("CRITICAL: Missing title")));
    }

    #[test]
    fn strict_mode_raises_threshold() {
        let lenient = ContentValidator::new(false);
        let strict = ContentValidator::new(true);
        // Short title + empty content + missing url scores mid-range
        // (0.15 + 0.105 + 0.075 + 0.25 = 0.58): lenient passes, strict fails.
        let subject = item("Short", "", "");
        let lenient_result = lenient.validate(&subject);
        let strict_result = strict.validate(&subject);
        assert!(lenient_result.is_valid, "issues: {:?}", lenient_result.issues);
        assert!(!strict_result.is_valid);
    }

    #[test]
    fn url_shortener_is_penalized() {
        let validator = ContentValidator::new(false);
        let mut subject = good_item();
        subject.url = "https://bit.ly/3xyzabc".to_string();
        let result = validator.validate(&subject);
        assert!(result
            .issues
            .iter()
            .any(|i| i.contains("suspicious pattern")));
    }

    #[test]
    fn empty_content_scores_point_three_not_zero() {
        let validator = ContentValidator::new(false);
        let subject = item(
            "A perfectly reasonable headline",
            "",
            "https://example.com/a",
        );
        let result = validator.validate(&subject);
        assert!(result
            .issues
            .iter()
            .any(|i| i.contains("Content is empty")));
        // 1.0*0.25 + 0.3*0.35 + 1.0*0.15 + 1.0*0.25 = 0.755
        assert!((result.score - 0.755).abs() < 0.01);
    }

    #[test]
    fn filter_valid_keeps_only_passing_items() {
        let validator = ContentValidator::new(false);
        let good = good_item();
        let bad = item("BUY NOW!!! FREE MONEY", "Click here", "https://example.com/b");
        let items = vec![good.clone(), bad];
        let results = validator.validate_batch(&items);
        let valid = validator.filter_valid(&items, &results);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].id, good.id);
    }
}
