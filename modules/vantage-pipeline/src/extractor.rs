// Entity extraction: zero-shot NER with a regex fallback.
// The model service is primary; when it is absent or returns nothing, the
// per-type regex tables keep extraction alive at fixed 0.7 confidence.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use ner_client::NerClient;
use vantage_common::EntityType;

const DEFAULT_THRESHOLD: f64 = 0.5;
const CONTEXT_WINDOW: usize = 50;
const FALLBACK_CONFIDENCE: f64 = 0.7;
const MEMO_CAPACITY: usize = 256;
const MEMO_KEY_PREFIX: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedEntity {
    pub text: String,
    pub entity_type: EntityType,
    pub start: usize,
    pub end: usize,
    pub confidence: f64,
    /// "gliner" for model output, "regex" for fallback matches.
    pub source: &'static str,
    pub normalized: String,
    pub context: Option<String>,
}

/// Strip surrounding punctuation and collapse internal whitespace.
pub fn normalize_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| ".,;:!?\"'()[]{}".contains(c))
        .trim()
        .to_string()
}

/// Up to `CONTEXT_WINDOW` chars each side of the span, with ellipses when
/// truncated. Offsets are byte positions on char boundaries; anything else
/// (a misaligned model span) yields no context rather than a panic.
fn extract_context(text: &str, start: usize, end: usize) -> String {
    if start > end
        || end > text.len()
        || !text.is_char_boundary(start)
        || !text.is_char_boundary(end)
    {
        return String::new();
    }
    let prefix_start = text[..start]
        .char_indices()
        .rev()
        .nth(CONTEXT_WINDOW.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let suffix_end = text[end..]
        .char_indices()
        .nth(CONTEXT_WINDOW)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());

    let mut context = text[prefix_start..suffix_end].to_string();
    if prefix_start > 0 {
        context = format!("...{context}");
    }
    if suffix_end < text.len() {
        context = format!("{context}...");
    }
    context
}

/// Remove overlapping spans: sort by (start, longest-first), keep a span
/// unless it overlaps its predecessor, in which case higher confidence wins.
fn dedupe_overlapping(mut entities: Vec<ExtractedEntity>) -> Vec<ExtractedEntity> {
    if entities.is_empty() {
        return entities;
    }
    entities.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then((b.end - b.start).cmp(&(a.end - a.start)))
    });

    let mut result: Vec<ExtractedEntity> = Vec::with_capacity(entities.len());
    let mut last_end = 0usize;
    let mut any = false;

    for entity in entities {
        if !any || entity.start >= last_end {
            last_end = entity.end;
            result.push(entity);
            any = true;
        } else if let Some(prev) = result.last_mut() {
            if entity.confidence > prev.confidence {
                last_end = entity.end;
                *prev = entity;
            }
        }
    }
    result
}

struct Memo {
    entries: HashMap<String, Vec<ExtractedEntity>>,
    order: VecDeque<String>,
}

pub struct EntityExtractor {
    ner: Arc<NerClient>,
    entity_types: Vec<EntityType>,
    fallback_patterns: Vec<(EntityType, Vec<Regex>)>,
    use_fallback: bool,
    memo: Mutex<Memo>,
}

impl EntityExtractor {
    pub fn new(ner: Arc<NerClient>) -> Self {
        Self::with_types(ner, EntityType::default_set())
    }

    pub fn with_types(ner: Arc<NerClient>, entity_types: Vec<EntityType>) -> Self {
        Self {
            ner,
            entity_types,
            fallback_patterns: build_fallback_patterns(),
            use_fallback: true,
            memo: Mutex::new(Memo {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Extract entities, sorted by position, overlap-free.
    pub async fn extract(
        &self,
        text: &str,
        entity_types: Option<&[EntityType]>,
        threshold: f64,
        include_context: bool,
    ) -> Vec<ExtractedEntity> {
        if text.trim().is_empty() {
            return vec![];
        }

        let types: Vec<EntityType> = entity_types
            .map(|t| t.to_vec())
            .unwrap_or_else(|| self.entity_types.clone());

        let memo_key = self.memo_key(text, threshold, &types);
        if let Some(cached) = self.memo_get(&memo_key) {
            return cached;
        }

        let mut entities: Vec<ExtractedEntity> = Vec::new();

        if self.ner.model_available().await {
            let labels: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
            match self.ner.predict(text, &labels, threshold).await {
                Ok(predictions) => {
                    for pred in predictions {
                        let entity_type = match pred.label.parse::<EntityType>() {
                            Ok(t) => t,
                            Err(_) => continue,
                        };
                        let context = include_context
                            .then(|| extract_context(text, pred.start, pred.end));
                        entities.push(ExtractedEntity {
                            normalized: normalize_text(&pred.text),
                            text: pred.text,
                            entity_type,
                            start: pred.start,
                            end: pred.end,
                            confidence: pred.score,
                            source: "gliner",
                            context,
                        });
                    }
                }
                Err(e) => warn!(error = %e, "model extraction failed"),
            }
        }

        if self.use_fallback && entities.is_empty() {
            entities = self.extract_with_fallback(text, &types, include_context);
        }

        let entities = dedupe_overlapping(entities);
        self.memo_put(memo_key, entities.clone());
        debug!(entities = entities.len(), "extraction complete");
        entities
    }

    fn extract_with_fallback(
        &self,
        text: &str,
        types: &[EntityType],
        include_context: bool,
    ) -> Vec<ExtractedEntity> {
        let mut entities = Vec::new();
        for (entity_type, patterns) in &self.fallback_patterns {
            if !types.contains(entity_type) {
                continue;
            }
            for pattern in patterns {
                for hit in pattern.find_iter(text) {
                    let context =
                        include_context.then(|| extract_context(text, hit.start(), hit.end()));
                    entities.push(ExtractedEntity {
                        text: hit.as_str().to_string(),
                        entity_type: *entity_type,
                        start: hit.start(),
                        end: hit.end(),
                        confidence: FALLBACK_CONFIDENCE,
                        source: "regex",
                        normalized: normalize_text(hit.as_str()),
                        context,
                    });
                }
            }
        }
        entities
    }

    fn memo_key(&self, text: &str, threshold: f64, types: &[EntityType]) -> String {
        let prefix: String = text.chars().take(MEMO_KEY_PREFIX).collect();
        let type_names: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
        format!("{prefix}_{threshold}_{}", type_names.join(","))
    }

    fn memo_get(&self, key: &str) -> Option<Vec<ExtractedEntity>> {
        let memo = self.memo.lock().expect("memo lock poisoned");
        memo.entries.get(key).cloned()
    }

    fn memo_put(&self, key: String, entities: Vec<ExtractedEntity>) {
        let mut memo = self.memo.lock().expect("memo lock poisoned");
        if memo.entries.len() >= MEMO_CAPACITY {
            if let Some(oldest) = memo.order.pop_front() {
                memo.entries.remove(&oldest);
            }
        }
        if memo.entries.insert(key.clone(), entities).is_none() {
            memo.order.push_back(key);
        }
    }

    pub fn clear_cache(&self) {
        let mut memo = self.memo.lock().expect("memo lock poisoned");
        memo.entries.clear();
        memo.order.clear();
    }
}

fn build_fallback_patterns() -> Vec<(EntityType, Vec<Regex>)> {
    let compile = |patterns: &[&str]| -> Vec<Regex> {
        patterns
            .iter()
            .map(|p| Regex::new(p).expect("invalid fallback pattern"))
            .collect()
    };

    vec![
        (
            EntityType::Date,
            compile(&[
                r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b",
                r"\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},?\s+\d{4}\b",
                r"\b\d{4}-\d{2}-\d{2}\b",
            ]),
        ),
        (
            EntityType::FinancialInstrument,
            compile(&[
                r"\$\d+(?:\.\d+)?(?:\s*(?:million|billion|trillion|M|B|T))?\b",
                r"\b\d+(?:\.\d+)?\s*(?:USD|EUR|GBP|CNY|RUB|JPY)\b",
            ]),
        ),
        (
            EntityType::MilitaryUnit,
            compile(&[
                r"\b(?:\d+(?:st|nd|rd|th)\s+)?(?:Army|Division|Brigade|Battalion|Regiment|Squadron|Fleet)\b",
                r"\bUSS\s+[A-Z][a-z]+\b",
                r"\b(?:NATO|NORAD|CENTCOM|EUCOM|INDOPACOM)\b",
            ]),
        ),
        (
            EntityType::GovernmentAgency,
            compile(&[
                r"\b(?:FBI|CIA|NSA|DHS|DOD|DOJ|State Department|Pentagon|Kremlin|Politburo)\b",
                r"\bMinistry of (?:Defense|Foreign Affairs|Interior|Finance)\b",
            ]),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(start: usize, end: usize, confidence: f64) -> ExtractedEntity {
        ExtractedEntity {
            text: "x".to_string(),
            entity_type: EntityType::Person,
            start,
            end,
            confidence,
            source: "gliner",
            normalized: "x".to_string(),
            context: None,
        }
    }

    #[test]
    fn normalize_strips_punctuation_and_whitespace() {
        assert_eq!(normalize_text("  Vladimir   Putin, "), "Vladimir Putin");
        assert_eq!(normalize_text("\"Pentagon\""), "Pentagon");
        assert_eq!(normalize_text("(NATO)"), "NATO");
    }

    #[test]
    fn context_window_adds_ellipses_only_when_truncated() {
        let text = "a".repeat(200);
        let ctx = extract_context(&text, 100, 105);
        assert!(ctx.starts_with("..."));
        assert!(ctx.ends_with("..."));

        let short = "Putin spoke.";
        let ctx = extract_context(short, 0, 5);
        assert!(!ctx.starts_with("..."));
        assert!(!ctx.ends_with("..."));
    }

    #[test]
    fn overlapping_spans_are_deduplicated() {
        let deduped = dedupe_overlapping(vec![
            entity(0, 10, 0.9),
            entity(5, 12, 0.6),
            entity(20, 25, 0.8),
        ]);
        assert_eq!(deduped.len(), 2);
        // Output is overlap-free
        for pair in deduped.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn overlap_keeps_higher_confidence() {
        let deduped = dedupe_overlapping(vec![entity(0, 10, 0.5), entity(3, 8, 0.9)]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].confidence, 0.9);
    }

    #[test]
    fn fallback_patterns_find_agencies_and_dates() {
        let ner = Arc::new(NerClient::new("http://localhost:1"));
        let extractor = EntityExtractor::new(ner);
        let entities = extractor.extract_with_fallback(
            "The FBI opened an inquiry on 2026-03-01 involving the 3rd Brigade.",
            &EntityType::default_set(),
            false,
        );

        let types: Vec<EntityType> = entities.iter().map(|e| e.entity_type).collect();
        assert!(types.contains(&EntityType::GovernmentAgency));
        assert!(types.contains(&EntityType::Date));
        assert!(types.contains(&EntityType::MilitaryUnit));
        assert!(entities.iter().all(|e| e.source == "regex"));
        assert!(entities.iter().all(|e| e.confidence == FALLBACK_CONFIDENCE));
    }

    #[tokio::test]
    async fn extract_with_unreachable_model_uses_fallback_and_sorts() {
        // Port 1 is never serving; the probe fails and regex takes over.
        let ner = Arc::new(NerClient::new("http://127.0.0.1:1"));
        let extractor = EntityExtractor::new(ner);
        let entities = extractor
            .extract(
                "On 2026-03-01 the Pentagon briefed NATO about the incident.",
                None,
                DEFAULT_THRESHOLD,
                true,
            )
            .await;

        assert!(!entities.is_empty());
        for pair in entities.windows(2) {
            assert!(pair[0].end <= pair[1].start, "spans must not overlap");
        }
        assert!(entities.iter().all(|e| e.context.is_some()));
        // Sorted by position
        for pair in entities.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
    }

    #[tokio::test]
    async fn repeated_extraction_hits_memo() {
        let ner = Arc::new(NerClient::new("http://127.0.0.1:1"));
        let extractor = EntityExtractor::new(ner);
        let text = "The FBI and CIA briefed the Pentagon.";
        let first = extractor.extract(text, None, DEFAULT_THRESHOLD, false).await;
        let second = extractor.extract(text, None, DEFAULT_THRESHOLD, false).await;
        assert_eq!(first.len(), second.len());
    }
}
