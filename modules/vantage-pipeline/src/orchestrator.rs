// The five-stage processing pipeline: validate, rank, extract mentions,
// detect relationships, embed. One item's failure never halts the batch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vantage_common::bus::BroadcastBus;
use vantage_common::{
    BroadcastEvent, EntityMention, EventType, MentionTarget, NewsItem, ProcessedState,
    TrackedEntity,
};
use vantage_store::{EntityStore, NewsStore};

use crate::embedder::NewsItemEmbedder;
use crate::ranker::RelevanceRanker;
use crate::relationships::{DetectorEntity, RelationshipDetector};
use crate::validator::ContentValidator;

const MENTION_CONTEXT_CHARS: usize = 200;
const MENTION_CONTEXT_CAP: usize = 500;
const DEFAULT_EMBED_CONCURRENCY: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct ProcessingOptions {
    pub skip_validation: bool,
    pub skip_embedding: bool,
    pub strict_validation: bool,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingStats {
    pub total_items: usize,
    pub validated: usize,
    pub validation_failed: usize,
    pub ranked: usize,
    pub entities_extracted: usize,
    pub relationships_found: usize,
    pub embedded: usize,
    pub embedding_failed: usize,
    pub processing_time_ms: f64,
}

impl std::fmt::Display for ProcessingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Processing Run Complete ===")?;
        writeln!(f, "Items:              {}", self.total_items)?;
        writeln!(f, "Validated:          {}", self.validated)?;
        writeln!(f, "Validation failed:  {}", self.validation_failed)?;
        writeln!(f, "Ranked:             {}", self.ranked)?;
        writeln!(f, "Entity mentions:    {}", self.entities_extracted)?;
        writeln!(f, "Relationships:      {}", self.relationships_found)?;
        writeln!(f, "Embedded:           {}", self.embedded)?;
        writeln!(f, "Embedding failed:   {}", self.embedding_failed)?;
        write!(f, "Elapsed:            {:.0}ms", self.processing_time_ms)
    }
}

/// Context windows around each occurrence of `term` in `text`,
/// case-insensitive, with ellipses where truncated.
pub fn extract_contexts(text: &str, term: &str, context_chars: usize) -> Vec<String> {
    let text_lower = text.to_lowercase();
    let term_lower = term.to_lowercase();
    if term_lower.is_empty() {
        return vec![];
    }

    // Offsets come from the lowered text; slice the original only when its
    // byte layout matches, otherwise fall back to the lowered copy.
    let source: &str = if text.len() == text_lower.len() {
        text
    } else {
        &text_lower
    };

    let mut contexts = Vec::new();
    let mut search_from = 0;
    while let Some(found) = text_lower[search_from..].find(&term_lower) {
        let pos = search_from + found;
        let end = pos + term_lower.len();

        let ctx_start = source[..pos]
            .char_indices()
            .rev()
            .nth(context_chars.saturating_sub(1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let ctx_end = source[end.min(source.len())..]
            .char_indices()
            .nth(context_chars)
            .map(|(i, _)| end + i)
            .unwrap_or(source.len());

        let mut context = source[ctx_start..ctx_end].trim().to_string();
        if ctx_start > 0 {
            context = format!("...{context}");
        }
        if ctx_end < source.len() {
            context = format!("{context}...");
        }
        contexts.push(context);

        search_from = end;
        if search_from >= text_lower.len() {
            break;
        }
    }
    contexts
}

pub struct ProcessingPipeline {
    news: NewsStore,
    entities: EntityStore,
    embedder: Option<Arc<NewsItemEmbedder>>,
    bus: Option<Arc<BroadcastBus>>,
}

impl ProcessingPipeline {
    pub fn new(news: NewsStore, entities: EntityStore) -> Self {
        Self {
            news,
            entities,
            embedder: None,
            bus: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<NewsItemEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_bus(mut self, bus: Arc<BroadcastBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Process up to `limit` pending items through the full pipeline.
    pub async fn process_pending(
        &self,
        limit: i64,
        options: &ProcessingOptions,
    ) -> Result<ProcessingStats> {
        let items = self.news.fetch_pending(limit).await?;
        if items.is_empty() {
            info!("no pending items to process");
            return Ok(ProcessingStats::default());
        }
        self.process_batch(items, options).await
    }

    /// Process an explicit batch. Stages run in order; within a stage,
    /// failures are contained per item.
    pub async fn process_batch(
        &self,
        mut items: Vec<NewsItem>,
        options: &ProcessingOptions,
    ) -> Result<ProcessingStats> {
        let start = Instant::now();
        let mut stats = ProcessingStats {
            total_items: items.len(),
            ..Default::default()
        };

        self.emit(
            EventType::ProcessingStarted,
            serde_json::json!({ "items": items.len() }),
        );
        info!(items = items.len(), "processing batch");

        let tracked = self.entities.list_tracked(options.user_id).await?;
        let tracked_names: Vec<String> = tracked.iter().map(|e| e.name_lower.clone()).collect();

        // Stage 1: validation
        if !options.skip_validation {
            let validator = ContentValidator::new(options.strict_validation);
            let results = validator.validate_batch(&items);
            let valid_ids: Vec<Uuid> = results
                .iter()
                .filter(|(_, r)| r.is_valid)
                .map(|(id, _)| *id)
                .collect();
            stats.validated = valid_ids.len();
            stats.validation_failed = items.len() - valid_ids.len();
            items.retain(|item| valid_ids.contains(&item.id));
        } else {
            stats.validated = items.len();
        }

        if items.is_empty() {
            warn!("no items passed validation");
            stats.processing_time_ms = start.elapsed().as_secs_f64() * 1000.0;
            return Ok(stats);
        }

        // Stage 2: ranking
        let mut ranker = RelevanceRanker::new();
        ranker.update_tracked_entities(tracked_names.iter().cloned());
        let now = Utc::now();
        let ranking = ranker.rank_batch(&items, now);
        stats.ranked = ranking.len();
        RelevanceRanker::apply_scores(&mut items, &ranking);
        for item in &items {
            if let Err(e) = self.news.apply_score(item.id, item.relevance_score).await {
                warn!(item = %item.id, error = %e, "score write-back failed");
            }
        }

        // Stage 3: entity mention extraction
        for item in &items {
            match self.extract_mentions(item, &tracked).await {
                Ok(count) => stats.entities_extracted += count,
                Err(e) => warn!(item = %item.id, error = %e, "mention extraction failed"),
            }
        }

        // Stage 4: relationship detection
        for item in &items {
            match self.detect_relationships(item, &tracked).await {
                Ok(count) => stats.relationships_found += count,
                Err(e) => warn!(item = %item.id, error = %e, "relationship detection failed"),
            }
        }

        // Stage 5: embedding
        if !options.skip_embedding {
            if let Some(embedder) = &self.embedder {
                let to_embed: Vec<NewsItem> = items
                    .iter()
                    .filter(|item| !item.body().trim().is_empty())
                    .cloned()
                    .collect();
                let results = embedder.embed_batch(&to_embed, DEFAULT_EMBED_CONCURRENCY).await;
                for result in &results {
                    if result.success {
                        stats.embedded += 1;
                        if let Some(vector_id) = result.vector_id {
                            if let Err(e) =
                                self.news.set_embedding_ref(result.item_id, vector_id).await
                            {
                                warn!(item = %result.item_id, error = %e, "embedding ref write failed");
                            }
                        }
                    } else {
                        stats.embedding_failed += 1;
                    }
                }
            }
        }

        // Mark the batch processed.
        let ids: Vec<Uuid> = items.iter().map(|item| item.id).collect();
        self.news.mark_processed(&ids, ProcessedState::Processed).await?;

        stats.processing_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.emit(
            EventType::ProcessingCompleted,
            serde_json::to_value(&stats).unwrap_or(serde_json::Value::Null),
        );
        info!(
            validated = stats.validated,
            mentions = stats.entities_extracted,
            relationships = stats.relationships_found,
            embedded = stats.embedded,
            elapsed_ms = stats.processing_time_ms,
            "batch processing complete"
        );
        Ok(stats)
    }

    /// One mention row per occurrence of each tracked entity in the item's
    /// combined text, with a context window. Insert conflicts are skipped,
    /// never fatal.
    async fn extract_mentions(&self, item: &NewsItem, tracked: &[TrackedEntity]) -> Result<usize> {
        if tracked.is_empty() {
            return Ok(0);
        }

        let combined = format!("{} {} {}", item.title, item.content, item.summary);
        let combined_lower = combined.to_lowercase();
        let mut inserted = 0;

        for entity in tracked {
            if !combined_lower.contains(&entity.name_lower) {
                continue;
            }

            let contexts = extract_contexts(&combined, &entity.name_lower, MENTION_CONTEXT_CHARS);
            for context in contexts {
                let mention = EntityMention {
                    mention_id: Uuid::new_v4(),
                    entity_id: entity.entity_id,
                    target: MentionTarget::NewsItem(item.id),
                    user_id: entity.user_id,
                    chunk_id: format!("{}_0", item.id),
                    context: context.chars().take(MENTION_CONTEXT_CAP).collect(),
                    timestamp: Utc::now(),
                };
                match self.entities.insert_mention(&mention).await {
                    Ok(()) => inserted += 1,
                    Err(e) => debug!(error = %e, "mention insert skipped"),
                }
            }

            if let Err(e) = self
                .entities
                .touch_seen(entity.entity_id, item.published_at.unwrap_or(item.collected_at))
                .await
            {
                debug!(error = %e, "touch_seen failed");
            }

            if inserted > 0 {
                self.emit(
                    EventType::EntityMention,
                    serde_json::json!({
                        "entity": entity.name,
                        "news_item_id": item.id.to_string(),
                    }),
                );
            }
        }

        Ok(inserted)
    }

    /// Upsert a relationship edge for every pair of tracked entities
    /// co-occurring in the item.
    async fn detect_relationships(
        &self,
        item: &NewsItem,
        tracked: &[TrackedEntity],
    ) -> Result<usize> {
        if tracked.len() < 2 {
            return Ok(0);
        }

        let combined = format!("{} {} {}", item.title, item.content, item.summary);
        let combined_lower = combined.to_lowercase();

        // Group by owner so edges never cross user boundaries.
        let mut by_user: HashMap<Uuid, Vec<DetectorEntity>> = HashMap::new();
        for entity in tracked {
            if combined_lower.contains(&entity.name_lower) {
                by_user.entry(entity.user_id).or_default().push(DetectorEntity {
                    entity_id: entity.entity_id,
                    name_lower: entity.name_lower.clone(),
                    entity_type: entity.entity_type,
                    confidence: 1.0,
                });
            }
        }

        let mut written = 0;
        for (user_id, present) in by_user {
            if present.len() < 2 {
                continue;
            }
            let candidates = RelationshipDetector::detect(&combined, &present);
            written += RelationshipDetector::persist(&self.entities, user_id, &candidates).await;
        }
        Ok(written)
    }

    fn emit(&self, event_type: EventType, data: serde_json::Value) {
        if let Some(bus) = &self.bus {
            bus.broadcast(BroadcastEvent::new(event_type, data).with_source("pipeline"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contexts_found_for_each_occurrence() {
        let text = "Putin spoke. Later, Putin left.";
        let contexts = extract_contexts(text, "putin", 200);
        assert_eq!(contexts.len(), 2);
        assert!(contexts[0].contains("Putin spoke"));
    }

    #[test]
    fn context_is_windowed_with_ellipses() {
        let filler = "word ".repeat(100);
        let text = format!("{filler}Putin{filler}");
        let contexts = extract_contexts(&text, "putin", 20);
        assert_eq!(contexts.len(), 1);
        assert!(contexts[0].starts_with("..."));
        assert!(contexts[0].ends_with("..."));
        // Window stays tight: 20 chars each side plus the term and ellipses.
        assert!(contexts[0].chars().count() <= 20 * 2 + 5 + 6 + 2);
    }

    #[test]
    fn empty_term_finds_nothing() {
        assert!(extract_contexts("some text", "", 50).is_empty());
    }

    #[test]
    fn case_insensitive_matching() {
        let contexts = extract_contexts("NATO held talks. nato agreed.", "nato", 50);
        assert_eq!(contexts.len(), 2);
    }

    #[test]
    fn stats_display_is_complete() {
        let stats = ProcessingStats {
            total_items: 10,
            validated: 8,
            validation_failed: 2,
            ranked: 8,
            entities_extracted: 5,
            relationships_found: 3,
            embedded: 7,
            embedding_failed: 1,
            processing_time_ms: 1234.5,
        };
        let text = stats.to_string();
        assert!(text.contains("Validated:          8"));
        assert!(text.contains("Relationships:      3"));
        assert!(text.contains("1235ms") || text.contains("1234ms"));
    }
}
