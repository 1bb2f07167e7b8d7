// Automatic entity discovery: NER over stored items, knowledge-base
// linking, and promotion to tracked entities with canonical-id dedup.
// Batch runs hold the extraction slot so only one heavy NER workload
// contends for the model and the knowledge base at a time.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vantage_common::{EntityMention, EntityType, MentionTarget, NewsItem, TrackedEntity};
use vantage_store::{EntityStore, TrackOutcome};

use crate::extractor::{EntityExtractor, ExtractedEntity};
use crate::linker::EntityLinker;
use crate::queue::ExtractionQueueManager;

const MIN_EXTRACTION_CONFIDENCE: f64 = 0.5;
const MIN_LINK_CONFIDENCE: f64 = 0.5;
const MENTION_CONTEXT_CAP: usize = 500;

/// Entity types worth promoting to tracked entities. DATE and
/// FINANCIAL_INSTRUMENT spans are extracted but never tracked.
const TRACKABLE_TYPES: &[EntityType] = &[
    EntityType::Person,
    EntityType::Organization,
    EntityType::GovernmentAgency,
    EntityType::MilitaryUnit,
    EntityType::Location,
    EntityType::PoliticalParty,
    EntityType::CriminalOrganization,
    EntityType::Event,
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionOutcome {
    pub entities_found: usize,
    pub entities_tracked: usize,
    pub entities_existing: usize,
    pub entities_linked: usize,
    pub mentions_created: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchExtractionStats {
    pub items_processed: usize,
    pub items_failed: usize,
    pub outcome: ExtractionOutcome,
}

pub struct AutoExtractor {
    extractor: Arc<EntityExtractor>,
    linker: Option<Arc<EntityLinker>>,
    entities: EntityStore,
    queue: Arc<ExtractionQueueManager>,
}

impl AutoExtractor {
    pub fn new(
        extractor: Arc<EntityExtractor>,
        entities: EntityStore,
        queue: Arc<ExtractionQueueManager>,
    ) -> Self {
        Self {
            extractor,
            linker: None,
            entities,
            queue,
        }
    }

    /// Enable knowledge-base linking of discovered entities.
    pub fn with_linker(mut self, linker: Arc<EntityLinker>) -> Self {
        self.linker = Some(linker);
        self
    }

    /// Extract, link, and track entities from one item. Conflicts with
    /// already-tracked entities resolve quietly; nothing here aborts the
    /// caller's batch.
    pub async fn extract_from_item(
        &self,
        item: &NewsItem,
        user_id: Uuid,
    ) -> Result<ExtractionOutcome> {
        let text = format!("{}. {}", item.title, item.body());
        let extracted = self
            .extractor
            .extract(&text, None, MIN_EXTRACTION_CONFIDENCE, true)
            .await;

        let mut outcome = ExtractionOutcome {
            entities_found: extracted.len(),
            ..Default::default()
        };

        for entity in &extracted {
            if !TRACKABLE_TYPES.contains(&entity.entity_type) {
                continue;
            }
            if entity.normalized.is_empty() {
                continue;
            }

            match self.track_entity(entity, user_id).await {
                Ok((tracked, linked, was_new)) => {
                    if was_new {
                        outcome.entities_tracked += 1;
                    } else {
                        outcome.entities_existing += 1;
                    }
                    if linked {
                        outcome.entities_linked += 1;
                    }

                    let mention = EntityMention {
                        mention_id: Uuid::new_v4(),
                        entity_id: tracked.entity_id,
                        target: MentionTarget::NewsItem(item.id),
                        user_id,
                        chunk_id: format!("{}_0", item.id),
                        context: entity
                            .context
                            .clone()
                            .unwrap_or_default()
                            .chars()
                            .take(MENTION_CONTEXT_CAP)
                            .collect(),
                        timestamp: chrono::Utc::now(),
                    };
                    match self.entities.insert_mention(&mention).await {
                        Ok(()) => outcome.mentions_created += 1,
                        Err(e) => debug!(error = %e, "mention insert skipped"),
                    }

                    let seen_at = item.published_at.unwrap_or(item.collected_at);
                    if let Err(e) = self.entities.touch_seen(tracked.entity_id, seen_at).await {
                        debug!(error = %e, "touch_seen failed");
                    }
                }
                Err(e) => warn!(entity = %entity.normalized, error = %e, "tracking failed"),
            }
        }

        Ok(outcome)
    }

    /// Link (when enabled) and insert-or-find the tracked entity.
    /// Dedup order: canonical id from the knowledge base first, then the
    /// `(user_id, name_lower)` unique constraint.
    async fn track_entity(
        &self,
        entity: &ExtractedEntity,
        user_id: Uuid,
    ) -> Result<(TrackedEntity, bool, bool)> {
        let mut candidate = TrackedEntity::new(user_id, &entity.normalized, entity.entity_type);
        let mut linked = false;

        if let Some(linker) = &self.linker {
            match linker
                .link_entity(&entity.normalized, Some(entity.entity_type), MIN_LINK_CONFIDENCE)
                .await
            {
                Ok(Some(link)) => {
                    linked = true;
                    candidate.metadata = serde_json::json!({
                        "canonical_id": link.canonical_id,
                        "canonical_name": link.label,
                        "description": link.description,
                        "entity_url": link.external_url,
                        "link_confidence": link.confidence,
                    });
                    if let Some(kb_type) = link.entity_type {
                        candidate.entity_type = kb_type;
                    }
                }
                Ok(None) => {}
                Err(e) => debug!(entity = %entity.normalized, error = %e, "linking failed"),
            }
        }

        match self.entities.track(candidate).await? {
            TrackOutcome::Inserted(tracked) => Ok((tracked, linked, true)),
            TrackOutcome::Existing(tracked) => Ok((tracked, linked, false)),
        }
    }

    /// Run extraction over a batch of items under the single extraction
    /// slot, reporting progress as items complete.
    pub async fn batch_extract(
        &self,
        items: &[NewsItem],
        user_id: Uuid,
    ) -> Result<BatchExtractionStats> {
        let mut task = self.queue.acquire_slot().await;
        info!(items = items.len(), task = %task.request_id, "extraction batch starting");

        let mut stats = BatchExtractionStats::default();
        let total = items.len();

        for (index, item) in items.iter().enumerate() {
            match self.extract_from_item(item, user_id).await {
                Ok(outcome) => {
                    stats.items_processed += 1;
                    stats.outcome.entities_found += outcome.entities_found;
                    stats.outcome.entities_tracked += outcome.entities_tracked;
                    stats.outcome.entities_existing += outcome.entities_existing;
                    stats.outcome.entities_linked += outcome.entities_linked;
                    stats.outcome.mentions_created += outcome.mentions_created;
                }
                Err(e) => {
                    stats.items_failed += 1;
                    warn!(item = %item.id, error = %e, "item extraction failed");
                }
            }
            self.queue.update_progress(&mut task, index + 1, total);
        }

        let success = stats.items_failed < total || total == 0;
        self.queue.release_slot(
            task,
            success,
            (!success).then(|| "every item in the batch failed".to_string()),
        );

        info!(
            processed = stats.items_processed,
            failed = stats.items_failed,
            tracked = stats.outcome.entities_tracked,
            "extraction batch complete"
        );
        Ok(stats)
    }
}
