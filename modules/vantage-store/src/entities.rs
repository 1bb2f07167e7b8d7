use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use vantage_common::{EntityMention, EntityRelationship, RelationshipType, TrackedEntity};

/// Result of an optimistic tracked-entity insert.
#[derive(Debug, Clone)]
pub enum TrackOutcome {
    /// A new row was inserted.
    Inserted(TrackedEntity),
    /// A row already existed (matched by canonical id or the unique
    /// `(user_id, name_lower)` constraint); it is returned instead.
    Existing(TrackedEntity),
}

impl TrackOutcome {
    pub fn entity(&self) -> &TrackedEntity {
        match self {
            TrackOutcome::Inserted(e) | TrackOutcome::Existing(e) => e,
        }
    }
}

/// Persistence for tracked entities, mentions, and relationships.
#[derive(Clone)]
pub struct EntityStore {
    pool: PgPool,
}

impl EntityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All tracked entities, optionally scoped to one owner.
    pub async fn list_tracked(&self, user_id: Option<Uuid>) -> Result<Vec<TrackedEntity>> {
        let rows = match user_id {
            Some(uid) => {
                sqlx::query("SELECT * FROM tracked_entities WHERE user_id = $1")
                    .bind(uid)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM tracked_entities")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(row_to_entity).collect()
    }

    /// Lookup by canonical knowledge-base id. This is the preferred dedup
    /// key: it matches across name variations of the same entity.
    pub async fn find_by_canonical_id(
        &self,
        user_id: Uuid,
        canonical_id: &str,
    ) -> Result<Option<TrackedEntity>> {
        let row = sqlx::query(
            "SELECT * FROM tracked_entities
             WHERE user_id = $1 AND metadata->>'canonical_id' = $2",
        )
        .bind(user_id)
        .bind(canonical_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_entity).transpose()
    }

    pub async fn find_by_name_lower(
        &self,
        user_id: Uuid,
        name_lower: &str,
    ) -> Result<Option<TrackedEntity>> {
        let row = sqlx::query(
            "SELECT * FROM tracked_entities WHERE user_id = $1 AND name_lower = $2",
        )
        .bind(user_id)
        .bind(name_lower)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_entity).transpose()
    }

    /// Insert a tracked entity optimistically. Dedup order: canonical id
    /// first when present, then the unique-constraint on
    /// `(user_id, name_lower)` — a conflict there resolves to Existing
    /// rather than an error, and never aborts the caller's batch.
    pub async fn track(&self, entity: TrackedEntity) -> Result<TrackOutcome> {
        if let Some(canonical_id) = entity.canonical_id() {
            if let Some(existing) = self
                .find_by_canonical_id(entity.user_id, canonical_id)
                .await?
            {
                debug!(
                    canonical_id,
                    name = %entity.name,
                    "entity already tracked under canonical id"
                );
                return Ok(TrackOutcome::Existing(existing));
            }
        }

        let insert = sqlx::query(
            "INSERT INTO tracked_entities
               (entity_id, user_id, name, name_lower, entity_type, created_at,
                first_seen, last_seen, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(entity.entity_id)
        .bind(entity.user_id)
        .bind(&entity.name)
        .bind(&entity.name_lower)
        .bind(entity.entity_type.as_str())
        .bind(entity.created_at)
        .bind(entity.first_seen)
        .bind(entity.last_seen)
        .bind(&entity.metadata)
        .execute(&self.pool)
        .await;

        match insert {
            Ok(_) => Ok(TrackOutcome::Inserted(entity)),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                let existing = self
                    .find_by_name_lower(entity.user_id, &entity.name_lower)
                    .await?
                    .ok_or_else(|| {
                        anyhow::anyhow!("unique violation but no row for {}", entity.name_lower)
                    })?;
                Ok(TrackOutcome::Existing(existing))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Advance the temporal window of an entity. `first_seen` only moves
    /// back, `last_seen` only forward.
    pub async fn touch_seen(&self, entity_id: Uuid, seen_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE tracked_entities
             SET first_seen = LEAST(COALESCE(first_seen, $2), $2),
                 last_seen = GREATEST(COALESCE(last_seen, $2), $2)
             WHERE entity_id = $1",
        )
        .bind(entity_id)
        .bind(seen_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert one immutable mention row.
    pub async fn insert_mention(&self, mention: &EntityMention) -> Result<()> {
        let (document_id, news_article_id, news_item_id) = mention.target.columns();
        sqlx::query(
            "INSERT INTO entity_mentions
               (mention_id, entity_id, document_id, news_article_id, news_item_id,
                user_id, chunk_id, context, timestamp)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(mention.mention_id)
        .bind(mention.entity_id)
        .bind(document_id)
        .bind(news_article_id)
        .bind(news_item_id)
        .bind(mention.user_id)
        .bind(&mention.chunk_id)
        .bind(&mention.context)
        .bind(mention.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mention count for an owner's entities since `start`, for trend
    /// indicators.
    pub async fn count_mentions_since(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
    ) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM entity_mentions
             WHERE user_id = $1 AND timestamp >= $2",
        )
        .bind(user_id)
        .bind(start)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn count_tracked(&self, user_id: Uuid) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tracked_entities WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Atomic get-or-create for a relationship edge.
    ///
    /// Insert starts at `base_confidence` with mention_count 1. On conflict
    /// the row only moves forward: `last_seen` advances, `mention_count`
    /// increments, and confidence becomes
    /// `LEAST(0.95, GREATEST(confidence, base + 0.05 * mention_count))` —
    /// never lower than before. Self-edges are rejected before touching the
    /// database.
    pub async fn upsert_relationship(
        &self,
        user_id: Uuid,
        source_entity_id: Uuid,
        target_entity_id: Uuid,
        relationship_type: RelationshipType,
        description: &str,
        base_confidence: f64,
    ) -> Result<()> {
        if source_entity_id == target_entity_id {
            anyhow::bail!("self-relationships are disallowed");
        }

        sqlx::query(
            "INSERT INTO entity_relationships
               (id, source_entity_id, target_entity_id, relationship_type, description,
                first_seen, last_seen, mention_count, confidence, user_id, metadata)
             VALUES ($1, $2, $3, $4, $5, now(), now(), 1, $6, $7, '{}'::jsonb)
             ON CONFLICT (source_entity_id, target_entity_id, relationship_type)
             DO UPDATE SET
                 last_seen = GREATEST(entity_relationships.last_seen, now()),
                 mention_count = entity_relationships.mention_count + 1,
                 confidence = LEAST(0.95, GREATEST(
                     entity_relationships.confidence,
                     $6 + 0.05 * (entity_relationships.mention_count + 1)))",
        )
        .bind(Uuid::new_v4())
        .bind(source_entity_id)
        .bind(target_entity_id)
        .bind(relationship_type.as_str())
        .bind(description)
        .bind(base_confidence)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_relationships(&self, user_id: Uuid) -> Result<Vec<EntityRelationship>> {
        let rows = sqlx::query("SELECT * FROM entity_relationships WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_relationship).collect()
    }
}

fn row_to_entity(row: &PgRow) -> Result<TrackedEntity> {
    let entity_type: String = row.try_get("entity_type")?;
    Ok(TrackedEntity {
        entity_id: row.try_get("entity_id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        name_lower: row.try_get("name_lower")?,
        entity_type: entity_type
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?,
        created_at: row.try_get("created_at")?,
        first_seen: row.try_get("first_seen")?,
        last_seen: row.try_get("last_seen")?,
        metadata: row.try_get("metadata")?,
    })
}

fn row_to_relationship(row: &PgRow) -> Result<EntityRelationship> {
    let relationship_type: String = row.try_get("relationship_type")?;
    Ok(EntityRelationship {
        id: row.try_get("id")?,
        source_entity_id: row.try_get("source_entity_id")?,
        target_entity_id: row.try_get("target_entity_id")?,
        relationship_type: relationship_type
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?,
        description: row.try_get("description")?,
        first_seen: row.try_get("first_seen")?,
        last_seen: row.try_get("last_seen")?,
        mention_count: row.try_get("mention_count")?,
        confidence: row.try_get("confidence")?,
        user_id: row.try_get("user_id")?,
        metadata: row.try_get("metadata")?,
    })
}
