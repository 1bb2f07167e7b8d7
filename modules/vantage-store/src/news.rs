use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use vantage_common::{CollectedItem, NewsItem, ProcessedState};

/// Outcome of persisting one adapter batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOutcome {
    pub collected: i64,
    pub new: i64,
    pub duplicate: i64,
}

/// Persistence for collected items with two-step deduplication.
#[derive(Clone)]
pub struct NewsStore {
    pool: PgPool,
}

impl NewsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a batch in collection order inside one transaction.
    ///
    /// Per item: reject on existing `url`, then on existing non-empty
    /// `content_hash`, else insert. Duplicates are counted, not errors.
    /// A commit failure rolls back the whole batch.
    pub async fn persist_batch(&self, items: &[CollectedItem]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome {
            collected: items.len() as i64,
            ..Default::default()
        };

        let mut tx = self.pool.begin().await.context("begin batch transaction")?;

        for item in items {
            let url_exists: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM news_items WHERE url = $1")
                    .bind(&item.url)
                    .fetch_optional(&mut *tx)
                    .await?;
            if url_exists.is_some() {
                outcome.duplicate += 1;
                debug!(url = %item.url, "duplicate (url)");
                continue;
            }

            let hash = item.content_hash();
            if !hash.is_empty() {
                let hash_exists: Option<(Uuid,)> =
                    sqlx::query_as("SELECT id FROM news_items WHERE content_hash = $1")
                        .bind(&hash)
                        .fetch_optional(&mut *tx)
                        .await?;
                if hash_exists.is_some() {
                    outcome.duplicate += 1;
                    debug!(url = %item.url, "duplicate (content hash)");
                    continue;
                }
            }

            let row = NewsItem::from_collected(item, Utc::now());
            sqlx::query(
                "INSERT INTO news_items
                   (id, source_type, source_name, source_url, title, content, summary,
                    url, published_at, collected_at, author, categories, processed,
                    relevance_score, content_hash, embedding_ref, metadata)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
            )
            .bind(row.id)
            .bind(&row.source_type)
            .bind(&row.source_name)
            .bind(&row.source_url)
            .bind(&row.title)
            .bind(&row.content)
            .bind(&row.summary)
            .bind(&row.url)
            .bind(row.published_at)
            .bind(row.collected_at)
            .bind(&row.author)
            .bind(serde_json::to_value(&row.categories)?)
            .bind(row.processed.as_i32())
            .bind(row.relevance_score)
            .bind(&row.content_hash)
            .bind(row.embedding_ref)
            .bind(&row.metadata)
            .execute(&mut *tx)
            .await?;
            outcome.new += 1;
        }

        tx.commit().await.context("commit batch")?;
        info!(
            collected = outcome.collected,
            new = outcome.new,
            duplicate = outcome.duplicate,
            "Batch persisted"
        );
        Ok(outcome)
    }

    /// Fetch up to `limit` pending items, newest-collected first.
    pub async fn fetch_pending(&self, limit: i64) -> Result<Vec<NewsItem>> {
        let rows = sqlx::query(
            "SELECT * FROM news_items
             WHERE processed = 0
             ORDER BY collected_at DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_item).collect()
    }

    pub async fn fetch_by_ids(&self, ids: &[Uuid]) -> Result<Vec<NewsItem>> {
        let rows = sqlx::query("SELECT * FROM news_items WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_item).collect()
    }

    /// Write a relevance score back onto an item.
    pub async fn apply_score(&self, id: Uuid, score: f64) -> Result<()> {
        sqlx::query("UPDATE news_items SET relevance_score = $2 WHERE id = $1")
            .bind(id)
            .bind(score)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Advance processing state. Transitions are forward-only: a row that
    /// already left Pending is never reset here.
    pub async fn mark_processed(&self, ids: &[Uuid], state: ProcessedState) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE news_items SET processed = $2 WHERE id = ANY($1) AND processed = 0",
        )
        .bind(ids)
        .bind(state.as_i32())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn set_embedding_ref(&self, id: Uuid, vector_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE news_items SET embedding_ref = $2 WHERE id = $1")
            .bind(id)
            .bind(vector_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Count items in a window matching any of the given categories or
    /// source types. Used by trend indicators.
    pub async fn count_matching(
        &self,
        categories: &[String],
        source_types: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM news_items
             WHERE collected_at >= $1 AND collected_at <= $2
               AND (categories ?| $3 OR source_type = ANY($4))",
        )
        .bind(start)
        .bind(end)
        .bind(categories)
        .bind(source_types)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Per-day counts over the window for sparkline rendering.
    /// Days with no items are absent; the caller zero-fills.
    pub async fn daily_counts_matching(
        &self,
        categories: &[String],
        source_types: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(NaiveDate, i64)>> {
        let rows: Vec<(NaiveDate, i64)> = sqlx::query_as(
            "SELECT collected_at::date AS day, COUNT(*)
             FROM news_items
             WHERE collected_at >= $1 AND collected_at <= $2
               AND (categories ?| $3 OR source_type = ANY($4))
             GROUP BY day
             ORDER BY day",
        )
        .bind(start)
        .bind(end)
        .bind(categories)
        .bind(source_types)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Delete an item. Mentions cascade via FK; the caller is responsible
    /// for removing the vector referenced by `embedding_ref`.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM news_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_item(row: &PgRow) -> Result<NewsItem> {
    let categories: serde_json::Value = row.try_get("categories")?;
    Ok(NewsItem {
        id: row.try_get("id")?,
        source_type: row.try_get("source_type")?,
        source_name: row.try_get("source_name")?,
        source_url: row.try_get("source_url")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        summary: row.try_get("summary")?,
        url: row.try_get("url")?,
        published_at: row.try_get("published_at")?,
        collected_at: row.try_get("collected_at")?,
        author: row.try_get("author")?,
        categories: serde_json::from_value(categories).unwrap_or_default(),
        processed: ProcessedState::from_i32(row.try_get("processed")?),
        relevance_score: row.try_get("relevance_score")?,
        content_hash: row.try_get("content_hash")?,
        embedding_ref: row.try_get("embedding_ref")?,
        metadata: row.try_get("metadata")?,
    })
}
