use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use vantage_common::{CollectionRun, RunStatus};

/// Persistence for collection run records. One row per adapter invocation,
/// finalized exactly once.
#[derive(Clone)]
pub struct RunStore {
    pool: PgPool,
}

impl RunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record a run that has just started.
    pub async fn insert_running(&self, run: &CollectionRun) -> Result<()> {
        sqlx::query(
            "INSERT INTO collection_runs
               (id, collector_type, collector_name, started_at, completed_at, status,
                items_collected, items_new, items_duplicate, items_filtered,
                error_message, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(run.id)
        .bind(&run.collector_type)
        .bind(&run.collector_name)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(run.status.to_string())
        .bind(run.items_collected)
        .bind(run.items_new)
        .bind(run.items_duplicate)
        .bind(run.items_filtered)
        .bind(&run.error_message)
        .bind(&run.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Transition a running row to its terminal state. The row is never
    /// touched again after this.
    pub async fn finalize(&self, run: &CollectionRun) -> Result<()> {
        sqlx::query(
            "UPDATE collection_runs
             SET completed_at = $2, status = $3, items_collected = $4,
                 items_new = $5, items_duplicate = $6, items_filtered = $7,
                 error_message = $8
             WHERE id = $1 AND status = 'running'",
        )
        .bind(run.id)
        .bind(run.completed_at)
        .bind(run.status.to_string())
        .bind(run.items_collected)
        .bind(run.items_new)
        .bind(run.items_duplicate)
        .bind(run.items_filtered)
        .bind(&run.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// (successful, total) run counts since `start`, for collection health.
    pub async fn success_counts_since(&self, start: DateTime<Utc>) -> Result<(i64, i64)> {
        let (successful,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM collection_runs
             WHERE started_at >= $1 AND status = 'completed'",
        )
        .bind(start)
        .fetch_one(&self.pool)
        .await?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM collection_runs WHERE started_at >= $1")
                .bind(start)
                .fetch_one(&self.pool)
                .await?;

        Ok((successful, total))
    }

    /// Total new items landed by completed runs since `start`.
    pub async fn items_new_since(&self, start: DateTime<Utc>) -> Result<i64> {
        let (sum,): (Option<i64>,) = sqlx::query_as(
            "SELECT SUM(items_new) FROM collection_runs
             WHERE started_at >= $1 AND status = 'completed'",
        )
        .bind(start)
        .fetch_one(&self.pool)
        .await?;
        Ok(sum.unwrap_or(0))
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<(Uuid, String, String)>> {
        let rows: Vec<(Uuid, String, String)> = sqlx::query_as(
            "SELECT id, collector_name, status FROM collection_runs
             ORDER BY started_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Finalize helper: stamp the terminal state onto an owned run value.
pub fn complete_run(mut run: CollectionRun, outcome_new: i64, duplicate: i64) -> CollectionRun {
    run.status = RunStatus::Completed;
    run.completed_at = Some(Utc::now());
    run.items_new = outcome_new;
    run.items_duplicate = duplicate;
    run
}

/// Finalize helper for the failure path.
pub fn fail_run(mut run: CollectionRun, error: &str) -> CollectionRun {
    run.status = RunStatus::Failed;
    run.completed_at = Some(Utc::now());
    run.error_message = Some(error.to_string());
    run
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_run_sets_terminal_fields() {
        let run = CollectionRun::begin("rss", "RSS Feeds");
        let done = complete_run(run, 5, 2);
        assert_eq!(done.status, RunStatus::Completed);
        assert!(done.completed_at.is_some());
        assert_eq!(done.items_new, 5);
        assert_eq!(done.items_duplicate, 2);
        assert!(done.error_message.is_none());
    }

    #[test]
    fn fail_run_records_error() {
        let run = CollectionRun::begin("gdelt", "GDELT");
        let failed = fail_run(run, "connection refused");
        assert_eq!(failed.status, RunStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("connection refused"));
        assert!(failed.completed_at.is_some());
    }
}
