// Extraction slot management. Heavy NER/linking batches contend for the
// model and the external knowledge base, so at most `max_concurrent`
// (default one) run at a time; everyone else waits in line.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use uuid::Uuid;

const RECENT_COMPLETED_CAP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionTask {
    pub request_id: Uuid,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub items_total: usize,
    pub items_processed: usize,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub is_active: bool,
    pub active_task: Option<ExtractionTask>,
    pub queue_size: usize,
    pub recent_completed: Vec<ExtractionTask>,
}

struct State {
    active: Option<ExtractionTask>,
    recent_completed: VecDeque<ExtractionTask>,
}

pub struct ExtractionQueueManager {
    semaphore: Semaphore,
    state: Mutex<State>,
    waiting: AtomicUsize,
}

impl ExtractionQueueManager {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Semaphore::new(max_concurrent.max(1)),
            state: Mutex::new(State {
                active: None,
                recent_completed: VecDeque::new(),
            }),
            waiting: AtomicUsize::new(0),
        }
    }

    /// Block until a slot is free, then install a fresh in-progress task.
    /// The caller must pair this with `release_slot`.
    pub async fn acquire_slot(&self) -> ExtractionTask {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let permit = self.semaphore.acquire().await.expect("semaphore closed");
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        // The permit is re-minted on release; forget this one.
        permit.forget();

        let now = Utc::now();
        let task = ExtractionTask {
            request_id: Uuid::new_v4(),
            status: TaskStatus::InProgress,
            created_at: now,
            started_at: now,
            completed_at: None,
            items_total: 0,
            items_processed: 0,
            error_message: None,
        };

        let mut state = self.state.lock().expect("queue state poisoned");
        state.active = Some(task.clone());
        task
    }

    /// Finalize the task, record it among recent completions, free the slot.
    pub fn release_slot(&self, mut task: ExtractionTask, success: bool, error: Option<String>) {
        task.status = if success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        task.completed_at = Some(Utc::now());
        task.error_message = error;

        {
            let mut state = self.state.lock().expect("queue state poisoned");
            state.recent_completed.push_back(task);
            while state.recent_completed.len() > RECENT_COMPLETED_CAP {
                state.recent_completed.pop_front();
            }
            state.active = None;
        }

        self.semaphore.add_permits(1);
    }

    /// Update progress counters on the caller's task copy and the shared
    /// active record. Cheap; never blocks the worker long.
    pub fn update_progress(&self, task: &mut ExtractionTask, processed: usize, total: usize) {
        task.items_processed = processed;
        task.items_total = total;

        let mut state = self.state.lock().expect("queue state poisoned");
        if let Some(active) = state.active.as_mut() {
            if active.request_id == task.request_id {
                active.items_processed = processed;
                active.items_total = total;
            }
        }
    }

    /// Consistent snapshot for status queries. `queue_size` is the number
    /// of callers currently waiting on a slot — a waiter's externally
    /// visible queue_position is its 1-based index here.
    pub fn get_status(&self) -> QueueStatus {
        let state = self.state.lock().expect("queue state poisoned");
        QueueStatus {
            is_active: state.active.is_some(),
            active_task: state.active.clone(),
            queue_size: self.waiting.load(Ordering::SeqCst),
            recent_completed: state.recent_completed.iter().rev().cloned().collect(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state
            .lock()
            .expect("queue state poisoned")
            .active
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn single_slot_serializes_tasks() {
        let manager = Arc::new(ExtractionQueueManager::new(1));

        let task1 = manager.acquire_slot().await;
        assert_eq!(task1.status, TaskStatus::InProgress);
        assert!(manager.is_active());

        // Second acquisition blocks while the slot is held.
        let manager2 = Arc::clone(&manager);
        let second = tokio::spawn(async move { manager2.acquire_slot().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());

        let status = manager.get_status();
        assert!(status.is_active);
        assert_eq!(status.queue_size, 1);

        manager.release_slot(task1, true, None);
        let task2 = second.await.expect("second task");
        assert_eq!(task2.status, TaskStatus::InProgress);

        let status = manager.get_status();
        assert_eq!(status.queue_size, 0);
        assert_eq!(status.recent_completed.len(), 1);
        assert_eq!(status.recent_completed[0].status, TaskStatus::Completed);

        manager.release_slot(task2, true, None);
    }

    #[tokio::test]
    async fn failed_release_records_error() {
        let manager = Arc::new(ExtractionQueueManager::new(1));
        let task = manager.acquire_slot().await;
        manager.release_slot(task, false, Some("model unavailable".to_string()));

        let status = manager.get_status();
        assert!(!status.is_active);
        assert_eq!(status.recent_completed[0].status, TaskStatus::Failed);
        assert_eq!(
            status.recent_completed[0].error_message.as_deref(),
            Some("model unavailable")
        );
    }

    #[tokio::test]
    async fn recent_completed_is_bounded() {
        let manager = Arc::new(ExtractionQueueManager::new(1));
        for _ in 0..15 {
            let task = manager.acquire_slot().await;
            manager.release_slot(task, true, None);
        }
        let status = manager.get_status();
        assert_eq!(status.recent_completed.len(), RECENT_COMPLETED_CAP);
    }

    #[tokio::test]
    async fn update_progress_reflects_in_status() {
        let manager = Arc::new(ExtractionQueueManager::new(1));
        let mut task = manager.acquire_slot().await;
        manager.update_progress(&mut task, 3, 10);

        let status = manager.get_status();
        let active = status.active_task.expect("active task");
        assert_eq!(active.items_processed, 3);
        assert_eq!(active.items_total, 10);

        manager.release_slot(task, true, None);
    }
}
