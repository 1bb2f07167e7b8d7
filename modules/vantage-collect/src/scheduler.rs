// Per-adapter interval scheduling with health bookkeeping.
// Each registered adapter gets its own loop: run immediately, then sleep
// the interval, cancellable at the sleep point. A failing run never kills
// the loop; it logs, counts, cools down, and resumes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use vantage_common::{CollectionRun, CollectorHealth, VantageError};
use vantage_store::{runs, NewsStore, RunStore};

use crate::adapter::{CollectError, SourceAdapter};
use vantage_common::bus::{
    emit_collection_completed, emit_collection_failed, emit_collection_started, BroadcastBus,
};

/// Pause after an unexpected failure before the loop resumes its interval.
const ERROR_COOLDOWN: Duration = Duration::from_secs(60);
/// Longer pause when the upstream explicitly signalled backoff.
const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(300);

#[derive(Debug, Default)]
struct AdapterState {
    is_running: bool,
    last_run: Option<DateTime<Utc>>,
    last_run_items: i64,
    error_count: u64,
    consecutive_failures: u32,
}

struct Registered {
    adapter: Arc<dyn SourceAdapter>,
    interval: Duration,
    state: Arc<Mutex<AdapterState>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectorStatus {
    pub name: String,
    pub source_type: String,
    pub is_running: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub last_run_items: i64,
    pub error_count: u64,
    pub consecutive_failures: u32,
    pub health: CollectorHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub collector_count: usize,
    pub collectors: Vec<CollectorStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub overall: CollectorHealth,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub total: usize,
    pub is_running: bool,
}

pub struct CollectionScheduler {
    collectors: Mutex<HashMap<String, Arc<Registered>>>,
    news: NewsStore,
    run_store: RunStore,
    bus: Arc<BroadcastBus>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    is_running: AtomicBool,
}

impl CollectionScheduler {
    pub fn new(news: NewsStore, run_store: RunStore, bus: Arc<BroadcastBus>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            collectors: Mutex::new(HashMap::new()),
            news,
            run_store,
            bus,
            shutdown,
            tasks: Mutex::new(Vec::new()),
            is_running: AtomicBool::new(false),
        }
    }

    /// Register an adapter with its run interval. Additive and idempotent:
    /// re-registering a name replaces its entry.
    pub fn register(&self, adapter: Arc<dyn SourceAdapter>, interval: Duration) {
        let name = adapter.name().to_string();
        info!(collector = %name, interval_secs = interval.as_secs(), "registered collector");
        self.collectors.lock().expect("registry lock poisoned").insert(
            name,
            Arc::new(Registered {
                adapter,
                interval,
                state: Arc::new(Mutex::new(AdapterState::default())),
            }),
        );
    }

    pub fn unregister(&self, name: &str) {
        if self
            .collectors
            .lock()
            .expect("registry lock poisoned")
            .remove(name)
            .is_some()
        {
            info!(collector = name, "unregistered collector");
        }
    }

    /// Launch one independent loop per registered adapter.
    pub fn start(&self) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!("scheduler already running");
            return;
        }

        let entries: Vec<Arc<Registered>> = self
            .collectors
            .lock()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect();
        info!(collectors = entries.len(), "starting collection scheduler");

        let mut tasks = self.tasks.lock().expect("task list poisoned");
        for entry in entries {
            let news = self.news.clone();
            let run_store = self.run_store.clone();
            let bus = Arc::clone(&self.bus);
            let mut shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                loop {
                    let cooldown = match run_entry(&news, &run_store, &bus, &entry).await {
                        Ok(_) => None,
                        Err(CollectError::RateLimited) => Some(RATE_LIMIT_COOLDOWN),
                        Err(_) => Some(ERROR_COOLDOWN),
                    };

                    if let Some(pause) = cooldown {
                        tokio::select! {
                            _ = tokio::time::sleep(pause) => {}
                            _ = shutdown.changed() => break,
                        }
                    }

                    tokio::select! {
                        _ = tokio::time::sleep(entry.interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
                info!(collector = entry.adapter.name(), "collector loop stopped");
            }));
        }
    }

    /// Cancel every loop and wait up to `timeout` for them to finish.
    /// Stragglers are abandoned to the runtime.
    pub async fn stop(&self, timeout: Duration) {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("stopping collection scheduler");
        let _ = self.shutdown.send(true);

        let tasks: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.tasks.lock().expect("task list poisoned"));
        let joined = tokio::time::timeout(timeout, futures::future::join_all(tasks)).await;

        if joined.is_err() {
            warn!("scheduler stop timed out; abandoning in-flight loops");
        }
        info!("collection scheduler stopped");
    }

    /// Run every registered adapter once, out-of-band.
    pub async fn run_all_now(&self) -> Vec<CollectionRun> {
        let entries: Vec<Arc<Registered>> = self
            .collectors
            .lock()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect();

        let mut results = Vec::new();
        for entry in entries {
            match run_entry(&self.news, &self.run_store, &self.bus, &entry).await {
                Ok(run) => results.push(run),
                Err(e) => error!(collector = entry.adapter.name(), error = %e, "manual run failed"),
            }
        }
        results
    }

    /// Run one adapter by name, out-of-band.
    pub async fn run_collector_now(&self, name: &str) -> Result<CollectionRun, VantageError> {
        let entry = self
            .collectors
            .lock()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| VantageError::CollectorNotFound(name.to_string()))?;

        run_entry(&self.news, &self.run_store, &self.bus, &entry)
            .await
            .map_err(|e| VantageError::Anyhow(anyhow::anyhow!(e.to_string())))
    }

    pub fn get_status(&self) -> SchedulerStatus {
        let collectors = self.collectors.lock().expect("registry lock poisoned");
        let mut statuses: Vec<CollectorStatus> = collectors
            .values()
            .map(|entry| {
                let state = entry.state.lock().expect("state lock poisoned");
                CollectorStatus {
                    name: entry.adapter.name().to_string(),
                    source_type: entry.adapter.source_type().to_string(),
                    is_running: state.is_running,
                    last_run: state.last_run,
                    last_run_items: state.last_run_items,
                    error_count: state.error_count,
                    consecutive_failures: state.consecutive_failures,
                    health: CollectorHealth::from_consecutive_failures(state.consecutive_failures),
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));

        SchedulerStatus {
            is_running: self.is_running.load(Ordering::SeqCst),
            collector_count: statuses.len(),
            collectors: statuses,
        }
    }

    pub fn get_collector_status(&self, name: &str) -> Option<CollectorStatus> {
        self.get_status()
            .collectors
            .into_iter()
            .find(|c| c.name == name)
    }

    pub fn get_health_summary(&self) -> HealthSummary {
        let status = self.get_status();
        let healthy = status
            .collectors
            .iter()
            .filter(|c| c.health == CollectorHealth::Healthy)
            .count();
        let degraded = status
            .collectors
            .iter()
            .filter(|c| c.health == CollectorHealth::Degraded)
            .count();
        let unhealthy = status
            .collectors
            .iter()
            .filter(|c| c.health == CollectorHealth::Unhealthy)
            .count();

        let overall = if unhealthy > 0 {
            CollectorHealth::Unhealthy
        } else if degraded > 0 {
            CollectorHealth::Degraded
        } else {
            CollectorHealth::Healthy
        };

        HealthSummary {
            overall,
            healthy,
            degraded,
            unhealthy,
            total: status.collector_count,
            is_running: status.is_running,
        }
    }
}

/// One collection run: started event, collect, persist, finalize run
/// row, health bookkeeping, terminal event. Exactly one of
/// completed/failed is emitted per invocation.
async fn run_entry(
    news: &NewsStore,
    run_store: &RunStore,
    bus: &BroadcastBus,
    entry: &Registered,
) -> Result<CollectionRun, CollectError> {
    let adapter = &entry.adapter;
    let started = Utc::now();
    {
        let mut state = entry.state.lock().expect("state lock poisoned");
        state.is_running = true;
    }
    info!(collector = adapter.name(), "collection run starting");
    emit_collection_started(bus, adapter.name(), adapter.source_type());

    let mut run = CollectionRun::begin(adapter.source_type(), adapter.name());
    if let Err(e) = run_store.insert_running(&run).await {
        warn!(collector = adapter.name(), error = %e, "failed to record run start");
    }

    let result = async {
        let items = adapter.collect().await?;
        run.items_collected = items.len() as i64;
        news.persist_batch(&items)
            .await
            .map_err(|e| CollectError::Network(format!("persist failed: {e}")))
    }
    .await;

    let duration = (Utc::now() - started).num_milliseconds() as f64 / 1000.0;
    match result {
        Ok(outcome) => {
            let finalized = runs::complete_run(run, outcome.new, outcome.duplicate);
            if let Err(e) = run_store.finalize(&finalized).await {
                warn!(collector = adapter.name(), error = %e, "failed to finalize run");
            }

            {
                let mut state = entry.state.lock().expect("state lock poisoned");
                state.is_running = false;
                state.last_run = Some(Utc::now());
                state.last_run_items = outcome.new;
                state.consecutive_failures = 0;
            }

            emit_collection_completed(
                bus,
                adapter.name(),
                &finalized.id.to_string(),
                finalized.items_collected,
                finalized.items_new,
                finalized.items_duplicate,
                duration,
            );
            info!(
                collector = adapter.name(),
                collected = finalized.items_collected,
                new = finalized.items_new,
                duplicate = finalized.items_duplicate,
                duration_secs = duration,
                "collection run completed"
            );
            Ok(finalized)
        }
        Err(e) => {
            let finalized = runs::fail_run(run, &e.to_string());
            if let Err(store_err) = run_store.finalize(&finalized).await {
                warn!(collector = adapter.name(), error = %store_err, "failed to finalize run");
            }

            {
                let mut state = entry.state.lock().expect("state lock poisoned");
                state.is_running = false;
                state.error_count += 1;
                state.consecutive_failures += 1;
            }

            emit_collection_failed(bus, adapter.name(), &e.to_string());
            error!(collector = adapter.name(), error = %e, "collection run failed");
            Err(e)
        }
    }
}
