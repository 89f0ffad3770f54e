//! Periodic reconciliation. Five idempotent loops repair drift between the
//! local rows and the venue; each loop has a single-flight guard so manual
//! triggers and timers never overlap a running pass.

pub mod balance_sync;
pub mod orphan_cleanup;
pub mod pnl_backfill;
pub mod position_audit;
pub mod status_sync;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::PgPool;
use tokio::sync::{mpsc, Mutex};

use crate::venue::FuturesVenue;

pub const LOOP_NAMES: [&str; 5] = [
    "status_sync",
    "pnl_backfill",
    "orphan_cleanup",
    "balance_sync",
    "position_audit",
];

#[derive(Debug, Clone)]
pub struct SyncIntervals {
    pub status_sync: Duration,
    pub pnl_backfill: Duration,
    pub orphan_cleanup: Duration,
    pub balance_sync: Duration,
    pub position_audit: Duration,
}

impl Default for SyncIntervals {
    fn default() -> Self {
        Self {
            status_sync: Duration::from_secs(24 * 60),
            pnl_backfill: Duration::from_secs(3600),
            orphan_cleanup: Duration::from_secs(2 * 3600),
            balance_sync: Duration::from_secs(300),
            position_audit: Duration::from_secs(300),
        }
    }
}

#[derive(Default)]
struct LoopState {
    running: AtomicBool,
    runs: AtomicI64,
    failures: AtomicI64,
    last_run: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

pub struct Scheduler {
    pool: PgPool,
    venue: Arc<dyn FuturesVenue>,
    intervals: SyncIntervals,
    states: HashMap<&'static str, Arc<LoopState>>,
}

impl Scheduler {
    pub fn new(pool: PgPool, venue: Arc<dyn FuturesVenue>, intervals: SyncIntervals) -> Arc<Self> {
        let states = LOOP_NAMES
            .iter()
            .map(|name| (*name, Arc::new(LoopState::default())))
            .collect();
        Arc::new(Self {
            pool,
            venue,
            intervals,
            states,
        })
    }

    /// Spawn one worker per loop plus a consumer for on-demand triggers
    /// (manual API calls and the ingestor's snapshot requests).
    pub fn spawn_all(self: &Arc<Self>, mut trigger_rx: mpsc::Receiver<&'static str>) {
        let schedule = [
            ("status_sync", self.intervals.status_sync),
            ("pnl_backfill", self.intervals.pnl_backfill),
            ("orphan_cleanup", self.intervals.orphan_cleanup),
            ("balance_sync", self.intervals.balance_sync),
            ("position_audit", self.intervals.position_audit),
        ];
        for (name, period) in schedule {
            let scheduler = Arc::clone(self);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await; // skip the immediate tick
                loop {
                    ticker.tick().await;
                    scheduler.run_loop(name).await;
                }
            });
            tracing::info!(loop_name = name, period_secs = period.as_secs(), "Sync loop spawned");
        }

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(name) = trigger_rx.recv().await {
                tracing::info!(loop_name = name, "Manual sync trigger");
                scheduler.run_loop(name).await;
            }
        });
    }

    /// Run one loop to completion. Overlapping invocations are dropped by
    /// the single-flight guard; failures are recorded, never propagated.
    pub async fn run_loop(&self, name: &str) -> bool {
        let Some(state) = self.states.get(name) else {
            tracing::warn!(loop_name = name, "Unknown sync loop");
            return false;
        };
        if state
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(loop_name = name, "Sync loop already running — skipped");
            return false;
        }

        let result = match name {
            "status_sync" => status_sync::run(&self.pool, self.venue.as_ref()).await,
            "pnl_backfill" => pnl_backfill::run(&self.pool, self.venue.as_ref()).await,
            "orphan_cleanup" => orphan_cleanup::run(&self.pool, self.venue.as_ref()).await,
            "balance_sync" => balance_sync::run(&self.pool, self.venue.as_ref()).await,
            "position_audit" => position_audit::run(&self.pool, self.venue.as_ref()).await,
            _ => Ok(json!({})),
        };

        state.runs.fetch_add(1, Ordering::Relaxed);
        *state.last_run.lock().await = Some(Utc::now());
        match result {
            Ok(summary) => {
                *state.last_error.lock().await = None;
                tracing::info!(loop_name = name, summary = %summary, "Sync loop completed");
            }
            Err(e) => {
                state.failures.fetch_add(1, Ordering::Relaxed);
                *state.last_error.lock().await = Some(e.to_string());
                tracing::error!(loop_name = name, error = %e, "Sync loop failed");
            }
        }
        state.running.store(false, Ordering::Release);
        true
    }

    pub fn is_known_loop(name: &str) -> bool {
        LOOP_NAMES.contains(&name)
    }

    /// Snapshot for `GET /scheduler/status`.
    pub async fn status(&self) -> Value {
        let mut loops = serde_json::Map::new();
        for (name, state) in &self.states {
            loops.insert(
                name.to_string(),
                json!({
                    "running": state.running.load(Ordering::Relaxed),
                    "runs": state.runs.load(Ordering::Relaxed),
                    "failures": state.failures.load(Ordering::Relaxed),
                    "last_run": state.last_run.lock().await.clone(),
                    "last_error": state.last_error.lock().await.clone(),
                }),
            );
        }
        Value::Object(loops)
    }
}
