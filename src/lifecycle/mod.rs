mod rules;

pub use rules::{RULES, Rule, evaluate};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigOutOfRange, SchedulerConfig};
use crate::model::*;
use crate::store::{ReservationFilter, ReservationStore, StatusPatch, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// A scan is already in flight; this trigger was not queued.
    RunInProgress,
    /// The snapshot could not be read; nothing was evaluated.
    StoreRead(StoreError),
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::RunInProgress => write!(f, "a lifecycle run is already in progress"),
            SchedulerError::StoreRead(e) => write!(f, "lifecycle snapshot failed: {e}"),
        }
    }
}

impl std::error::Error for SchedulerError {}

/// Outcome of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub updated_count: usize,
    pub cancelled_count: usize,
    pub completed_count: usize,
    /// One entry per record whose write failed, prefixed with its id.
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    /// A scan is executing right now.
    pub is_running: bool,
    /// The periodic timer is armed.
    pub active: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub total_runs: u64,
    pub last_result: Option<RunResult>,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct Stats {
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
    total_runs: u64,
    last_result: Option<RunResult>,
    last_error: Option<String>,
}

/// Clears the single-flight flag when the scan ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodic scan that applies the time-based lifecycle rules.
///
/// Owns its timer, single-flight flag and run counters. Timer ticks and
/// manual runs share one flag: a tick that finds a scan in flight is skipped,
/// a manual run gets `SchedulerError::RunInProgress`.
pub struct LifecycleScheduler {
    store: Arc<dyn ReservationStore>,
    config: Mutex<SchedulerConfig>,
    running: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
    stats: Mutex<Stats>,
}

impl LifecycleScheduler {
    /// The timer is not armed until `start` (or `configure` with `enabled`).
    pub fn new(store: Arc<dyn ReservationStore>, config: SchedulerConfig) -> (Arc<Self>, Vec<ConfigOutOfRange>) {
        let (config, notices) = config.clamped();
        for notice in &notices {
            warn!("scheduler config: {notice}");
        }
        let scheduler = Arc::new(Self {
            store,
            config: Mutex::new(config),
            running: AtomicBool::new(false),
            timer: Mutex::new(None),
            stats: Mutex::new(Stats::default()),
        });
        (scheduler, notices)
    }

    pub async fn config(&self) -> SchedulerConfig {
        *self.config.lock().await
    }

    /// Arm the periodic timer. No-op if already armed.
    pub async fn start(self: &Arc<Self>) {
        let mut timer = self.timer.lock().await;
        let mut config = self.config.lock().await;
        config.enabled = true;
        if timer.is_some() {
            debug!("lifecycle scheduler already started");
            return;
        }
        *timer = Some(self.arm(&config).await);
        info!("lifecycle scheduler started: every {} min", config.interval_minutes);
    }

    /// Disarm the timer. A scan already in flight runs to completion.
    pub async fn stop(&self) {
        let mut timer = self.timer.lock().await;
        self.config.lock().await.enabled = false;
        if let Some(handle) = timer.take() {
            handle.abort();
            self.stats.lock().await.next_run = None;
            info!("lifecycle scheduler stopped");
        }
    }

    /// Apply a new configuration. Out-of-range values are clamped and returned.
    /// With `enabled` the timer is (re)armed on the new interval, without it the timer is disarmed.
    pub async fn configure(self: &Arc<Self>, requested: SchedulerConfig) -> Vec<ConfigOutOfRange> {
        let (config, notices) = requested.clamped();
        for notice in &notices {
            warn!("scheduler config: {notice}");
        }

        let mut timer = self.timer.lock().await;
        *self.config.lock().await = config;
        if let Some(handle) = timer.take() {
            handle.abort();
        }
        if config.enabled {
            *timer = Some(self.arm(&config).await);
        } else {
            self.stats.lock().await.next_run = None;
        }
        info!(
            "lifecycle scheduler configured: enabled={} interval={}min timeout={}d expiration={}h completion={}h",
            config.enabled,
            config.interval_minutes,
            config.creation_timeout_days,
            config.expiration_window_hours,
            config.completion_window_hours
        );
        notices
    }

    pub async fn status(&self) -> SchedulerStatus {
        let active = self.timer.lock().await.is_some();
        let stats = self.stats.lock().await;
        SchedulerStatus {
            is_running: self.running.load(Ordering::Acquire),
            active,
            last_run: stats.last_run,
            next_run: stats.next_run,
            total_runs: stats.total_runs,
            last_result: stats.last_result.clone(),
            last_error: stats.last_error.clone(),
        }
    }

    /// Manual trigger: the same scan a tick runs, awaited by the caller.
    pub async fn run_once(&self) -> Result<RunResult, SchedulerError> {
        self.run_once_at(Utc::now()).await
    }

    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<RunResult, SchedulerError> {
        let _guard = RunGuard::acquire(&self.running).ok_or(SchedulerError::RunInProgress)?;
        let config = self.config().await;
        let outcome = self.scan(now, &config).await;

        let mut stats = self.stats.lock().await;
        stats.total_runs += 1;
        stats.last_run = Some(now);
        match &outcome {
            Ok(result) => {
                stats.last_result = Some(result.clone());
                stats.last_error = None;
            }
            Err(e) => stats.last_error = Some(e.to_string()),
        }
        let label = if outcome.is_ok() { "ok" } else { "error" };
        metrics::counter!(crate::observability::LIFECYCLE_RUNS_TOTAL, "status" => label).increment(1);
        outcome
    }

    /// Spawn the timer task. The first tick fires one interval from now.
    async fn arm(self: &Arc<Self>, config: &SchedulerConfig) -> JoinHandle<()> {
        let period = config.interval();
        self.stats.lock().await.next_run = Some(Utc::now() + chrono::Duration::minutes(config.interval_minutes as i64));
        tokio::spawn(timer_loop(Arc::downgrade(self), period))
    }

    async fn tick(self: Arc<Self>) {
        let next = {
            let config = self.config.lock().await;
            Utc::now() + chrono::Duration::minutes(config.interval_minutes as i64)
        };
        self.stats.lock().await.next_run = Some(next);

        match self.run_once().await {
            Ok(_) => {}
            Err(SchedulerError::RunInProgress) => {
                debug!("lifecycle tick skipped: previous run still in progress");
                metrics::counter!(crate::observability::LIFECYCLE_TICKS_SKIPPED_TOTAL).increment(1);
            }
            // Already logged by the scan; the next tick retries.
            Err(SchedulerError::StoreRead(_)) => {}
        }
    }

    /// Evaluate every active reservation in one snapshot and write the transitions, one by one.
    async fn scan(&self, now: DateTime<Utc>, config: &SchedulerConfig) -> Result<RunResult, SchedulerError> {
        let filter = ReservationFilter {
            active_only: true,
            ..ReservationFilter::all()
        };
        let snapshot = self.store.list(&filter).await.map_err(|e| {
            error!("lifecycle run aborted, snapshot read failed: {e}");
            metrics::counter!(crate::observability::LIFECYCLE_RUN_ERRORS_TOTAL, "kind" => "read")
                .increment(1);
            SchedulerError::StoreRead(e)
        })?;

        let mut result = RunResult::default();
        for r in &snapshot {
            let Some(reason) = evaluate(r, now, config) else {
                continue;
            };
            let target = reason.target();
            match self.store.update(r.id, StatusPatch::from_to(r.status, target)).await {
                Ok(_) => {
                    result.updated_count += 1;
                    match target {
                        ReservationStatus::Completed => result.completed_count += 1,
                        _ => result.cancelled_count += 1,
                    }
                    info!(
                        "reservation {} ({}) {} -> {}: {}",
                        r.id,
                        r.space_type,
                        r.status.label(),
                        target.label(),
                        reason.as_str()
                    );
                    metrics::counter!(
                        crate::observability::LIFECYCLE_TRANSITIONS_TOTAL,
                        "reason" => reason.as_str()
                    )
                    .increment(1);
                }
                Err(e) => {
                    warn!("lifecycle transition {} for {} failed: {e}", reason.as_str(), r.id);
                    metrics::counter!(crate::observability::LIFECYCLE_RUN_ERRORS_TOTAL, "kind" => "write")
                        .increment(1);
                    result.errors.push(format!("{}: {e}", r.id));
                }
            }
        }

        info!(
            "lifecycle run: {} scanned, {} updated ({} cancelled, {} completed), {} errors",
            snapshot.len(),
            result.updated_count,
            result.cancelled_count,
            result.completed_count,
            result.errors.len()
        );
        Ok(result)
    }
}

/// Each tick's scan runs in its own task so disarming the timer never cuts a scan short.
async fn timer_loop(scheduler: Weak<LifecycleScheduler>, period: std::time::Duration) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let Some(scheduler) = scheduler.upgrade() else {
            return;
        };
        tokio::spawn(scheduler.tick());
    }
}
