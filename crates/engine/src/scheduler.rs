//! Periodic driver for the baseline, scoring, and retention jobs.
//!
//! The three jobs run as independent long-lived tasks on their own timers
//! and may overlap each other, but a job never overlaps itself: the tick
//! checks-and-sets `is_running` under the job's lock and skips if the
//! previous run is still going. Baseline and scoring fire immediately at
//! startup; retention waits out its first interval. Shutdown stops new
//! ticks and gives in-flight runs a bounded grace period.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use irm_core::error::Result;
use irm_store::Store;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::alerting::{AlertingEngine, AlertingOptions};
use crate::baseline::BaselineEngine;
use crate::ratelimit::RateLimiter;
use crate::retention::{RetentionEngine, RetentionOptions};
use crate::scoring::{score_actor, ScoringEngine};

/// Run-state tracked per job.
#[derive(Debug, Clone, Default)]
pub struct JobState {
    pub is_running: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub run_count: u64,
}

/// Intervals and job parameters, usually derived from [`irm_core::Config`].
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub baseline_interval: Duration,
    pub scoring_interval: Duration,
    pub retention_interval: Duration,
    pub scoring_window_minutes: i64,
    pub alerting: AlertingOptions,
    pub retention: RetentionOptions,
    pub shutdown_grace: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &irm_core::Config) -> Self {
        Self {
            baseline_interval: Duration::from_millis(config.scheduler.baseline_interval_ms),
            scoring_interval: Duration::from_millis(config.scheduler.scoring_interval_ms),
            retention_interval: Duration::from_millis(config.scheduler.retention_interval_ms),
            scoring_window_minutes: config.scoring.window_minutes,
            alerting: AlertingOptions {
                threshold: config.alerting.threshold,
                deduplication_window_minutes: config.alerting.deduplication_window_minutes,
                skip_deduplication: false,
            },
            retention: RetentionOptions {
                default_retention_days: config.retention.default_days,
                dry_run: false,
            },
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

pub struct Scheduler {
    store: Store,
    baselines: BaselineEngine,
    scoring: ScoringEngine,
    alerting: AlertingEngine,
    retention: RetentionEngine,
    limiter: Arc<RateLimiter>,
    settings: SchedulerSettings,
    baseline_state: Arc<Mutex<JobState>>,
    scoring_state: Arc<Mutex<JobState>>,
    retention_state: Arc<Mutex<JobState>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(
        store: Store,
        baselines: BaselineEngine,
        scoring: ScoringEngine,
        alerting: AlertingEngine,
        retention: RetentionEngine,
        limiter: Arc<RateLimiter>,
        settings: SchedulerSettings,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            store,
            baselines,
            scoring,
            alerting,
            retention,
            limiter,
            settings,
            baseline_state: Arc::new(Mutex::new(JobState::default())),
            scoring_state: Arc::new(Mutex::new(JobState::default())),
            retention_state: Arc::new(Mutex::new(JobState::default())),
            shutdown_tx,
            shutdown_rx,
            handles: Vec::new(),
        }
    }

    /// Spawn the three job loops.
    pub fn start(&mut self) {
        info!(
            baseline_interval_ms = self.settings.baseline_interval.as_millis() as u64,
            scoring_interval_ms = self.settings.scoring_interval.as_millis() as u64,
            retention_interval_ms = self.settings.retention_interval.as_millis() as u64,
            "Scheduler starting"
        );

        let baselines = self.baselines.clone();
        let limiter = Arc::clone(&self.limiter);
        self.handles.push(tokio::spawn(run_job(
            "baseline",
            self.settings.baseline_interval,
            true,
            Arc::clone(&self.baseline_state),
            self.shutdown_rx.clone(),
            move || {
                let baselines = baselines.clone();
                let limiter = Arc::clone(&limiter);
                async move {
                    // Piggyback the rate-limiter sweep on the baseline tick.
                    limiter.sweep();
                    let report = baselines.compute_all().await;
                    Ok(format!(
                        "baselines: {} processed, {} succeeded, {} failed",
                        report.processed, report.succeeded, report.failed
                    ))
                }
            },
        )));

        let store = self.store.clone();
        let baselines = self.baselines.clone();
        let scoring = self.scoring.clone();
        let alerting = self.alerting.clone();
        let window_minutes = self.settings.scoring_window_minutes;
        let alert_options = self.settings.alerting.clone();
        self.handles.push(tokio::spawn(run_job(
            "scoring",
            self.settings.scoring_interval,
            true,
            Arc::clone(&self.scoring_state),
            self.shutdown_rx.clone(),
            move || {
                scoring_pass(
                    store.clone(),
                    baselines.clone(),
                    scoring.clone(),
                    alerting.clone(),
                    window_minutes,
                    alert_options.clone(),
                )
            },
        )));

        let retention = self.retention.clone();
        let retention_options = self.settings.retention.clone();
        self.handles.push(tokio::spawn(run_job(
            "retention",
            self.settings.retention_interval,
            false,
            Arc::clone(&self.retention_state),
            self.shutdown_rx.clone(),
            move || {
                let retention = retention.clone();
                let options = retention_options.clone();
                async move {
                    let report = retention.run_retention_cleanup(&options).await;
                    if let Some(error) = report.error {
                        return Err(irm_core::Error::new(
                            irm_core::ErrorCode::JobExecutionFailed,
                            error,
                        ));
                    }
                    Ok(format!(
                        "retention: {} events deleted across {} sources, {} baselines preserved",
                        report.total_events_deleted,
                        report.sources_processed,
                        report.baselines_preserved
                    ))
                }
            },
        )));
    }

    pub fn baseline_state(&self) -> JobState {
        lock_state(&self.baseline_state).clone()
    }

    pub fn scoring_state(&self) -> JobState {
        lock_state(&self.scoring_state).clone()
    }

    pub fn retention_state(&self) -> JobState {
        lock_state(&self.retention_state).clone()
    }

    /// Stop accepting ticks and wait out in-flight runs, up to the grace
    /// period. Anything still running after that is abandoned.
    pub async fn shutdown(mut self) {
        info!("Scheduler shutting down");
        let _ = self.shutdown_tx.send(true);

        let deadline = Instant::now() + self.settings.shutdown_grace;
        for mut handle in self.handles.drain(..) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if timeout(remaining, &mut handle).await.is_err() {
                warn!("Scheduler job did not stop within the grace period; aborting it");
                handle.abort();
            }
        }

        info!("Scheduler stopped");
    }
}

fn lock_state(state: &Arc<Mutex<JobState>>) -> MutexGuard<'_, JobState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared job loop: tick, check-and-set the running flag, run the body,
/// record the outcome. A tick that finds the job running is skipped.
async fn run_job<F, Fut>(
    name: &'static str,
    period: Duration,
    immediate: bool,
    state: Arc<Mutex<JobState>>,
    mut shutdown: watch::Receiver<bool>,
    body: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let mut ticker = if immediate {
        interval(period)
    } else {
        interval_at(Instant::now() + period, period)
    };
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(job = name, period_ms = period.as_millis() as u64, "Job loop started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!(job = name, "Job loop stopping");
                break;
            }
            _ = ticker.tick() => {
                {
                    let mut job = lock_state(&state);
                    if job.is_running {
                        debug!(job = name, "Previous run still in progress; skipping tick");
                        continue;
                    }
                    job.is_running = true;
                }

                let started = Utc::now();
                let outcome = body().await;

                let mut job = lock_state(&state);
                job.is_running = false;
                job.last_run = Some(started);
                job.run_count += 1;

                match outcome {
                    Ok(summary) => {
                        job.last_error = None;
                        info!(job = name, %summary, "Job run completed");
                    }
                    Err(e) => {
                        job.last_error = Some(e.to_string());
                        error!(job = name, error = %e, "Job run failed");
                    }
                }
            }
        }
    }
}

/// One scoring pass: every actor with events inside the lookback window is
/// baselined, scored, persisted, and fed to the alerting engine. Per-actor
/// failures are logged and never abort the pass.
async fn scoring_pass(
    store: Store,
    baselines: BaselineEngine,
    scoring: ScoringEngine,
    alerting: AlertingEngine,
    window_minutes: i64,
    options: AlertingOptions,
) -> Result<String> {
    let reference = Utc::now();
    let since = reference - ChronoDuration::minutes(window_minutes);

    let actor_ids = store.actor_ids_with_events_since(since).await?;
    let rules = store.list_rules().await?;

    let mut scored = 0usize;
    let mut alerts = 0usize;
    let mut failures = 0usize;

    for actor_id in &actor_ids {
        let pass = async {
            let baseline = baselines.get_or_compute(actor_id).await?;
            let events = store.events_for_actor_since(actor_id, since).await?;
            let result = score_actor(actor_id, &baseline, &events, &rules, reference);

            scoring.persist(&result).await?;
            let outcome = alerting.evaluate_and_alert(&result, &options).await?;

            Ok::<bool, irm_core::Error>(outcome.alert_created())
        };

        match pass.await {
            Ok(created) => {
                scored += 1;
                if created {
                    alerts += 1;
                }
            }
            Err(e) => {
                failures += 1;
                warn!(actor_id = %actor_id, error = %e, "Scoring failed for actor");
            }
        }
    }

    Ok(format!(
        "scoring: {} actors scored, {} alerts raised, {} failures",
        scored, alerts, failures
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_derive_from_config() {
        let config = irm_core::Config::default();
        let settings = SchedulerSettings::from_config(&config);

        assert_eq!(settings.baseline_interval, Duration::from_millis(300_000));
        assert_eq!(settings.scoring_interval, Duration::from_millis(300_000));
        assert_eq!(settings.retention_interval, Duration::from_millis(86_400_000));
        assert_eq!(settings.scoring_window_minutes, 60);
        assert_eq!(settings.alerting.threshold, 60);
        assert_eq!(settings.retention.default_retention_days, 90);
        assert_eq!(settings.shutdown_grace, Duration::from_secs(30));
    }

    #[test]
    fn job_state_starts_idle() {
        let state = JobState::default();
        assert!(!state.is_running);
        assert!(state.last_run.is_none());
        assert!(state.last_error.is_none());
        assert_eq!(state.run_count, 0);
    }

    #[tokio::test]
    async fn job_loop_ticks_and_stops_on_shutdown() {
        let state = Arc::new(Mutex::new(JobState::default()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let counter = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let body_counter = Arc::clone(&counter);

        let handle = tokio::spawn(run_job(
            "test",
            Duration::from_millis(10),
            true,
            Arc::clone(&state),
            shutdown_rx,
            move || {
                let counter = Arc::clone(&body_counter);
                async move {
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok("ran".to_string())
                }
            },
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = shutdown_tx.send(true);
        handle.await.unwrap();

        let final_state = lock_state(&state).clone();
        assert!(!final_state.is_running);
        assert!(final_state.run_count >= 2);
        assert!(final_state.last_run.is_some());
        assert!(final_state.last_error.is_none());
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), final_state.run_count);
    }

    #[tokio::test]
    async fn failing_jobs_record_their_error() {
        let state = Arc::new(Mutex::new(JobState::default()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_job(
            "failing",
            Duration::from_millis(10),
            true,
            Arc::clone(&state),
            shutdown_rx,
            || async {
                Err(irm_core::Error::new(
                    irm_core::ErrorCode::JobExecutionFailed,
                    "store unavailable",
                ))
            },
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = shutdown_tx.send(true);
        handle.await.unwrap();

        let final_state = lock_state(&state).clone();
        assert!(final_state.run_count >= 1);
        assert!(final_state
            .last_error
            .as_deref()
            .unwrap()
            .contains("store unavailable"));
    }
}
