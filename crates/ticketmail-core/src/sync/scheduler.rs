//! Run lifecycle: timer and manual triggers, mutual exclusion, abort,
//! retries and checkpoint policy.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::engine::{SyncEngine, SyncRun};
use crate::config::SyncSettings;
use crate::model::SyncLogEntry;
use crate::store::{CheckpointStore, SyncLog};

/// Connection-class failures are retried this many times per invocation.
const CONNECTION_RETRIES: u32 = 1;

/// What the scheduler is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No run active.
    Idle,
    /// A run is active.
    Running,
    /// An abort was requested and the run has not exited yet.
    Aborting,
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The interval timer.
    Timer,
    /// An explicit request.
    Manual,
}

impl Trigger {
    /// Name stored in the sync log.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::Manual => "manual",
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Both folders scanned without errors.
    Completed,
    /// Both folders scanned; some messages or folders failed.
    CompletedWithErrors,
    /// A connection-class failure survived the retry.
    Failed,
    /// Stopped by [`Scheduler::abort`].
    Aborted,
}

impl RunOutcome {
    /// Name stored in the sync log.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

/// Summary of a finished run, kept as the scheduler's last run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// What started it.
    pub trigger: Trigger,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub finished_at: DateTime<Utc>,
    /// Messages before this were ignored.
    pub window_start: DateTime<Utc>,
    /// Engine attempts made (2 after a retry).
    pub attempts: u32,
    /// Messages examined.
    pub processed: usize,
    /// Messages skipped.
    pub skipped: usize,
    /// Replies inserted.
    pub inserted: usize,
    /// Error descriptions, including the fatal one for failed runs.
    pub errors: Vec<String>,
    /// Outcome.
    pub outcome: RunOutcome,
}

impl RunSummary {
    fn to_log_entry(&self) -> SyncLogEntry {
        SyncLogEntry {
            trigger: self.trigger.as_str().to_string(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            processed: self.processed,
            skipped: self.skipped,
            inserted: self.inserted,
            errors: self.errors.clone(),
            outcome: self.outcome.as_str().to_string(),
        }
    }
}

/// Answer to [`Scheduler::trigger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerResult {
    /// The run finished (in any outcome).
    Completed(RunSummary),
    /// Another run is active; nothing was started.
    InProgress,
}

/// Operational snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStatus {
    /// Current state.
    pub state: SchedulerState,
    /// Most recent finished run.
    pub last_run: Option<RunSummary>,
    /// Stored checkpoint, `None` if never synced or unavailable.
    pub checkpoint: Option<DateTime<Utc>>,
}

struct ActiveRun {
    generation: u64,
    trigger: Trigger,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    abandoned: CancellationToken,
}

struct Shared {
    state: SchedulerState,
    generation: u64,
    active: Option<ActiveRun>,
    last_run: Option<RunSummary>,
}

struct Inner {
    engine: Arc<SyncEngine>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    log: Option<Arc<dyn SyncLog>>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
    shared: Mutex<Shared>,
    shutdown: CancellationToken,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the sync run lifecycle.
///
/// At most one run is active. Triggers while a run is active are rejected
/// with [`TriggerResult::InProgress`], never queued.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates an idle scheduler. Without a checkpoint store every run
    /// behaves as if never synced; without a log store runs are only traced.
    #[must_use]
    pub fn new(
        engine: Arc<SyncEngine>,
        checkpoints: Option<Arc<dyn CheckpointStore>>,
        log: Option<Arc<dyn SyncLog>>,
        clock: Arc<dyn Clock>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                checkpoints,
                log,
                clock,
                settings,
                shared: Mutex::new(Shared {
                    state: SchedulerState::Idle,
                    generation: 0,
                    active: None,
                    last_run: None,
                }),
                shutdown: CancellationToken::new(),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.inner.lock().state
    }

    /// State, last run and stored checkpoint.
    pub async fn status(&self) -> SchedulerStatus {
        let (state, last_run) = {
            let shared = self.inner.lock();
            (shared.state, shared.last_run.clone())
        };
        SchedulerStatus {
            state,
            last_run,
            checkpoint: self.inner.load_checkpoint().await,
        }
    }

    /// Starts a run and waits for it, or returns
    /// [`TriggerResult::InProgress`] without side effects if one is active.
    ///
    /// If the run is abandoned after an abort, this returns the aborted
    /// summary without waiting for the run to exit.
    pub async fn trigger(&self, trigger: Trigger) -> TriggerResult {
        let (generation, cancel, abandoned) = {
            let mut shared = self.inner.lock();
            if shared.state != SchedulerState::Idle {
                info!(trigger = trigger.as_str(), "sync already in progress");
                return TriggerResult::InProgress;
            }
            shared.generation += 1;
            let active = ActiveRun {
                generation: shared.generation,
                trigger,
                started_at: self.inner.clock.now(),
                cancel: CancellationToken::new(),
                abandoned: CancellationToken::new(),
            };
            let handles = (active.generation, active.cancel.clone(), active.abandoned.clone());
            shared.state = SchedulerState::Running;
            shared.active = Some(active);
            handles
        };

        let inner = Arc::clone(&self.inner);
        let run = tokio::spawn(async move { inner.execute(trigger, generation, cancel).await });

        tokio::select! {
            joined = run => match joined {
                Ok(summary) => TriggerResult::Completed(summary),
                Err(err) => {
                    warn!(error = %err, "sync task did not complete");
                    let summary = self.inner.abandon(generation, &format!("sync task failed: {err}"));
                    if let Some(summary) = &summary {
                        self.inner.append_log(summary).await;
                    }
                    TriggerResult::Completed(summary.unwrap_or_else(|| self.inner.placeholder(trigger)))
                }
            },
            () = abandoned.cancelled() => {
                let summary = self.inner.lock().last_run.clone();
                TriggerResult::Completed(summary.unwrap_or_else(|| self.inner.placeholder(trigger)))
            }
        }
    }

    /// Requests the active run to stop.
    ///
    /// The run's connection is dropped at once and the run stops before the
    /// next message. If it has not exited after the abort grace period, the
    /// scheduler resets to idle and stops waiting for it. Returns false if
    /// no run was active.
    pub fn abort(&self) -> bool {
        let generation = {
            let mut shared = self.inner.lock();
            if shared.state != SchedulerState::Running {
                return false;
            }
            let Some(active) = &shared.active else {
                return false;
            };
            active.cancel.cancel();
            let generation = active.generation;
            shared.state = SchedulerState::Aborting;
            generation
        };
        info!(generation, "sync abort requested");

        let inner = Arc::clone(&self.inner);
        let grace = inner.settings.abort_grace_period;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(summary) = inner.abandon(generation, "abandoned after abort grace period") {
                warn!(generation, "sync run did not stop in time, scheduler reset");
                inner.append_log(&summary).await;
            }
        });
        true
    }

    /// Starts the interval timer: first run after the initial delay, then
    /// every interval, skipping ticks missed while a run was active. Does
    /// nothing if sync is disabled or the timer already runs.
    pub fn start(&self) {
        if !self.inner.settings.enabled {
            info!("sync timer disabled");
            return;
        }
        let mut timer = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if timer.is_some() {
            return;
        }

        let scheduler = self.clone();
        let shutdown = self.inner.shutdown.clone();
        let initial_delay = self.inner.settings.initial_delay;
        let period = self.inner.settings.interval;
        *timer = Some(tokio::spawn(async move {
            info!(
                initial_delay_secs = initial_delay.as_secs(),
                interval_secs = period.as_secs(),
                "sync timer started"
            );
            tokio::select! {
                () = shutdown.cancelled() => return,
                () = tokio::time::sleep(initial_delay) => {}
            }

            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        info!("sync timer stopped");
                        return;
                    }
                    _ = interval.tick() => {
                        if scheduler.trigger(Trigger::Timer).await == TriggerResult::InProgress {
                            debug!("timer tick skipped, run in progress");
                        }
                    }
                }
            }
        }));
    }

    /// Stops the timer, aborts an active run and waits for the timer task.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.abort();
        let timer = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(timer) = timer {
            if let Err(err) = timer.await {
                warn!(error = %err, "sync timer task failed");
            }
        }
        info!("scheduler shut down");
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn execute(
        &self,
        trigger: Trigger,
        generation: u64,
        cancel: CancellationToken,
    ) -> RunSummary {
        let started_at = self.clock.now();
        let window_start = self
            .load_checkpoint()
            .await
            .unwrap_or_else(|| rewind(started_at, self.settings.initial_lookback));
        info!(
            trigger = trigger.as_str(),
            window_start = %window_start,
            "sync run started"
        );

        let mut attempts = 0;
        let result = loop {
            attempts += 1;
            match self.engine.run(window_start, started_at, &cancel).await {
                Err(err)
                    if err.is_connection_failure()
                        && attempts <= CONNECTION_RETRIES
                        && !cancel.is_cancelled() =>
                {
                    warn!(error = %err, attempt = attempts, "sync connection failed, retrying");
                }
                other => break other,
            }
        };

        let mut summary = RunSummary {
            trigger,
            started_at,
            finished_at: self.clock.now(),
            window_start,
            attempts,
            processed: 0,
            skipped: 0,
            inserted: 0,
            errors: Vec::new(),
            outcome: RunOutcome::Failed,
        };
        match result {
            Ok(run) => {
                summary.outcome = outcome_of(&run);
                summary.processed = run.processed();
                summary.skipped = run.skipped();
                summary.inserted = run.inserted();
                summary.errors = run.errors();
            }
            Err(err) => {
                warn!(error = %err, attempts, "sync run failed");
                summary.errors.push(err.to_string());
            }
        }

        self.advance_checkpoint(&summary).await;
        self.finish(generation, summary).await
    }

    async fn advance_checkpoint(&self, summary: &RunSummary) {
        let next = match summary.outcome {
            RunOutcome::Completed => summary.started_at,
            RunOutcome::CompletedWithErrors => {
                rewind(summary.started_at, self.settings.safety_margin)
            }
            RunOutcome::Failed | RunOutcome::Aborted => return,
        };
        let Some(store) = &self.checkpoints else {
            return;
        };
        match store.set(next).await {
            Ok(()) => debug!(checkpoint = %next, "checkpoint stored"),
            Err(err) => warn!(error = %err, "failed to store sync checkpoint"),
        }
    }

    /// Records the summary unless the run was abandoned meanwhile.
    async fn finish(&self, generation: u64, summary: RunSummary) -> RunSummary {
        let current = {
            let mut shared = self.lock();
            let current = shared
                .active
                .as_ref()
                .is_some_and(|active| active.generation == generation);
            if current {
                shared.active = None;
                shared.state = SchedulerState::Idle;
                shared.last_run = Some(summary.clone());
            }
            current
        };

        if current {
            info!(
                outcome = summary.outcome.as_str(),
                processed = summary.processed,
                inserted = summary.inserted,
                errors = summary.errors.len(),
                "sync run finished"
            );
            self.append_log(&summary).await;
        } else {
            debug!(generation, "abandoned sync run exited");
        }
        summary
    }

    /// Force-resets to idle if `generation` is still active, returning the
    /// aborted summary recorded for it.
    fn abandon(&self, generation: u64, reason: &str) -> Option<RunSummary> {
        let mut shared = self.lock();
        if shared
            .active
            .as_ref()
            .is_none_or(|active| active.generation != generation)
        {
            return None;
        }
        let active = shared.active.take()?;
        active.cancel.cancel();
        let summary = RunSummary {
            trigger: active.trigger,
            started_at: active.started_at,
            finished_at: self.clock.now(),
            window_start: active.started_at,
            attempts: 0,
            processed: 0,
            skipped: 0,
            inserted: 0,
            errors: vec![reason.to_string()],
            outcome: RunOutcome::Aborted,
        };
        shared.state = SchedulerState::Idle;
        shared.last_run = Some(summary.clone());
        drop(shared);
        active.abandoned.cancel();
        Some(summary)
    }

    fn placeholder(&self, trigger: Trigger) -> RunSummary {
        let now = self.clock.now();
        RunSummary {
            trigger,
            started_at: now,
            finished_at: now,
            window_start: now,
            attempts: 0,
            processed: 0,
            skipped: 0,
            inserted: 0,
            errors: Vec::new(),
            outcome: RunOutcome::Aborted,
        }
    }

    async fn load_checkpoint(&self) -> Option<DateTime<Utc>> {
        let store = self.checkpoints.as_ref()?;
        match store.get().await {
            Ok(checkpoint) => checkpoint,
            Err(err) => {
                warn!(error = %err, "failed to read sync checkpoint, treating as never synced");
                None
            }
        }
    }

    async fn append_log(&self, summary: &RunSummary) {
        let Some(log) = &self.log else {
            return;
        };
        if let Err(err) = log.append(&summary.to_log_entry()).await {
            warn!(error = %err, "failed to write sync log entry");
        }
    }
}

fn outcome_of(run: &SyncRun) -> RunOutcome {
    if run.aborted {
        RunOutcome::Aborted
    } else if run.has_errors() {
        RunOutcome::CompletedWithErrors
    } else {
        RunOutcome::Completed
    }
}

fn rewind(at: DateTime<Utc>, by: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|by| at.checked_sub_signed(by))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
