//! Periodic trigger scheduler with persisted single-flight.
//!
//! Once per tick every registered trigger is checked against its ledger entry.
//! A due trigger is claimed with [`RunLedger::try_start`] and its runnable is
//! spawned; the loop never waits for a run to finish. Whatever the runnable
//! returns (including a panic) ends up in the ledger's `last_error`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::ledger::{RunLedger, RunToken, StartOutcome};
use crate::error::{Result, SiteopsError};
use crate::store::blocking;

// ---------------------------------------------------------------------------
// Runnable
// ---------------------------------------------------------------------------

/// Identifies the run a runnable is executing for.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub trigger: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
}

/// Summary a runnable returns when it completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub candidates: usize,
    pub planned: usize,
    /// Candidates skipped because a unit for them was still in flight.
    pub skipped: usize,
    /// Candidates left for a later sweep by the per-sweep unit cap.
    pub deferred: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Units still running when the sweep stopped waiting.
    pub unfinished: usize,
}

/// Work attached to a trigger.
#[async_trait]
pub trait Runnable: Send + Sync + 'static {
    async fn run(&self, ctx: RunContext) -> Result<RunReport>;
}

/// Final record of one fired run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub trigger: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
    pub report: Option<RunReport>,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick: Duration,
    /// Staleness threshold as a multiple of each trigger's interval.
    pub stale_multiplier: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            stale_multiplier: 3,
        }
    }
}

#[derive(Clone)]
struct Trigger {
    name: String,
    interval: Duration,
    runnable: Arc<dyn Runnable>,
}

pub struct Scheduler {
    ledger: RunLedger,
    config: SchedulerConfig,
    triggers: Vec<Trigger>,
}

impl Scheduler {
    pub fn new(ledger: RunLedger, config: SchedulerConfig) -> Self {
        Self {
            ledger,
            config,
            triggers: Vec::new(),
        }
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        interval: Duration,
        runnable: Arc<dyn Runnable>,
    ) -> Result<()> {
        let name = name.into();
        if self.triggers.iter().any(|t| t.name == name) {
            return Err(SiteopsError::DuplicateTrigger(name));
        }
        if interval.is_zero() {
            return Err(SiteopsError::InvalidConfig(format!(
                "trigger '{name}' has a zero interval"
            )));
        }
        debug!(trigger = %name, ?interval, "trigger registered");
        self.triggers.push(Trigger {
            name,
            interval,
            runnable,
        });
        Ok(())
    }

    /// Registered `(name, interval)` pairs in registration order.
    pub fn triggers(&self) -> Vec<(String, Duration)> {
        self.triggers
            .iter()
            .map(|t| (t.name.clone(), t.interval))
            .collect()
    }

    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    fn stale_after(&self, interval: Duration) -> Duration {
        interval.saturating_mul(self.config.stale_multiplier.max(1))
    }

    /// Fire every trigger that is due at `now`. Returns the spawned runs.
    ///
    /// Ledger errors are logged per trigger and never abort the tick.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<JoinHandle<RunOutcome>> {
        let mut fired = Vec::new();
        for trigger in &self.triggers {
            match self.claim(trigger, now, trigger.interval).await {
                Ok(Some(token)) => fired.push(tokio::spawn(execute(
                    self.ledger.clone(),
                    Arc::clone(&trigger.runnable),
                    token,
                ))),
                Ok(None) => {}
                Err(e) => error!(trigger = %trigger.name, error = %e, "ledger check failed"),
            }
        }
        fired
    }

    /// Fire `name` immediately, ignoring its interval but not single-flight.
    ///
    /// Waits for the run and returns its outcome, or `None` if another run
    /// currently holds the trigger.
    pub async fn run_now(&self, name: &str) -> Result<Option<RunOutcome>> {
        let trigger = self
            .triggers
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| SiteopsError::UnknownTrigger(name.to_string()))?;
        match self.claim(trigger, Utc::now(), Duration::ZERO).await? {
            Some(token) => Ok(Some(
                execute(self.ledger.clone(), Arc::clone(&trigger.runnable), token).await,
            )),
            None => Ok(None),
        }
    }

    async fn claim(
        &self,
        trigger: &Trigger,
        now: DateTime<Utc>,
        interval: Duration,
    ) -> Result<Option<RunToken>> {
        let ledger = self.ledger.clone();
        let name = trigger.name.clone();
        let stale_after = self.stale_after(trigger.interval);
        blocking(move || try_claim(&ledger, &name, now, interval, stale_after)).await
    }

    /// Run the tick loop in the background until the handle is shut down.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            info!(
                triggers = self.triggers.len(),
                tick_ms = self.config.tick.as_millis() as u64,
                "scheduler started"
            );
            let mut ticker = interval(self.config.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut running: Vec<JoinHandle<RunOutcome>> = Vec::new();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        running.retain(|h| !h.is_finished());
                        running.extend(self.tick(Utc::now()).await);
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!(in_flight = running.len(), "scheduler stopping, waiting for runs");
            for handle in running {
                let _ = handle.await;
            }
            info!("scheduler stopped");
        });
        SchedulerHandle {
            shutdown_tx,
            handle,
        }
    }
}

/// Handle to a running scheduler loop.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop ticking and wait for in-flight runs to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "scheduler task failed");
        }
    }
}

fn try_claim(
    ledger: &RunLedger,
    name: &str,
    now: DateTime<Utc>,
    interval: Duration,
    stale_after: Duration,
) -> Result<Option<RunToken>> {
    // Cheap read first; only contend for a write transaction when due.
    if let Some(entry) = ledger.get(name)? {
        let due = entry.is_due(now, interval) || entry.is_stale(now, stale_after);
        if !due {
            return Ok(None);
        }
        if entry.running && !entry.is_stale(now, stale_after) {
            debug!(trigger = %name, "previous run still in flight, skipping");
            return Ok(None);
        }
    }

    match ledger.try_start(name, now, interval, stale_after)? {
        StartOutcome::Started(token) => {
            if token.reclaimed {
                warn!(
                    trigger = %name,
                    ?stale_after,
                    "reclaimed stale run; previous owner presumed dead"
                );
            }
            Ok(Some(token))
        }
        StartOutcome::Busy { .. } => {
            debug!(trigger = %name, "lost start race, skipping");
            Ok(None)
        }
        StartOutcome::NotDue => Ok(None),
    }
}

async fn execute(ledger: RunLedger, runnable: Arc<dyn Runnable>, token: RunToken) -> RunOutcome {
    let ctx = RunContext {
        trigger: token.trigger.clone(),
        run_id: token.run_id,
        started_at: token.started_at,
    };
    info!(trigger = %ctx.trigger, run = %ctx.run_id, "trigger fired");

    let joined = tokio::spawn(async move { runnable.run(ctx).await }).await;
    let (report, error) = match joined {
        Ok(Ok(report)) => (Some(report), None),
        Ok(Err(e)) => (None, Some(e.to_string())),
        Err(e) if e.is_panic() => (None, Some("runnable panicked".to_string())),
        Err(e) => (None, Some(e.to_string())),
    };

    let finished_at = Utc::now();
    let owner = token.clone();
    let recorded = error.clone();
    match blocking(move || ledger.finish(&owner, finished_at, recorded)).await {
        Ok(true) => {}
        Ok(false) => warn!(
            trigger = %token.trigger,
            run = %token.run_id,
            "run finished after being reclaimed; ledger left to the new owner"
        ),
        Err(e) => error!(trigger = %token.trigger, error = %e, "failed to record run completion"),
    }

    match (&report, &error) {
        (Some(r), _) => info!(
            trigger = %token.trigger,
            planned = r.planned,
            succeeded = r.succeeded,
            failed = r.failed,
            unfinished = r.unfinished,
            "trigger finished"
        ),
        (None, Some(e)) => warn!(trigger = %token.trigger, error = %e, "trigger failed"),
        (None, None) => {}
    }

    RunOutcome {
        trigger: token.trigger,
        run_id: token.run_id,
        started_at: token.started_at,
        finished_at,
        error,
        report,
    }
}
