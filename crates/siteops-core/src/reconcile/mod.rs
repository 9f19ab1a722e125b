//! Entity reconcilers and the sweep that drives them.
//!
//! A sweep loads candidates, plans at most one [`WorkUnit`] per candidate,
//! submits the units to the shared [`Dispatcher`], and applies each result
//! through the reconciler as it lands. Candidates whose previous unit is still
//! running are skipped. The sweep waits for its units up to a bound and then
//! reports; units still running keep going and apply their results later.

pub mod autopost;
pub mod domain_status;
pub mod post_publisher;
pub mod server_health;

pub use autopost::AutopostPlanner;
pub use domain_status::{DomainPolicy, DomainStatusReconciler};
pub use post_publisher::{PostPublisher, PublisherPolicy};
pub use server_health::{HealthPolicy, ServerHealthChecker};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, instrument, warn};

use crate::entity::{Domain, Post, Server, Site};
use crate::error::Result;
use crate::orchestrator::{
    Dispatcher, RunContext, RunReport, Runnable, UnitHandle, UnitJob, UnitOutcome, UnitReport,
    WorkUnit,
};
use crate::store::blocking;
use crate::types::{EntityRef, ReconcilerKind};

/// An entity selected for reconciliation in this sweep.
#[derive(Debug, Clone)]
pub enum Candidate {
    Domain(Domain),
    Post(Post),
    Site(Site),
    Server(Server),
}

impl Candidate {
    pub fn target(&self) -> EntityRef {
        match self {
            Candidate::Domain(d) => EntityRef::Domain(d.id),
            Candidate::Post(p) => EntityRef::Post(p.id),
            Candidate::Site(s) => EntityRef::Site(s.id),
            Candidate::Server(s) => EntityRef::Server(s.id),
        }
    }
}

#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    fn kind(&self) -> ReconcilerKind;

    /// Entities that may need work at `now`.
    fn select_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Candidate>>;

    /// Zero or one unit for `candidate`. May persist the transition that
    /// starts the unit's work (e.g. entering a pending state).
    fn plan_unit(
        &self,
        trigger: &str,
        candidate: Candidate,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkUnit>>;

    /// Perform the unit's side effect. `Err` carries the failure message.
    async fn execute(&self, unit: &WorkUnit) -> std::result::Result<UnitOutcome, String>;

    /// Persist the state transition implied by a finished unit.
    fn apply_result(&self, report: &UnitReport) -> Result<()>;

    /// Most units one sweep may plan. Candidates past the cap wait for the
    /// next sweep; in-flight skips do not count against it.
    fn max_units_per_sweep(&self) -> Option<usize> {
        None
    }
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

/// Run one sweep of `reconciler` and wait up to `max_wait` for its units.
#[instrument(skip_all, fields(reconciler = %reconciler.kind(), trigger = %ctx.trigger))]
pub async fn sweep(
    reconciler: Arc<dyn Reconciler>,
    dispatcher: &Dispatcher,
    ctx: &RunContext,
    max_wait: Duration,
) -> Result<RunReport> {
    let now = ctx.started_at;
    let selector = Arc::clone(&reconciler);
    let candidates = blocking(move || selector.select_candidates(now)).await?;
    let mut report = RunReport {
        candidates: candidates.len(),
        ..RunReport::default()
    };
    debug!(candidates = report.candidates, "sweep started");

    let cap = reconciler.max_units_per_sweep();
    let mut handles: Vec<UnitHandle> = Vec::new();
    for candidate in candidates {
        let target = candidate.target();
        if dispatcher.is_in_flight(&target) {
            debug!(%target, "unit still in flight, skipping");
            report.skipped += 1;
            continue;
        }
        if cap.is_some_and(|max| report.planned >= max) {
            report.deferred += 1;
            continue;
        }
        let planner = Arc::clone(&reconciler);
        let trigger = ctx.trigger.clone();
        let planned = blocking(move || planner.plan_unit(&trigger, candidate, now)).await;
        let unit = match planned {
            Ok(Some(unit)) => unit,
            Ok(None) => continue,
            Err(e) => {
                // One bad entity must not stall the rest of the sweep.
                warn!(%target, error = %e, "planning failed");
                report.failed += 1;
                continue;
            }
        };
        report.planned += 1;

        let worker = Arc::clone(&reconciler);
        let job_unit = unit.clone();
        let job: UnitJob = Box::pin(async move { worker.execute(&job_unit).await });

        let applier = Arc::clone(&reconciler);
        let on_complete = Box::new(move |r: &UnitReport| {
            if let Err(e) = applier.apply_result(r) {
                warn!(unit = %r.unit, error = %e, "failed to apply unit result");
            }
        });
        handles.push(dispatcher.submit(unit, job, on_complete).await?);
    }

    let mut pending: FuturesUnordered<_> = handles.into_iter().map(UnitHandle::wait).collect();
    let deadline = tokio::time::Instant::now() + max_wait;
    while !pending.is_empty() {
        match tokio::time::timeout_at(deadline, pending.next()).await {
            Ok(Some(Some(unit_report))) => {
                if unit_report.is_success() {
                    report.succeeded += 1;
                } else {
                    report.failed += 1;
                }
            }
            Ok(Some(None)) => report.failed += 1,
            Ok(None) | Err(_) => break,
        }
    }
    report.unfinished = pending.len();

    info!(
        candidates = report.candidates,
        planned = report.planned,
        skipped = report.skipped,
        deferred = report.deferred,
        succeeded = report.succeeded,
        failed = report.failed,
        unfinished = report.unfinished,
        "sweep done"
    );
    Ok(report)
}

/// Adapts a reconciler to the scheduler's [`Runnable`] seam.
pub struct ReconcilerRunnable {
    reconciler: Arc<dyn Reconciler>,
    dispatcher: Dispatcher,
    max_wait: Duration,
}

impl ReconcilerRunnable {
    pub fn new(reconciler: Arc<dyn Reconciler>, dispatcher: Dispatcher, max_wait: Duration) -> Self {
        Self {
            reconciler,
            dispatcher,
            max_wait,
        }
    }
}

#[async_trait]
impl Runnable for ReconcilerRunnable {
    async fn run(&self, ctx: RunContext) -> Result<RunReport> {
        sweep(
            Arc::clone(&self.reconciler),
            &self.dispatcher,
            &ctx,
            self.max_wait,
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------
