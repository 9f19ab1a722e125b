//! Bounded worker pool shared by every reconciler.
//!
//! `submit` waits for a free slot, so a saturated pool applies backpressure to
//! the sweep that is submitting. Each unit runs in its own task under a
//! timeout; errors, panics and timeouts all come back as a [`UnitReport`],
//! and the completion callback runs exactly once per unit.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::unit::{UnitFailure, UnitOutcome, UnitReport, WorkUnit};
use crate::error::{Result, SiteopsError};
use crate::types::EntityRef;

/// The body of a unit. `Err` carries a human-readable failure message.
pub type UnitJob = BoxFuture<'static, std::result::Result<UnitOutcome, String>>;

/// Invoked once with the final report, before the handle resolves.
pub type Completion = Box<dyn FnOnce(&UnitReport) + Send + 'static>;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub pool_size: usize,
    pub unit_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            unit_timeout: Duration::from_secs(120),
        }
    }
}

struct Inner {
    config: DispatcherConfig,
    semaphore: Arc<Semaphore>,
    in_flight: Mutex<HashSet<EntityRef>>,
}

impl Inner {
    fn in_flight(&self) -> MutexGuard<'_, HashSet<EntityRef>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

/// Resolves to the unit's report once it has completed.
pub struct UnitHandle {
    pub unit_id: Uuid,
    rx: oneshot::Receiver<UnitReport>,
}

impl UnitHandle {
    /// `None` only if the worker task was torn down by runtime shutdown.
    pub async fn wait(self) -> Option<UnitReport> {
        self.rx.await.ok()
    }
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        let pool_size = config.pool_size.max(1);
        Self {
            inner: Arc::new(Inner {
                config: DispatcherConfig {
                    pool_size,
                    ..config
                },
                semaphore: Arc::new(Semaphore::new(pool_size)),
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.config.pool_size
    }

    pub fn unit_timeout(&self) -> Duration {
        self.inner.config.unit_timeout
    }

    /// Number of units currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight().len()
    }

    pub fn is_in_flight(&self, target: &EntityRef) -> bool {
        self.inner.in_flight().contains(target)
    }

    /// Submit a unit for execution, waiting for a free slot if the pool is full.
    ///
    /// Fails with [`SiteopsError::PoolClosed`] once [`close`](Self::close) has
    /// been called.
    pub async fn submit(
        &self,
        unit: WorkUnit,
        job: UnitJob,
        on_complete: Completion,
    ) -> Result<UnitHandle> {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| SiteopsError::PoolClosed)?;

        let target = unit.target;
        if !self.inner.in_flight().insert(target) {
            // Reconcilers check before planning; a duplicate here still runs.
            warn!(%target, "unit submitted while another unit for the target is in flight");
        }

        let (tx, rx) = oneshot::channel();
        let unit_id = unit.id;
        let timeout = self.inner.config.unit_timeout;
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let _permit = permit;
            let started_at = Utc::now();
            debug!(unit = %unit, "unit started");

            let mut worker = tokio::spawn(job);
            let result = match tokio::time::timeout(timeout, &mut worker).await {
                Ok(Ok(Ok(outcome))) => Ok(outcome),
                Ok(Ok(Err(message))) => Err(UnitFailure::Error { message }),
                Ok(Err(join_err)) if join_err.is_panic() => Err(UnitFailure::Panicked {
                    message: panic_message(join_err.into_panic()),
                }),
                Ok(Err(join_err)) => Err(UnitFailure::Error {
                    message: join_err.to_string(),
                }),
                Err(_) => {
                    worker.abort();
                    Err(UnitFailure::timed_out(timeout))
                }
            };

            let report = UnitReport {
                unit,
                result,
                started_at,
                finished_at: Utc::now(),
            };
            match &report.result {
                Ok(_) => debug!(unit = %report.unit, "unit succeeded"),
                Err(failure) => warn!(unit = %report.unit, %failure, "unit failed"),
            }

            // Completions commit to the store and run on the blocking pool.
            let completed = tokio::task::spawn_blocking(move || {
                if std::panic::catch_unwind(AssertUnwindSafe(|| on_complete(&report))).is_err() {
                    error!(unit = %report.unit, "completion callback panicked");
                }
                report
            })
            .await;
            inner.in_flight().remove(&target);
            match completed {
                Ok(report) => {
                    let _ = tx.send(report);
                }
                Err(e) => error!(%target, error = %e, "completion task failed"),
            }
        });

        Ok(UnitHandle { unit_id, rx })
    }

    /// Refuse further submissions. Units already running are unaffected.
    pub fn close(&self) {
        self.inner.semaphore.close();
    }

    /// Wait until no unit is running.
    pub async fn wait_idle(&self) {
        while self.in_flight() > 0 || self.inner.semaphore.available_permits() < self.capacity()
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::unit::UnitAction;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::task::JoinSet;

    fn unit(id: u64) -> WorkUnit {
        WorkUnit::new(
            "test",
            EntityRef::Server(id),
            UnitAction::Probe {
                base_url: format!("http://srv{id}"),
                timeout_ms: 100,
            },
            1,
            Utc::now(),
        )
    }

    fn skipped() -> std::result::Result<UnitOutcome, String> {
        Ok(UnitOutcome::Skipped {
            reason: "test".into(),
        })
    }

    async fn explode() -> std::result::Result<UnitOutcome, String> {
        panic!("boom")
    }

    fn dispatcher(pool_size: usize, timeout: Duration) -> Dispatcher {
        Dispatcher::new(DispatcherConfig {
            pool_size,
            unit_timeout: timeout,
        })
    }

    #[tokio::test]
    async fn success_reaches_callback_and_handle() {
        let d = dispatcher(2, Duration::from_secs(5));
        let called = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&called);
        let handle = d
            .submit(
                unit(1),
                Box::pin(async { skipped() }),
                Box::new(move |r: &UnitReport| {
                    assert!(r.is_success());
                    c.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap();
        let report = handle.wait().await.unwrap();
        assert!(report.is_success());
        assert_eq!(called.load(Ordering::SeqCst), 1);
        assert_eq!(d.in_flight(), 0);
    }

    #[tokio::test]
    async fn error_is_reported_as_failure() {
        let d = dispatcher(1, Duration::from_secs(5));
        let handle = d
            .submit(
                unit(1),
                Box::pin(async { Err("dns provider down".to_string()) }),
                Box::new(|_: &UnitReport| {}),
            )
            .await
            .unwrap();
        let report = handle.wait().await.unwrap();
        assert_eq!(
            report.result,
            Err(UnitFailure::Error {
                message: "dns provider down".into()
            })
        );
    }

    #[tokio::test]
    async fn timeout_is_reported_as_failure() {
        let d = dispatcher(1, Duration::from_millis(50));
        let handle = d
            .submit(
                unit(1),
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    skipped()
                }),
                Box::new(|_: &UnitReport| {}),
            )
            .await
            .unwrap();
        let report = handle.wait().await.unwrap();
        assert!(matches!(report.result, Err(UnitFailure::TimedOut { .. })));
        assert_eq!(d.in_flight(), 0);
    }

    #[tokio::test]
    async fn panic_is_reported_as_failure() {
        let d = dispatcher(1, Duration::from_secs(5));
        let handle = d
            .submit(
                unit(1),
                Box::pin(explode()),
                Box::new(|_: &UnitReport| {}),
            )
            .await
            .unwrap();
        let report = handle.wait().await.unwrap();
        assert_eq!(
            report.result,
            Err(UnitFailure::Panicked {
                message: "boom".into()
            })
        );
    }

    #[tokio::test]
    async fn panicking_callback_still_resolves_handle() {
        let d = dispatcher(1, Duration::from_secs(5));
        let handle = d
            .submit(
                unit(1),
                Box::pin(async { skipped() }),
                Box::new(|_: &UnitReport| panic!("apply failed")),
            )
            .await
            .unwrap();
        assert!(handle.wait().await.is_some());
        assert_eq!(d.in_flight(), 0);
    }

    #[tokio::test]
    async fn completion_runs_on_blocking_pool() {
        let d = dispatcher(1, Duration::from_secs(5));
        let runtime_thread = std::thread::current().id();
        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        let handle = d
            .submit(
                unit(1),
                Box::pin(async { skipped() }),
                Box::new(move |_: &UnitReport| {
                    *s.lock().unwrap() = Some(std::thread::current().id());
                }),
            )
            .await
            .unwrap();
        handle.wait().await.unwrap();
        let callback_thread = seen.lock().unwrap().unwrap();
        assert_ne!(callback_thread, runtime_thread);
    }

    #[tokio::test]
    async fn saturated_pool_completes_every_unit_exactly_once() {
        const POOL: usize = 4;
        const UNITS: usize = POOL + 5;

        let d = dispatcher(POOL, Duration::from_secs(5));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let completions = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..UNITS {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let completions = Arc::clone(&completions);
            let job: UnitJob = Box::pin(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                skipped()
            });
            let handle = d
                .submit(
                    unit(i as u64),
                    job,
                    Box::new(move |r: &UnitReport| completions.lock().unwrap().push(r.unit.target)),
                )
                .await
                .unwrap();
            handles.push(handle);
        }

        let mut set = JoinSet::new();
        for h in handles {
            set.spawn(h.wait());
        }
        let mut reports = 0;
        while let Some(res) = set.join_next().await {
            assert!(res.unwrap().is_some());
            reports += 1;
        }

        assert_eq!(reports, UNITS);
        assert!(peak.load(Ordering::SeqCst) <= POOL);
        let mut seen = completions.lock().unwrap().clone();
        seen.sort_by_key(|t| match t {
            EntityRef::Server(id) => *id,
            _ => u64::MAX,
        });
        seen.dedup();
        assert_eq!(seen.len(), UNITS, "each unit completes exactly once");
        assert_eq!(completions.lock().unwrap().len(), UNITS);
    }

    #[tokio::test]
    async fn in_flight_tracks_running_targets() {
        let d = dispatcher(2, Duration::from_secs(5));
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let handle = d
            .submit(
                unit(7),
                Box::pin(async move {
                    let _ = release_rx.await;
                    skipped()
                }),
                Box::new(|_: &UnitReport| {}),
            )
            .await
            .unwrap();
        assert!(d.is_in_flight(&EntityRef::Server(7)));
        assert!(!d.is_in_flight(&EntityRef::Server(8)));
        release_tx.send(()).unwrap();
        handle.wait().await.unwrap();
        assert!(!d.is_in_flight(&EntityRef::Server(7)));
    }

    #[tokio::test]
    async fn closed_pool_rejects_submissions() {
        let d = dispatcher(1, Duration::from_secs(5));
        d.close();
        let err = d
            .submit(unit(1), Box::pin(async { skipped() }), Box::new(|_: &UnitReport| {}))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SiteopsError::PoolClosed));
    }

    #[tokio::test]
    async fn wait_idle_returns_after_units_finish() {
        let d = dispatcher(2, Duration::from_secs(5));
        for i in 0..3 {
            d.submit(
                unit(i),
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    skipped()
                }),
                Box::new(|_: &UnitReport| {}),
            )
            .await
            .unwrap();
        }
        d.wait_idle().await;
        assert_eq!(d.in_flight(), 0);
    }
}
