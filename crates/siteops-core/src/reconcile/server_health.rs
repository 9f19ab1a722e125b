//! Probes active hosting servers and records their health.
//!
//! The mapping is direct: the probe's verdict becomes `health_status`.
//! Runs of `Unreachable` are counted and logged once they reach the alert
//! threshold; failover itself is left to whoever watches that signal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{Candidate, Reconciler};
use crate::collab::Prober;
use crate::entity::Server;
use crate::error::Result;
use crate::orchestrator::{UnitAction, UnitOutcome, UnitReport, WorkUnit};
use crate::store::Store;
use crate::types::{EntityRef, HealthStatus, ReconcilerKind};

#[derive(Debug, Clone)]
pub struct HealthPolicy {
    pub probe_timeout: Duration,
    /// Consecutive unreachable results before a warning is logged.
    pub unreachable_alert_after: u32,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            unreachable_alert_after: 3,
        }
    }
}

pub struct ServerHealthChecker {
    store: Arc<dyn Store>,
    prober: Arc<dyn Prober>,
    policy: HealthPolicy,
}

impl ServerHealthChecker {
    pub fn new(store: Arc<dyn Store>, prober: Arc<dyn Prober>, policy: HealthPolicy) -> Self {
        Self {
            store,
            prober,
            policy,
        }
    }
}

#[async_trait]
impl Reconciler for ServerHealthChecker {
    fn kind(&self) -> ReconcilerKind {
        ReconcilerKind::ServerHealth
    }

    fn select_candidates(&self, _now: DateTime<Utc>) -> Result<Vec<Candidate>> {
        Ok(self
            .store
            .list_active_servers()?
            .into_iter()
            .map(Candidate::Server)
            .collect())
    }

    fn plan_unit(
        &self,
        trigger: &str,
        candidate: Candidate,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkUnit>> {
        let Candidate::Server(server) = candidate else {
            return Ok(None);
        };
        let timeout_ms = self.policy.probe_timeout.as_millis().min(u64::MAX as u128) as u64;
        Ok(Some(WorkUnit::new(
            trigger,
            EntityRef::Server(server.id),
            UnitAction::Probe {
                base_url: server.base_url,
                timeout_ms,
            },
            1,
            now,
        )))
    }

    async fn execute(&self, unit: &WorkUnit) -> std::result::Result<UnitOutcome, String> {
        let UnitAction::Probe {
            base_url,
            timeout_ms,
        } = &unit.action
        else {
            return Err(format!("server health checker cannot run {}", unit.action.name()));
        };
        let report = self
            .prober
            .probe(base_url, Duration::from_millis(*timeout_ms))
            .await;
        Ok(UnitOutcome::Probed { report })
    }

    fn apply_result(&self, report: &UnitReport) -> Result<()> {
        let EntityRef::Server(id) = report.unit.target else {
            return Ok(());
        };
        let (status, latency_ms) = match &report.result {
            Ok(UnitOutcome::Probed { report: probe }) => (probe.status, probe.latency_ms),
            Ok(_) => return Ok(()),
            Err(failure) => {
                debug!(server = id, error = %failure, "probe unit failed, marking unreachable");
                (HealthStatus::Unreachable, None)
            }
        };
        if self.store.get_server(id)?.is_none() {
            return Ok(());
        }

        let checked_at = report.started_at;
        let updated = self.store.update_server(id, &mut |s: &mut Server| {
            // A slow probe must not overwrite a newer one.
            if s.last_health_check_at.is_some_and(|prev| prev > checked_at) {
                return Ok(());
            }
            s.health_status = status;
            s.last_latency_ms = latency_ms;
            s.last_health_check_at = Some(checked_at);
            if status == HealthStatus::Unreachable {
                s.consecutive_unreachable = s.consecutive_unreachable.saturating_add(1);
            } else {
                s.consecutive_unreachable = 0;
            }
            Ok(())
        })?;

        if updated.consecutive_unreachable >= self.policy.unreachable_alert_after
            && updated.health_status == HealthStatus::Unreachable
        {
            warn!(
                server = id,
                name = %updated.name,
                pool = %updated.pool,
                primary = updated.is_primary,
                streak = updated.consecutive_unreachable,
                "server unreachable"
            );
        } else {
            debug!(server = id, status = %updated.health_status, "health recorded");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::ProbeReport;
    use crate::entity::NewServer;
    use crate::orchestrator::{Dispatcher, DispatcherConfig};
    use crate::reconcile::sweep;
    use crate::reconcile::testing::*;
    use crate::store::RedbStore;

    const WAIT: Duration = Duration::from_secs(5);

    fn server(store: &RedbStore, name: &str) -> Server {
        store
            .insert_server(NewServer {
                name: name.into(),
                base_url: format!("http://{name}.internal"),
                pool: "default".into(),
                is_primary: false,
            })
            .unwrap()
    }

    async fn sweep_with(store: &Arc<RedbStore>, prober: Arc<FakeProber>) {
        let r = Arc::new(ServerHealthChecker::new(
            store.clone(),
            prober,
            HealthPolicy::default(),
        ));
        sweep(r, &dispatcher(), &ctx("server-health", Utc::now()), WAIT)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn healthy_probe_is_recorded() {
        let (_dir, store) = store();
        let s = server(&store, "web-1");
        sweep_with(&store, FakeProber::status(HealthStatus::Healthy)).await;

        let s = store.get_server(s.id).unwrap().unwrap();
        assert_eq!(s.health_status, HealthStatus::Healthy);
        assert_eq!(s.last_latency_ms, Some(12));
        assert!(s.last_health_check_at.is_some());
        assert_eq!(s.consecutive_unreachable, 0);
    }

    #[tokio::test]
    async fn degraded_probe_is_recorded() {
        let (_dir, store) = store();
        let s = server(&store, "web-1");
        sweep_with(&store, FakeProber::status(HealthStatus::Degraded)).await;
        assert_eq!(
            store.get_server(s.id).unwrap().unwrap().health_status,
            HealthStatus::Degraded
        );
    }

    #[tokio::test]
    async fn probe_timeout_marks_unreachable_without_escaping() {
        let (_dir, store) = store();
        let s = server(&store, "web-1");

        // The probe outlives the unit timeout, so the dispatcher cuts it off.
        let prober = Arc::new(FakeProber {
            report: ProbeReport::unreachable(),
            hang: true,
        });
        let r = Arc::new(ServerHealthChecker::new(
            store.clone(),
            prober,
            HealthPolicy::default(),
        ));
        let d = Dispatcher::new(DispatcherConfig {
            pool_size: 2,
            unit_timeout: Duration::from_millis(100),
        });
        let before = Utc::now();
        let report = sweep(r, &d, &ctx("server-health", before), WAIT)
            .await
            .unwrap();
        assert_eq!(report.failed, 1);

        let s = store.get_server(s.id).unwrap().unwrap();
        assert_eq!(s.health_status, HealthStatus::Unreachable);
        let checked = s.last_health_check_at.unwrap();
        assert!(checked >= before);
        assert!(checked <= Utc::now());
        assert_eq!(s.last_latency_ms, None);
    }

    #[tokio::test]
    async fn inactive_servers_are_skipped() {
        let (_dir, store) = store();
        let active = server(&store, "web-1");
        let idle = server(&store, "web-2");
        store
            .update_server(idle.id, &mut |s: &mut Server| {
                s.is_active = false;
                Ok(())
            })
            .unwrap();
        sweep_with(&store, FakeProber::status(HealthStatus::Healthy)).await;

        assert_eq!(
            store.get_server(active.id).unwrap().unwrap().health_status,
            HealthStatus::Healthy
        );
        let idle = store.get_server(idle.id).unwrap().unwrap();
        assert_eq!(idle.health_status, HealthStatus::Unknown);
        assert!(idle.last_health_check_at.is_none());
    }

    #[tokio::test]
    async fn unreachable_streak_counts_and_resets() {
        let (_dir, store) = store();
        let s = server(&store, "web-1");
        for _ in 0..3 {
            sweep_with(&store, FakeProber::status(HealthStatus::Unreachable)).await;
        }
        assert_eq!(store.get_server(s.id).unwrap().unwrap().consecutive_unreachable, 3);

        sweep_with(&store, FakeProber::status(HealthStatus::Healthy)).await;
        let s = store.get_server(s.id).unwrap().unwrap();
        assert_eq!(s.consecutive_unreachable, 0);
        assert_eq!(s.health_status, HealthStatus::Healthy);
    }

    #[test]
    fn stale_probe_result_does_not_overwrite_newer() {
        let (_dir, store) = store();
        let s = server(&store, "web-1");
        let r = ServerHealthChecker::new(
            store.clone(),
            FakeProber::status(HealthStatus::Healthy),
            HealthPolicy::default(),
        );
        let now = Utc::now();
        let unit = r
            .plan_unit("server-health", Candidate::Server(s.clone()), now)
            .unwrap()
            .unwrap();
        let probed = |status, at| UnitReport {
            unit: unit.clone(),
            result: Ok(UnitOutcome::Probed {
                report: ProbeReport {
                    status,
                    latency_ms: Some(5),
                },
            }),
            started_at: at,
            finished_at: at,
        };
        r.apply_result(&probed(HealthStatus::Healthy, now)).unwrap();
        r.apply_result(&probed(HealthStatus::Unreachable, now - chrono::Duration::seconds(30)))
            .unwrap();

        let s = store.get_server(s.id).unwrap().unwrap();
        assert_eq!(s.health_status, HealthStatus::Healthy);
        assert_eq!(s.last_health_check_at, Some(now));
    }
}
