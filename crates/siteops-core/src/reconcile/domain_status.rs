//! Domain DNS / SSL lifecycle reconciler.
//!
//! Planning persists the "entry" edge of a check (e.g. `Unchecked →
//! NsPending`) together with a fresh attempt number. The unit's result then
//! drives the "result" edge, but only while its attempt is still current; an
//! explicit recheck or a newer attempt makes older results stale.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::{Candidate, Reconciler};
use crate::collab::{CertOutcome, CertificateIssuer, NameserverChecker, NsCheck};
use crate::entity::Domain;
use crate::error::Result;
use crate::orchestrator::{UnitAction, UnitFailure, UnitOutcome, UnitReport, WorkUnit};
use crate::store::Store;
use crate::types::{DomainStatus, EntityRef, ReconcilerKind};

#[derive(Debug, Clone)]
pub struct DomainPolicy {
    /// Certificates expiring within this window are renewed.
    pub renewal_window: Duration,
    /// How long a domain may sit in `NsPending` before it is marked failed.
    pub ns_propagation_grace: Duration,
    /// Automatic rechecks of a failed domain before it waits for a manual one.
    pub max_auto_rechecks: u32,
    pub failed_recheck_after: Duration,
}

impl Default for DomainPolicy {
    fn default() -> Self {
        Self {
            renewal_window: Duration::days(30),
            ns_propagation_grace: Duration::hours(72),
            max_auto_rechecks: 3,
            failed_recheck_after: Duration::hours(6),
        }
    }
}

impl DomainPolicy {
    fn auto_recheck_due(&self, d: &Domain, now: DateTime<Utc>) -> bool {
        d.status.is_failed()
            && d.consecutive_failures <= self.max_auto_rechecks
            && d
                .status_since
                .checked_add_signed(self.failed_recheck_after)
                .is_some_and(|at| now >= at)
    }

    fn grace_expired(&self, d: &Domain, now: DateTime<Utc>) -> bool {
        d.status_since
            .checked_add_signed(self.ns_propagation_grace)
            .is_some_and(|at| now >= at)
    }

    /// Whether `d` needs a unit at `now`, without mutating it.
    pub fn needs_work(&self, d: &Domain, now: DateTime<Utc>) -> bool {
        match d.status {
            DomainStatus::Unchecked | DomainStatus::NsPending | DomainStatus::SslPending => true,
            DomainStatus::NsActive | DomainStatus::SslActive => {
                !d.cert_valid_beyond(now, self.renewal_window)
            }
            DomainStatus::NsFailed | DomainStatus::SslFailed => self.auto_recheck_due(d, now),
        }
    }
}

fn check_ns(d: &Domain) -> UnitAction {
    UnitAction::CheckNameservers {
        hostname: d.hostname.clone(),
    }
}

fn issue(d: &Domain) -> UnitAction {
    UnitAction::IssueCertificate {
        hostname: d.hostname.clone(),
        renewal: d.ssl_expires_at.is_some(),
    }
}

/// Take the entry edge for the next check of `d`, if any, and bump its attempt.
pub fn plan_entry(
    d: &mut Domain,
    now: DateTime<Utc>,
    policy: &DomainPolicy,
) -> Result<Option<(UnitAction, u64)>> {
    let action = match d.status {
        DomainStatus::Unchecked => {
            d.advance(DomainStatus::NsPending, now)?;
            check_ns(d)
        }
        DomainStatus::NsFailed | DomainStatus::SslFailed => {
            if !policy.auto_recheck_due(d, now) {
                return Ok(None);
            }
            d.advance(DomainStatus::NsPending, now)?;
            check_ns(d)
        }
        DomainStatus::NsPending => check_ns(d),
        DomainStatus::NsActive => {
            if d.cert_valid_beyond(now, policy.renewal_window) {
                return Ok(None);
            }
            d.advance(DomainStatus::SslPending, now)?;
            issue(d)
        }
        DomainStatus::SslPending => issue(d),
        DomainStatus::SslActive => {
            if d.cert_valid_beyond(now, policy.renewal_window) {
                return Ok(None);
            }
            d.advance(DomainStatus::SslPending, now)?;
            issue(d)
        }
    };
    let attempt = d.begin_check();
    Ok(Some((action, attempt)))
}

/// Apply a unit result to `d`. The caller has checked that the attempt is current.
pub fn apply_outcome(
    d: &mut Domain,
    action: &UnitAction,
    result: &std::result::Result<UnitOutcome, UnitFailure>,
    now: DateTime<Utc>,
    policy: &DomainPolicy,
) -> Result<()> {
    d.last_checked_at = Some(now);

    match (action, result) {
        (UnitAction::CheckNameservers { .. }, Ok(UnitOutcome::Nameservers { check })) => {
            match check {
                NsCheck::Active => {
                    d.advance(DomainStatus::NsActive, now)?;
                    d.consecutive_failures = 0;
                    d.last_error = None;
                }
                NsCheck::Pending => {
                    if policy.grace_expired(d, now) {
                        d.advance(DomainStatus::NsFailed, now)?;
                        d.consecutive_failures += 1;
                        d.last_error = Some(format!(
                            "nameservers not delegated after {}h",
                            policy.ns_propagation_grace.num_hours()
                        ));
                    }
                }
                NsCheck::Failed => {
                    d.advance(DomainStatus::NsFailed, now)?;
                    d.consecutive_failures += 1;
                    d.last_error = Some("hostname does not resolve".into());
                }
            }
        }
        (UnitAction::CheckNameservers { .. }, Err(failure)) => {
            d.advance(DomainStatus::NsFailed, now)?;
            d.consecutive_failures += 1;
            d.last_error = Some(failure.to_string());
        }
        (UnitAction::IssueCertificate { .. }, Ok(UnitOutcome::Certificate { outcome })) => {
            match outcome {
                CertOutcome::Active { expires_at } => {
                    d.advance(DomainStatus::SslActive, now)?;
                    d.ssl_expires_at = Some(*expires_at);
                    d.consecutive_failures = 0;
                    d.last_error = None;
                }
                CertOutcome::Failed { reason } => {
                    d.advance(DomainStatus::SslFailed, now)?;
                    d.consecutive_failures += 1;
                    d.last_error = Some(reason.clone());
                }
            }
        }
        (UnitAction::IssueCertificate { .. }, Err(failure)) => {
            d.advance(DomainStatus::SslFailed, now)?;
            d.consecutive_failures += 1;
            d.last_error = Some(failure.to_string());
        }
        (action, Ok(outcome)) => {
            warn!(domain = %d.hostname, action = action.name(), ?outcome, "unexpected outcome for domain unit");
        }
        (action, Err(_)) => {
            warn!(domain = %d.hostname, action = action.name(), "unexpected action for domain unit");
        }
    }
    Ok(())
}

pub struct DomainStatusReconciler {
    store: Arc<dyn Store>,
    nameservers: Arc<dyn NameserverChecker>,
    certificates: Arc<dyn CertificateIssuer>,
    policy: DomainPolicy,
}

impl DomainStatusReconciler {
    pub fn new(
        store: Arc<dyn Store>,
        nameservers: Arc<dyn NameserverChecker>,
        certificates: Arc<dyn CertificateIssuer>,
        policy: DomainPolicy,
    ) -> Self {
        Self {
            store,
            nameservers,
            certificates,
            policy,
        }
    }
}

#[async_trait]
impl Reconciler for DomainStatusReconciler {
    fn kind(&self) -> ReconcilerKind {
        ReconcilerKind::DomainStatus
    }

    fn select_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Candidate>> {
        Ok(self
            .store
            .list_domains()?
            .into_iter()
            .filter(|d| self.policy.needs_work(d, now))
            .map(Candidate::Domain)
            .collect())
    }

    fn plan_unit(
        &self,
        trigger: &str,
        candidate: Candidate,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkUnit>> {
        let Candidate::Domain(domain) = candidate else {
            return Ok(None);
        };
        let mut planned = None;
        let before = domain.status;
        let updated = self.store.update_domain(domain.id, &mut |d: &mut Domain| {
            planned = plan_entry(d, now, &self.policy)?;
            Ok(())
        })?;
        if updated.status != before {
            info!(domain = %updated.hostname, from = %before, to = %updated.status, "domain status changed");
        }
        Ok(planned.map(|(action, attempt)| {
            WorkUnit::new(trigger, EntityRef::Domain(updated.id), action, attempt, now)
        }))
    }

    async fn execute(&self, unit: &WorkUnit) -> std::result::Result<UnitOutcome, String> {
        match &unit.action {
            UnitAction::CheckNameservers { hostname } => self
                .nameservers
                .check(hostname)
                .await
                .map(|check| UnitOutcome::Nameservers { check })
                .map_err(|e| e.to_string()),
            UnitAction::IssueCertificate { hostname, renewal } => {
                debug!(%hostname, renewal, "requesting certificate");
                self.certificates
                    .issue_or_renew(hostname)
                    .await
                    .map(|outcome| UnitOutcome::Certificate { outcome })
                    .map_err(|e| e.to_string())
            }
            other => Err(format!("domain reconciler cannot run {}", other.name())),
        }
    }

    fn apply_result(&self, report: &UnitReport) -> Result<()> {
        let EntityRef::Domain(id) = report.unit.target else {
            return Ok(());
        };
        let attempt = report.unit.attempt;
        let Some(current) = self.store.get_domain(id)? else {
            return Ok(());
        };
        if !current.accepts_attempt(attempt) {
            debug!(domain = %current.hostname, attempt, "dropping superseded result");
            return Ok(());
        }

        let before = current.status;
        let updated = self.store.update_domain(id, &mut |d: &mut Domain| {
            // Re-check inside the transaction; a recheck may have landed since.
            if !d.accepts_attempt(attempt) {
                return Ok(());
            }
            d.applied_attempt = attempt;
            apply_outcome(d, &report.unit.action, &report.result, report.finished_at, &self.policy)
        })?;
        if updated.status != before {
            info!(
                domain = %updated.hostname,
                from = %before,
                to = %updated.status,
                error = updated.last_error.as_deref().unwrap_or(""),
                "domain status changed"
            );
        }
        Ok(())
    }
}
