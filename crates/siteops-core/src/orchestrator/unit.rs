//! Work unit data model.
//!
//! A `WorkUnit` is an immutable description of one per-entity task. A
//! reconciler plans it, the dispatcher executes it, and the resulting
//! `UnitReport` is handed back to the reconciler to apply.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collab::{CertOutcome, ComposedPost, NsCheck, ProbeReport, PublishReceipt};
use crate::types::{EntityRef, PostId, SiteId};

// ---------------------------------------------------------------------------
// UnitAction
// ---------------------------------------------------------------------------

/// What a unit does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitAction {
    CheckNameservers { hostname: String },
    IssueCertificate { hostname: String, renewal: bool },
    Publish { post_id: PostId, site_id: SiteId },
    Autopost { site_id: SiteId },
    Probe { base_url: String, timeout_ms: u64 },
}

impl UnitAction {
    pub fn name(&self) -> &'static str {
        match self {
            UnitAction::CheckNameservers { .. } => "check_nameservers",
            UnitAction::IssueCertificate { .. } => "issue_certificate",
            UnitAction::Publish { .. } => "publish",
            UnitAction::Autopost { .. } => "autopost",
            UnitAction::Probe { .. } => "probe",
        }
    }
}

// ---------------------------------------------------------------------------
// WorkUnit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkUnit {
    pub id: Uuid,
    /// Name of the trigger whose sweep planned this unit.
    pub trigger: String,
    pub target: EntityRef,
    pub action: UnitAction,
    /// Per-entity attempt number; later attempts supersede earlier ones.
    pub attempt: u64,
    pub planned_at: DateTime<Utc>,
}

impl WorkUnit {
    pub fn new(
        trigger: impl Into<String>,
        target: EntityRef,
        action: UnitAction,
        attempt: u64,
        planned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger: trigger.into(),
            target,
            action,
            attempt,
            planned_at,
        }
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (attempt {})", self.action.name(), self.target, self.attempt)
    }
}

// ---------------------------------------------------------------------------
// Outcome / failure
// ---------------------------------------------------------------------------

/// Successful result of executing a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitOutcome {
    Nameservers { check: NsCheck },
    Certificate { outcome: CertOutcome },
    Published { receipt: PublishReceipt },
    /// The target was not in a state to act on; nothing was done.
    Skipped { reason: String },
    Composed { post: ComposedPost },
    Probed { report: ProbeReport },
}

/// Why a unit did not produce an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitFailure {
    Error { message: String },
    TimedOut { after_ms: u64 },
    Panicked { message: String },
}

impl UnitFailure {
    pub fn timed_out(after: Duration) -> Self {
        UnitFailure::TimedOut {
            after_ms: after.as_millis().min(u64::MAX as u128) as u64,
        }
    }
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitFailure::Error { message } => f.write_str(message),
            UnitFailure::TimedOut { after_ms } => write!(f, "timed out after {after_ms}ms"),
            UnitFailure::Panicked { message } => write!(f, "panicked: {message}"),
        }
    }
}

/// Delivered exactly once per submitted unit.
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub unit: WorkUnit,
    pub result: Result<UnitOutcome, UnitFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl UnitReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_serializes_with_type_tag() {
        let action = UnitAction::Publish {
            post_id: 4,
            site_id: 2,
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "publish");
        assert_eq!(json["post_id"], 4);
    }

    #[test]
    fn unit_display_names_target_and_attempt() {
        let unit = WorkUnit::new(
            "domain-status",
            EntityRef::Domain(9),
            UnitAction::CheckNameservers {
                hostname: "example.com".into(),
            },
            3,
            Utc::now(),
        );
        assert_eq!(unit.to_string(), "check_nameservers domain#9 (attempt 3)");
    }

    #[test]
    fn failure_display() {
        assert_eq!(
            UnitFailure::timed_out(Duration::from_secs(2)).to_string(),
            "timed out after 2000ms"
        );
        assert_eq!(
            UnitFailure::Error {
                message: "boom".into()
            }
            .to_string(),
            "boom"
        );
    }
}
