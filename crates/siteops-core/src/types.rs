use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SiteopsError;

pub type DomainId = u64;
pub type SiteId = u64;
pub type PostId = u64;
pub type ServerId = u64;

// ---------------------------------------------------------------------------
// DomainStatus
// ---------------------------------------------------------------------------

/// DNS / SSL lifecycle of a domain.
///
/// ```text
/// Unchecked ─┐
/// NsFailed ──┼─► NsPending ─► NsActive ─► SslPending ─► SslActive
/// SslFailed ─┘       │                        │  ▲          │
///                    ▼                        ▼  └──────────┘ (renewal)
///                 NsFailed                 SslFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainStatus {
    Unchecked,
    NsPending,
    NsActive,
    NsFailed,
    SslPending,
    SslActive,
    SslFailed,
}

impl DomainStatus {
    pub fn all() -> &'static [DomainStatus] {
        &[
            DomainStatus::Unchecked,
            DomainStatus::NsPending,
            DomainStatus::NsActive,
            DomainStatus::NsFailed,
            DomainStatus::SslPending,
            DomainStatus::SslActive,
            DomainStatus::SslFailed,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DomainStatus::Unchecked => "unchecked",
            DomainStatus::NsPending => "ns_pending",
            DomainStatus::NsActive => "ns_active",
            DomainStatus::NsFailed => "ns_failed",
            DomainStatus::SslPending => "ssl_pending",
            DomainStatus::SslActive => "ssl_active",
            DomainStatus::SslFailed => "ssl_failed",
        }
    }

    pub fn is_failed(self) -> bool {
        matches!(self, DomainStatus::NsFailed | DomainStatus::SslFailed)
    }

    /// Nameservers point at us, so content can be served.
    pub fn is_publishable(self) -> bool {
        matches!(
            self,
            DomainStatus::NsActive | DomainStatus::SslPending | DomainStatus::SslActive
        )
    }

    /// Whether `self → to` is an edge of the lifecycle graph.
    ///
    /// Explicit rechecks are not edges; they go through [`Domain::request_recheck`].
    ///
    /// [`Domain::request_recheck`]: crate::entity::Domain::request_recheck
    pub fn can_transition_to(self, to: DomainStatus) -> bool {
        use DomainStatus::*;
        matches!(
            (self, to),
            (Unchecked, NsPending)
                | (NsFailed, NsPending)
                | (SslFailed, NsPending)
                | (NsPending, NsActive)
                | (NsPending, NsFailed)
                | (NsActive, SslPending)
                | (SslPending, SslActive)
                | (SslPending, SslFailed)
                | (SslActive, SslPending)
        )
    }

    pub fn transition(self, to: DomainStatus) -> Result<DomainStatus, SiteopsError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(SiteopsError::InvalidTransition {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DomainStatus {
    type Err = SiteopsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DomainStatus::all()
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| SiteopsError::InvalidConfig(format!("unknown domain status '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// PostStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HealthStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Degraded,
    Unreachable,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unreachable => "unreachable",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EntityRef
// ---------------------------------------------------------------------------

/// Weak reference to the entity a work unit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Domain(DomainId),
    Site(SiteId),
    Post(PostId),
    Server(ServerId),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Domain(id) => write!(f, "domain#{id}"),
            EntityRef::Site(id) => write!(f, "site#{id}"),
            EntityRef::Post(id) => write!(f, "post#{id}"),
            EntityRef::Server(id) => write!(f, "server#{id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// ReconcilerKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilerKind {
    DomainStatus,
    PostPublisher,
    Autopost,
    ServerHealth,
}

impl ReconcilerKind {
    pub fn all() -> &'static [ReconcilerKind] {
        &[
            ReconcilerKind::DomainStatus,
            ReconcilerKind::PostPublisher,
            ReconcilerKind::Autopost,
            ReconcilerKind::ServerHealth,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReconcilerKind::DomainStatus => "domain_status",
            ReconcilerKind::PostPublisher => "post_publisher",
            ReconcilerKind::Autopost => "autopost",
            ReconcilerKind::ServerHealth => "server_health",
        }
    }
}

impl fmt::Display for ReconcilerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReconcilerKind {
    type Err = SiteopsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReconcilerKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| SiteopsError::InvalidConfig(format!("unknown reconciler '{s}'")))
    }
}
