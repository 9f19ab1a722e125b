//! External collaborators the reconcilers depend on.
//!
//! Each capability is a trait so reconcilers can be exercised against fakes.
//! The submodules hold the adapters the daemon wires in by default.

pub mod cert;
pub mod command;
pub mod compose;
pub mod dns;
pub mod probe;
pub mod publish;

pub use cert::CommandCertificateIssuer;
pub use compose::CommandComposer;
pub use dns::DohNameserverChecker;
pub use probe::HttpProber;
pub use publish::WebhookPublisher;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Post, Site};
use crate::error::Result;
use crate::types::HealthStatus;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of a nameserver delegation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NsCheck {
    /// The zone is delegated to the expected nameservers.
    Active,
    /// Not delegated yet; propagation may still be underway.
    Pending,
    /// The name does not resolve at all.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CertOutcome {
    Active { expires_at: DateTime<Utc> },
    Failed { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    /// Public URL reported by the target, if any.
    #[serde(default)]
    pub external_url: Option<String>,
    /// False when the target already held this post.
    #[serde(default)]
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedPost {
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub status: HealthStatus,
    #[serde(default)]
    pub latency_ms: Option<u64>,
}

impl ProbeReport {
    pub fn unreachable() -> Self {
        Self {
            status: HealthStatus::Unreachable,
            latency_ms: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait NameserverChecker: Send + Sync {
    async fn check(&self, hostname: &str) -> Result<NsCheck>;
}

#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    async fn issue_or_renew(&self, hostname: &str) -> Result<CertOutcome>;
}

/// Pushes a post to its site. Must be safe to call twice for the same post.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, post: &Post, site: &Site) -> Result<PublishReceipt>;
}

/// Probes one server. Transport failures are reported as `Unreachable`, not `Err`.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, base_url: &str, timeout: Duration) -> ProbeReport;
}

#[async_trait]
pub trait Composer: Send + Sync {
    async fn compose(&self, site: &Site) -> Result<ComposedPost>;
}

/// The full set of collaborators handed to the reconcilers.
#[derive(Clone)]
pub struct Collaborators {
    pub nameservers: Arc<dyn NameserverChecker>,
    pub certificates: Arc<dyn CertificateIssuer>,
    pub publisher: Arc<dyn Publisher>,
    pub prober: Arc<dyn Prober>,
    pub composer: Arc<dyn Composer>,
}
