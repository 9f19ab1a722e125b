//! Persisted entities: domains, sites, posts and hosting servers.
//!
//! Each field that the reconcilers touch has exactly one writer:
//!
//! | Entity | Field(s) | Writer |
//! |--------|----------|--------|
//! | Domain | status, attempts, ssl_expires_at | domain status reconciler, explicit recheck |
//! | Site | last_autopost_at | autopost planner |
//! | Post | status, published_at, external_url | post publisher |
//! | Server | health_status, last_health_check_at | server health checker |

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::{Result, SiteopsError};
use crate::types::{DomainId, DomainStatus, HealthStatus, PostId, PostStatus, ServerId, SiteId};

// ---------------------------------------------------------------------------
// Hostname validation
// ---------------------------------------------------------------------------

fn hostname_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$").expect("valid regex")
    })
}

pub fn validate_hostname(hostname: &str) -> Result<()> {
    if hostname.len() > 253 || !hostname_re().is_match(hostname) {
        return Err(SiteopsError::InvalidHostname(hostname.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub id: DomainId,
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<SiteId>,
    pub status: DomainStatus,
    pub status_since: DateTime<Utc>,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ssl_expires_at: Option<DateTime<Utc>>,
    /// Incremented every time a check unit is issued.
    #[serde(default)]
    pub check_attempt: u64,
    /// Attempt whose result was last applied. Results from older attempts are dropped.
    #[serde(default)]
    pub applied_attempt: u64,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Domain {
    pub fn new(id: DomainId, hostname: impl Into<String>, site_id: Option<SiteId>) -> Self {
        let now = Utc::now();
        Self {
            id,
            hostname: hostname.into(),
            site_id,
            status: DomainStatus::Unchecked,
            status_since: now,
            last_checked_at: None,
            ssl_expires_at: None,
            check_attempt: 0,
            applied_attempt: 0,
            consecutive_failures: 0,
            last_error: None,
            created_at: now,
        }
    }

    /// Move along one edge of the lifecycle graph.
    pub fn advance(&mut self, to: DomainStatus, now: DateTime<Utc>) -> Result<()> {
        self.status = self.status.transition(to)?;
        self.status_since = now;
        Ok(())
    }

    /// Issue a new check attempt and return its number.
    pub fn begin_check(&mut self) -> u64 {
        self.check_attempt += 1;
        self.check_attempt
    }

    /// Whether a result produced by `attempt` may still be applied.
    pub fn accepts_attempt(&self, attempt: u64) -> bool {
        attempt > self.applied_attempt
    }

    /// Explicit user-triggered recheck: back to `NsPending` from any status.
    ///
    /// Every attempt issued so far is marked superseded, so results from
    /// units still in flight are discarded when they land.
    pub fn request_recheck(&mut self, now: DateTime<Utc>) {
        self.status = DomainStatus::NsPending;
        self.status_since = now;
        self.consecutive_failures = 0;
        self.last_error = None;
        self.applied_attempt = self.check_attempt;
    }

    /// True when a certificate exists that stays valid past `now + window`.
    ///
    /// A window reaching past the end of representable time covers every
    /// certificate, so none is valid beyond it.
    pub fn cert_valid_beyond(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match (self.ssl_expires_at, now.checked_add_signed(window)) {
            (Some(exp), Some(limit)) => exp > limit,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Site
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishTarget {
    /// Base URL of the site's publishing endpoint.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<DomainId>,
    #[serde(default)]
    pub autopost_enabled: bool,
    /// Seconds between autoposts.
    #[serde(default = "default_autopost_frequency")]
    pub autopost_frequency_secs: u64,
    #[serde(default)]
    pub last_autopost_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_target: Option<PublishTarget>,
    pub created_at: DateTime<Utc>,
}

fn default_autopost_frequency() -> u64 {
    24 * 60 * 60
}

/// Longest accepted autopost frequency: ten years.
pub const MAX_AUTOPOST_FREQUENCY_SECS: u64 = 10 * 366 * 24 * 60 * 60;

impl Site {
    pub fn new(id: SiteId, name: impl Into<String>, domain_id: Option<DomainId>) -> Self {
        Self {
            id,
            name: name.into(),
            domain_id,
            autopost_enabled: false,
            autopost_frequency_secs: default_autopost_frequency(),
            last_autopost_at: None,
            publish_target: None,
            created_at: Utc::now(),
        }
    }

    /// `None` when the frequency does not fit a time delta.
    pub fn autopost_frequency(&self) -> Option<Duration> {
        i64::try_from(self.autopost_frequency_secs)
            .ok()
            .and_then(Duration::try_seconds)
    }

    /// Next autopost time after `last_autopost_at`.
    ///
    /// `None` for a site that never autoposted, and for a frequency so large
    /// the site never comes due.
    pub fn autopost_due_at(&self) -> Option<DateTime<Utc>> {
        let last = self.last_autopost_at?;
        last.checked_add_signed(self.autopost_frequency()?)
    }

    pub fn is_autopost_due(&self, now: DateTime<Utc>) -> bool {
        if !self.autopost_enabled {
            return false;
        }
        match self.last_autopost_at {
            None => true,
            Some(_) => self.autopost_due_at().is_some_and(|due| now >= due),
        }
    }
}

// ---------------------------------------------------------------------------
// Post
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub site_id: SiteId,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub status: PostStatus,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == PostStatus::Scheduled && self.scheduled_at.is_some_and(|at| at <= now)
    }
}

/// A post that has not been assigned an id yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub site_id: SiteId,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub status: PostStatus,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NewPost {
    pub fn scheduled(
        site_id: SiteId,
        title: impl Into<String>,
        body: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            site_id,
            title: title.into(),
            body: body.into(),
            status: PostStatus::Scheduled,
            scheduled_at: Some(at),
        }
    }

    pub fn into_post(self, id: PostId) -> Post {
        let now = Utc::now();
        Post {
            id,
            site_id: self.site_id,
            title: self.title,
            body: self.body,
            status: self.status,
            scheduled_at: self.scheduled_at,
            published_at: None,
            external_url: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: ServerId,
    pub name: String,
    pub base_url: String,
    #[serde(default = "default_pool")]
    pub pool: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_primary: bool,
    pub health_status: HealthStatus,
    #[serde(default)]
    pub last_health_check_at: Option<DateTime<Utc>>,
    /// Length of the current run of `Unreachable` results.
    #[serde(default)]
    pub consecutive_unreachable: u32,
    #[serde(default)]
    pub last_latency_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

fn default_pool() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewServer {
    pub name: String,
    pub base_url: String,
    #[serde(default = "default_pool")]
    pub pool: String,
    #[serde(default)]
    pub is_primary: bool,
}

impl NewServer {
    pub fn into_server(self, id: ServerId) -> Server {
        Server {
            id,
            name: self.name,
            base_url: self.base_url,
            pool: self.pool,
            is_active: true,
            is_primary: self.is_primary,
            health_status: HealthStatus::Unknown,
            last_health_check_at: None,
            consecutive_unreachable: 0,
            last_latency_ms: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_validation() {
        assert!(validate_hostname("example.com").is_ok());
        assert!(validate_hostname("blog.my-site.co.uk").is_ok());
        assert!(validate_hostname("Example.com").is_err());
        assert!(validate_hostname("no_underscores.com").is_err());
        assert!(validate_hostname("localhost").is_err());
        assert!(validate_hostname("-bad.com").is_err());
    }

    #[test]
    fn advance_rejects_illegal_edge() {
        let mut d = Domain::new(1, "example.com", None);
        let now = Utc::now();
        assert!(d.advance(DomainStatus::SslActive, now).is_err());
        assert_eq!(d.status, DomainStatus::Unchecked);
        d.advance(DomainStatus::NsPending, now).unwrap();
        assert_eq!(d.status, DomainStatus::NsPending);
    }

    #[test]
    fn recheck_supersedes_in_flight_attempts() {
        let mut d = Domain::new(1, "example.com", None);
        let first = d.begin_check();
        let second = d.begin_check();
        assert!(d.accepts_attempt(first));
        d.request_recheck(Utc::now());
        assert!(!d.accepts_attempt(first));
        assert!(!d.accepts_attempt(second));
        let third = d.begin_check();
        assert!(d.accepts_attempt(third));
    }

    #[test]
    fn recheck_resets_failed_domain() {
        let mut d = Domain::new(1, "example.com", None);
        d.status = DomainStatus::SslFailed;
        d.consecutive_failures = 5;
        d.last_error = Some("acme down".into());
        d.request_recheck(Utc::now());
        assert_eq!(d.status, DomainStatus::NsPending);
        assert_eq!(d.consecutive_failures, 0);
        assert!(d.last_error.is_none());
    }

    #[test]
    fn cert_validity_window() {
        let now = Utc::now();
        let mut d = Domain::new(1, "example.com", None);
        assert!(!d.cert_valid_beyond(now, Duration::days(30)));
        d.ssl_expires_at = Some(now + Duration::days(10));
        assert!(!d.cert_valid_beyond(now, Duration::days(30)));
        d.ssl_expires_at = Some(now + Duration::days(60));
        assert!(d.cert_valid_beyond(now, Duration::days(30)));
    }

    #[test]
    fn autopost_due_computation() {
        let now = Utc::now();
        let mut site = Site::new(1, "blog", None);
        assert!(!site.is_autopost_due(now), "disabled site is never due");

        site.autopost_enabled = true;
        assert!(site.is_autopost_due(now), "never autoposted means due");

        site.last_autopost_at = Some(now - Duration::hours(25));
        assert!(site.is_autopost_due(now));

        site.last_autopost_at = Some(now - Duration::hours(23));
        assert!(!site.is_autopost_due(now));
    }

    #[test]
    fn oversized_autopost_frequency_is_never_due() {
        let now = Utc::now();
        let mut site = Site::new(1, "blog", None);
        site.autopost_enabled = true;
        site.last_autopost_at = Some(now - Duration::hours(2));

        for secs in [u64::MAX, i64::MAX as u64, 9_000_000_000_000_000] {
            site.autopost_frequency_secs = secs;
            assert!(!site.is_autopost_due(now), "frequency {secs}s");
            assert!(site.autopost_due_at().is_none());
        }

        site.autopost_frequency_secs = MAX_AUTOPOST_FREQUENCY_SECS;
        assert!(site.autopost_due_at().is_some_and(|due| due > now));
    }

    #[test]
    fn huge_renewal_window_does_not_overflow() {
        let now = Utc::now();
        let mut d = Domain::new(1, "example.com", None);
        d.ssl_expires_at = Some(now + Duration::days(60));
        assert!(!d.cert_valid_beyond(now, Duration::days(4_000_000_000)));
        assert!(!d.cert_valid_beyond(now, Duration::MAX));
    }

    #[test]
    fn post_due_requires_scheduled_status() {
        let now = Utc::now();
        let mut post = NewPost::scheduled(1, "t", "b", now - Duration::minutes(1)).into_post(1);
        assert!(post.is_due(now));
        post.status = PostStatus::Failed;
        assert!(!post.is_due(now));
    }
}
