//! Entity persistence seam.
//!
//! Reconcilers only see the [`Store`] trait. [`RedbStore`] is the embedded
//! implementation the daemon ships with.

pub mod redb_store;

pub use redb_store::RedbStore;

use chrono::{DateTime, Utc};

use crate::entity::{Domain, NewPost, NewServer, Post, Server, Site};
use crate::error::{Result, SiteopsError};
use crate::types::{DomainId, PostId, ServerId, SiteId};

/// Run store work on tokio's blocking pool.
///
/// redb commits fsync; async callers go through here so a slow commit never
/// parks a runtime worker.
pub async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SiteopsError::Store(format!("blocking task failed: {e}")))?
}

/// In-place edit applied inside a single write transaction.
pub type Mutator<'a, T> = &'a mut dyn FnMut(&mut T) -> Result<()>;

pub trait Store: Send + Sync {
    // -- domains ------------------------------------------------------------

    fn insert_domain(&self, hostname: &str, site_id: Option<SiteId>) -> Result<Domain>;
    fn get_domain(&self, id: DomainId) -> Result<Option<Domain>>;
    fn list_domains(&self) -> Result<Vec<Domain>>;
    /// Atomic read-modify-write. An `Err` from `f` aborts without writing.
    fn update_domain(&self, id: DomainId, f: Mutator<'_, Domain>) -> Result<Domain>;

    // -- sites --------------------------------------------------------------

    fn insert_site(&self, name: &str, domain_id: Option<DomainId>) -> Result<Site>;
    fn get_site(&self, id: SiteId) -> Result<Option<Site>>;
    fn list_sites(&self) -> Result<Vec<Site>>;
    fn update_site(&self, id: SiteId, f: Mutator<'_, Site>) -> Result<Site>;

    // -- posts --------------------------------------------------------------

    fn insert_post(&self, new: NewPost) -> Result<Post>;
    fn get_post(&self, id: PostId) -> Result<Option<Post>>;
    fn list_posts(&self, site_id: Option<SiteId>) -> Result<Vec<Post>>;
    fn update_post(&self, id: PostId, f: Mutator<'_, Post>) -> Result<Post>;
    /// Scheduled posts with `scheduled_at <= now`, oldest first, at most `limit`.
    fn due_posts(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Post>>;
    /// Create `new` and set the site's `last_autopost_at = at` in one transaction.
    fn record_autopost(&self, site_id: SiteId, new: NewPost, at: DateTime<Utc>) -> Result<Post>;

    // -- servers ------------------------------------------------------------

    fn insert_server(&self, new: NewServer) -> Result<Server>;
    fn get_server(&self, id: ServerId) -> Result<Option<Server>>;
    fn list_servers(&self) -> Result<Vec<Server>>;
    fn update_server(&self, id: ServerId, f: Mutator<'_, Server>) -> Result<Server>;

    fn list_active_servers(&self) -> Result<Vec<Server>> {
        Ok(self
            .list_servers()?
            .into_iter()
            .filter(|s| s.is_active)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocking_returns_closure_result() {
        assert_eq!(blocking(|| Ok(7)).await.unwrap(), 7);
        let err = blocking(|| -> Result<()> { Err(SiteopsError::PoolClosed) })
            .await
            .unwrap_err();
        assert!(matches!(err, SiteopsError::PoolClosed));
    }

    #[tokio::test]
    async fn blocking_panic_becomes_store_error() {
        let err = blocking(|| -> Result<()> { panic!("commit exploded") })
            .await
            .unwrap_err();
        assert!(matches!(err, SiteopsError::Store(_)));
    }

    #[tokio::test]
    async fn blocking_runs_off_the_calling_thread() {
        let caller = std::thread::current().id();
        let worker = blocking(|| Ok(std::thread::current().id())).await.unwrap();
        assert_ne!(worker, caller);
    }
}
