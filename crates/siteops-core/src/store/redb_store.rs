//! redb-backed entity store.
//!
//! # Table design
//!
//! Entities live in one table per kind, keyed by their `u64` id with a
//! JSON-encoded value. Ids come from the `sequences` table.
//!
//! Scheduled posts are additionally indexed in `post_schedule` under a
//! 16-byte composite key:
//! ```text
//! [ scheduled_at_ms: u64 big-endian (8 bytes) | post_id: u64 big-endian (8 bytes) ]
//! ```
//! Byte ordering equals timestamp ordering, so a single range scan
//! `..=due_upper_bound(now)` returns every due post oldest first. The index
//! only holds posts whose status is `Scheduled`; it is maintained by every
//! post write.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::entity::{validate_hostname, Domain, NewPost, NewServer, Post, Server, Site};
use crate::error::{Result, SiteopsError};
use crate::types::{DomainId, PostId, PostStatus, ServerId, SiteId};

use super::{Mutator, Store};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

type JsonTable = TableDefinition<'static, u64, &'static [u8]>;

pub(crate) const DOMAINS: JsonTable = TableDefinition::new("domains");
pub(crate) const SITES: JsonTable = TableDefinition::new("sites");
pub(crate) const POSTS: JsonTable = TableDefinition::new("posts");
pub(crate) const SERVERS: JsonTable = TableDefinition::new("servers");

/// Key: 16-byte composite (scheduled_at_ms ++ post id). Value: post id.
pub(crate) const POST_SCHEDULE: TableDefinition<&[u8], u64> =
    TableDefinition::new("post_schedule");

/// Key: sequence name. Value: last id handed out.
pub(crate) const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Create every entity table so read transactions never hit a missing table.
pub(crate) fn ensure_tables(wt: &WriteTransaction) -> Result<()> {
    for def in [DOMAINS, SITES, POSTS, SERVERS] {
        wt.open_table(def).map_err(SiteopsError::store)?;
    }
    wt.open_table(POST_SCHEDULE).map_err(SiteopsError::store)?;
    wt.open_table(SEQUENCES).map_err(SiteopsError::store)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn schedule_key(at: DateTime<Utc>, id: PostId) -> [u8; 16] {
    let mut key = [0u8; 16];
    let ms = at.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}

/// Upper bound for a range scan returning all posts due by `now`.
fn due_upper_bound(now: DateTime<Utc>) -> [u8; 16] {
    let mut key = [0u8; 16];
    let ms = now.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].fill(0xff);
    key
}

/// Index key for `post`, if it belongs in the schedule index at all.
fn index_key(post: &Post) -> Option<[u8; 16]> {
    match (post.status, post.scheduled_at) {
        (PostStatus::Scheduled, Some(at)) => Some(schedule_key(at, post.id)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Transaction-scoped helpers
// ---------------------------------------------------------------------------

fn next_id(wt: &WriteTransaction, sequence: &str) -> Result<u64> {
    let mut table = wt.open_table(SEQUENCES).map_err(SiteopsError::store)?;
    let current = table
        .get(sequence)
        .map_err(SiteopsError::store)?
        .map(|g| g.value())
        .unwrap_or(0);
    let next = current + 1;
    table.insert(sequence, next).map_err(SiteopsError::store)?;
    Ok(next)
}

fn get_in<T: DeserializeOwned>(wt: &WriteTransaction, def: JsonTable, id: u64) -> Result<Option<T>> {
    let table = wt.open_table(def).map_err(SiteopsError::store)?;
    let bytes = table
        .get(id)
        .map_err(SiteopsError::store)?
        .map(|g| g.value().to_vec());
    match bytes {
        Some(b) => Ok(Some(serde_json::from_slice(&b)?)),
        None => Ok(None),
    }
}

fn put_in<T: Serialize>(wt: &WriteTransaction, def: JsonTable, id: u64, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    let mut table = wt.open_table(def).map_err(SiteopsError::store)?;
    table
        .insert(id, bytes.as_slice())
        .map_err(SiteopsError::store)?;
    Ok(())
}

/// Write `post` and keep the schedule index in step with it.
fn save_post_in(wt: &WriteTransaction, post: &Post) -> Result<()> {
    let previous: Option<Post> = get_in(wt, POSTS, post.id)?;
    {
        let mut index = wt.open_table(POST_SCHEDULE).map_err(SiteopsError::store)?;
        if let Some(key) = previous.as_ref().and_then(index_key) {
            index.remove(key.as_slice()).map_err(SiteopsError::store)?;
        }
        if let Some(key) = index_key(post) {
            index
                .insert(key.as_slice(), post.id)
                .map_err(SiteopsError::store)?;
        }
    }
    put_in(wt, POSTS, post.id, post)
}

// ---------------------------------------------------------------------------
// RedbStore
// ---------------------------------------------------------------------------

/// Persistent store for domains, sites, posts and servers.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn read<T: DeserializeOwned>(&self, def: JsonTable, id: u64) -> Result<Option<T>> {
        let rt = self.db.begin_read().map_err(SiteopsError::store)?;
        let table = rt.open_table(def).map_err(SiteopsError::store)?;
        let value = table.get(id).map_err(SiteopsError::store)?;
        match value {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    fn read_all<T: DeserializeOwned>(&self, def: JsonTable) -> Result<Vec<T>> {
        let rt = self.db.begin_read().map_err(SiteopsError::store)?;
        let table = rt.open_table(def).map_err(SiteopsError::store)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(SiteopsError::store)? {
            let (_, v) = entry.map_err(SiteopsError::store)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    /// Run `body` inside one write transaction and commit it.
    fn write<R>(&self, body: impl FnOnce(&WriteTransaction) -> Result<R>) -> Result<R> {
        let wt = self.db.begin_write().map_err(SiteopsError::store)?;
        // Dropping `wt` on error aborts the transaction.
        let out = body(&wt)?;
        wt.commit().map_err(SiteopsError::store)?;
        Ok(out)
    }

    fn update<T: Serialize + DeserializeOwned>(
        &self,
        def: JsonTable,
        id: u64,
        not_found: fn(u64) -> SiteopsError,
        f: Mutator<'_, T>,
    ) -> Result<T> {
        self.write(|wt| {
            let mut value: T = get_in(wt, def, id)?.ok_or_else(|| not_found(id))?;
            f(&mut value)?;
            put_in(wt, def, id, &value)?;
            Ok(value)
        })
    }
}

impl Store for RedbStore {
    fn insert_domain(&self, hostname: &str, site_id: Option<SiteId>) -> Result<Domain> {
        validate_hostname(hostname)?;
        if self.list_domains()?.iter().any(|d| d.hostname == hostname) {
            return Err(SiteopsError::DomainExists(hostname.to_string()));
        }
        self.write(|wt| {
            let domain = Domain::new(next_id(wt, "domains")?, hostname, site_id);
            put_in(wt, DOMAINS, domain.id, &domain)?;
            Ok(domain)
        })
    }

    fn get_domain(&self, id: DomainId) -> Result<Option<Domain>> {
        self.read(DOMAINS, id)
    }

    fn list_domains(&self) -> Result<Vec<Domain>> {
        self.read_all(DOMAINS)
    }

    fn update_domain(&self, id: DomainId, f: Mutator<'_, Domain>) -> Result<Domain> {
        self.update(DOMAINS, id, SiteopsError::DomainNotFound, f)
    }

    fn insert_site(&self, name: &str, domain_id: Option<DomainId>) -> Result<Site> {
        if let Some(did) = domain_id {
            if self.get_domain(did)?.is_none() {
                return Err(SiteopsError::DomainNotFound(did));
            }
        }
        self.write(|wt| {
            let site = Site::new(next_id(wt, "sites")?, name, domain_id);
            put_in(wt, SITES, site.id, &site)?;
            if let Some(did) = domain_id {
                // Back-reference is lookup-only; the domain reconciler never reads it.
                if let Some(mut domain) = get_in::<Domain>(wt, DOMAINS, did)? {
                    domain.site_id = Some(site.id);
                    put_in(wt, DOMAINS, did, &domain)?;
                }
            }
            Ok(site)
        })
    }

    fn get_site(&self, id: SiteId) -> Result<Option<Site>> {
        self.read(SITES, id)
    }

    fn list_sites(&self) -> Result<Vec<Site>> {
        self.read_all(SITES)
    }

    fn update_site(&self, id: SiteId, f: Mutator<'_, Site>) -> Result<Site> {
        self.update(SITES, id, SiteopsError::SiteNotFound, f)
    }

    fn insert_post(&self, new: NewPost) -> Result<Post> {
        if self.get_site(new.site_id)?.is_none() {
            return Err(SiteopsError::SiteNotFound(new.site_id));
        }
        self.write(|wt| {
            let post = new.into_post(next_id(wt, "posts")?);
            save_post_in(wt, &post)?;
            Ok(post)
        })
    }

    fn get_post(&self, id: PostId) -> Result<Option<Post>> {
        self.read(POSTS, id)
    }

    fn list_posts(&self, site_id: Option<SiteId>) -> Result<Vec<Post>> {
        let mut posts: Vec<Post> = self.read_all(POSTS)?;
        if let Some(sid) = site_id {
            posts.retain(|p| p.site_id == sid);
        }
        Ok(posts)
    }

    fn update_post(&self, id: PostId, f: Mutator<'_, Post>) -> Result<Post> {
        self.write(|wt| {
            let mut post: Post = get_in(wt, POSTS, id)?.ok_or(SiteopsError::PostNotFound(id))?;
            f(&mut post)?;
            post.updated_at = Utc::now();
            save_post_in(wt, &post)?;
            Ok(post)
        })
    }

    fn due_posts(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Post>> {
        let upper = due_upper_bound(now);
        let rt = self.db.begin_read().map_err(SiteopsError::store)?;
        let index = rt.open_table(POST_SCHEDULE).map_err(SiteopsError::store)?;
        let posts = rt.open_table(POSTS).map_err(SiteopsError::store)?;

        let mut result = Vec::new();
        for entry in index
            .range(..=upper.as_slice())
            .map_err(SiteopsError::store)?
        {
            if result.len() >= limit {
                break;
            }
            let (_, id) = entry.map_err(SiteopsError::store)?;
            let Some(raw) = posts.get(id.value()).map_err(SiteopsError::store)? else {
                continue;
            };
            let post: Post = serde_json::from_slice(raw.value())?;
            if post.is_due(now) {
                result.push(post);
            }
        }
        Ok(result)
    }

    fn record_autopost(&self, site_id: SiteId, new: NewPost, at: DateTime<Utc>) -> Result<Post> {
        self.write(|wt| {
            let mut site: Site =
                get_in(wt, SITES, site_id)?.ok_or(SiteopsError::SiteNotFound(site_id))?;
            let post = new.into_post(next_id(wt, "posts")?);
            save_post_in(wt, &post)?;
            site.last_autopost_at = Some(at);
            put_in(wt, SITES, site_id, &site)?;
            Ok(post)
        })
    }

    fn insert_server(&self, new: NewServer) -> Result<Server> {
        if new.is_primary
            && self
                .list_servers()?
                .iter()
                .any(|s| s.pool == new.pool && s.is_primary)
        {
            return Err(SiteopsError::PrimaryExists(new.pool));
        }
        self.write(|wt| {
            let server = new.into_server(next_id(wt, "servers")?);
            put_in(wt, SERVERS, server.id, &server)?;
            Ok(server)
        })
    }

    fn get_server(&self, id: ServerId) -> Result<Option<Server>> {
        self.read(SERVERS, id)
    }

    fn list_servers(&self) -> Result<Vec<Server>> {
        self.read_all(SERVERS)
    }

    fn update_server(&self, id: ServerId, f: Mutator<'_, Server>) -> Result<Server> {
        self.update(SERVERS, id, SiteopsError::ServerNotFound, f)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::types::DomainStatus;
    use chrono::Duration as CDur;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, RedbStore) {
        let dir = TempDir::new().unwrap();
        let database = db::open(&dir.path().join("test.redb")).unwrap();
        (dir, RedbStore::new(database))
    }

    fn site(store: &RedbStore) -> Site {
        store.insert_site("blog", None).unwrap()
    }

    #[test]
    fn ids_are_sequential_per_kind() {
        let (_dir, store) = open_tmp();
        let a = store.insert_domain("a.example.com", None).unwrap();
        let b = store.insert_domain("b.example.com", None).unwrap();
        let s = site(&store);
        assert_eq!((a.id, b.id, s.id), (1, 2, 1));
    }

    #[test]
    fn duplicate_hostname_rejected() {
        let (_dir, store) = open_tmp();
        store.insert_domain("example.com", None).unwrap();
        let err = store.insert_domain("example.com", None).unwrap_err();
        assert!(matches!(err, SiteopsError::DomainExists(_)));
    }

    #[test]
    fn insert_site_links_domain() {
        let (_dir, store) = open_tmp();
        let d = store.insert_domain("example.com", None).unwrap();
        let s = store.insert_site("blog", Some(d.id)).unwrap();
        let d = store.get_domain(d.id).unwrap().unwrap();
        assert_eq!(d.site_id, Some(s.id));
    }

    #[test]
    fn update_domain_error_aborts_write() {
        let (_dir, store) = open_tmp();
        let d = store.insert_domain("example.com", None).unwrap();
        let err = store
            .update_domain(d.id, &mut |d: &mut Domain| {
                d.consecutive_failures = 99;
                d.advance(DomainStatus::SslActive, Utc::now())
            })
            .unwrap_err();
        assert!(matches!(err, SiteopsError::InvalidTransition { .. }));
        let d = store.get_domain(d.id).unwrap().unwrap();
        assert_eq!(d.consecutive_failures, 0);
    }

    #[test]
    fn update_missing_domain_is_not_found() {
        let (_dir, store) = open_tmp();
        let err = store.update_domain(7, &mut |_: &mut Domain| Ok(())).unwrap_err();
        assert!(matches!(err, SiteopsError::DomainNotFound(7)));
    }

    #[test]
    fn due_posts_returns_only_past_in_timestamp_order() {
        let (_dir, store) = open_tmp();
        let s = site(&store);
        let now = Utc::now();
        // Insert out of chronological order.
        store
            .insert_post(NewPost::scheduled(s.id, "late", "", now + CDur::minutes(5)))
            .unwrap();
        store
            .insert_post(NewPost::scheduled(s.id, "second", "", now - CDur::minutes(5)))
            .unwrap();
        store
            .insert_post(NewPost::scheduled(s.id, "first", "", now - CDur::minutes(10)))
            .unwrap();

        let due = store.due_posts(now, 100).unwrap();
        let titles: Vec<_> = due.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["first", "second"]);
    }

    #[test]
    fn due_posts_respects_limit() {
        let (_dir, store) = open_tmp();
        let s = site(&store);
        let now = Utc::now();
        for i in 0..5 {
            store
                .insert_post(NewPost::scheduled(s.id, format!("p{i}"), "", now - CDur::minutes(i)))
                .unwrap();
        }
        assert_eq!(store.due_posts(now, 2).unwrap().len(), 2);
    }

    #[test]
    fn status_change_removes_post_from_schedule_index() {
        let (_dir, store) = open_tmp();
        let s = site(&store);
        let now = Utc::now();
        let p = store
            .insert_post(NewPost::scheduled(s.id, "p", "", now - CDur::minutes(1)))
            .unwrap();
        store
            .update_post(p.id, &mut |p: &mut Post| {
                p.status = PostStatus::Published;
                Ok(())
            })
            .unwrap();
        assert!(store.due_posts(now, 100).unwrap().is_empty());
    }

    #[test]
    fn reschedule_moves_index_entry() {
        let (_dir, store) = open_tmp();
        let s = site(&store);
        let now = Utc::now();
        let p = store
            .insert_post(NewPost::scheduled(s.id, "p", "", now - CDur::minutes(1)))
            .unwrap();
        store
            .update_post(p.id, &mut |p: &mut Post| {
                p.scheduled_at = Some(now + CDur::hours(1));
                Ok(())
            })
            .unwrap();
        assert!(store.due_posts(now, 100).unwrap().is_empty());
        assert_eq!(store.due_posts(now + CDur::hours(2), 100).unwrap().len(), 1);
    }

    #[test]
    fn record_autopost_creates_post_and_advances_site() {
        let (_dir, store) = open_tmp();
        let s = site(&store);
        let now = Utc::now();
        let post = store
            .record_autopost(s.id, NewPost::scheduled(s.id, "auto", "body", now), now)
            .unwrap();
        assert_eq!(post.status, PostStatus::Scheduled);
        let s = store.get_site(s.id).unwrap().unwrap();
        assert_eq!(s.last_autopost_at, Some(now));
        assert_eq!(store.list_posts(Some(s.id)).unwrap().len(), 1);
    }

    #[test]
    fn record_autopost_for_missing_site_writes_nothing() {
        let (_dir, store) = open_tmp();
        let now = Utc::now();
        let err = store
            .record_autopost(9, NewPost::scheduled(9, "auto", "", now), now)
            .unwrap_err();
        assert!(matches!(err, SiteopsError::SiteNotFound(9)));
        assert!(store.list_posts(None).unwrap().is_empty());
    }

    #[test]
    fn second_primary_in_pool_rejected() {
        let (_dir, store) = open_tmp();
        let primary = NewServer {
            name: "web-1".into(),
            base_url: "http://10.0.0.1".into(),
            pool: "eu".into(),
            is_primary: true,
        };
        store.insert_server(primary.clone()).unwrap();
        let err = store
            .insert_server(NewServer {
                name: "web-2".into(),
                ..primary.clone()
            })
            .unwrap_err();
        assert!(matches!(err, SiteopsError::PrimaryExists(_)));

        // A primary in another pool is fine.
        store
            .insert_server(NewServer {
                name: "web-3".into(),
                pool: "us".into(),
                ..primary
            })
            .unwrap();
    }

    #[test]
    fn list_active_servers_filters_inactive() {
        let (_dir, store) = open_tmp();
        let s = store
            .insert_server(NewServer {
                name: "web-1".into(),
                base_url: "http://10.0.0.1".into(),
                pool: "default".into(),
                is_primary: false,
            })
            .unwrap();
        assert_eq!(store.list_active_servers().unwrap().len(), 1);
        store
            .update_server(s.id, &mut |s: &mut Server| {
                s.is_active = false;
                Ok(())
            })
            .unwrap();
        assert!(store.list_active_servers().unwrap().is_empty());
    }
}
