//! Publishes scheduled posts whose time has come.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::{Candidate, Reconciler};
use crate::collab::Publisher;
use crate::entity::Post;
use crate::error::Result;
use crate::orchestrator::{UnitAction, UnitOutcome, UnitReport, WorkUnit};
use crate::store::Store;
use crate::types::{EntityRef, PostStatus, ReconcilerKind, SiteId};

#[derive(Debug, Clone)]
pub struct PublisherPolicy {
    pub max_posts_per_sweep: usize,
}

impl Default for PublisherPolicy {
    fn default() -> Self {
        Self {
            max_posts_per_sweep: 100,
        }
    }
}

pub struct PostPublisher {
    store: Arc<dyn Store>,
    publisher: Arc<dyn Publisher>,
    policy: PublisherPolicy,
}

impl PostPublisher {
    pub fn new(store: Arc<dyn Store>, publisher: Arc<dyn Publisher>, policy: PublisherPolicy) -> Self {
        Self {
            store,
            publisher,
            policy,
        }
    }

    /// A site can receive posts once its domain's nameservers point at us.
    fn site_publishable(&self, site_id: SiteId) -> Result<bool> {
        let Some(site) = self.store.get_site(site_id)? else {
            return Ok(false);
        };
        let Some(domain_id) = site.domain_id else {
            return Ok(false);
        };
        Ok(self
            .store
            .get_domain(domain_id)?
            .is_some_and(|d| d.status.is_publishable()))
    }
}

#[async_trait]
impl Reconciler for PostPublisher {
    fn kind(&self) -> ReconcilerKind {
        ReconcilerKind::PostPublisher
    }

    /// Due posts on publishable sites, oldest `scheduled_at` first.
    fn select_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Candidate>> {
        let mut publishable: HashMap<SiteId, bool> = HashMap::new();
        let mut candidates = Vec::new();
        for post in self.store.due_posts(now, usize::MAX)? {
            let ok = match publishable.get(&post.site_id) {
                Some(ok) => *ok,
                None => {
                    let ok = self.site_publishable(post.site_id)?;
                    publishable.insert(post.site_id, ok);
                    ok
                }
            };
            if !ok {
                debug!(post = post.id, site = post.site_id, "site not publishable yet, leaving scheduled");
                continue;
            }
            candidates.push(Candidate::Post(post));
        }
        Ok(candidates)
    }

    fn max_units_per_sweep(&self) -> Option<usize> {
        Some(self.policy.max_posts_per_sweep)
    }

    fn plan_unit(
        &self,
        trigger: &str,
        candidate: Candidate,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkUnit>> {
        let Candidate::Post(post) = candidate else {
            return Ok(None);
        };
        Ok(Some(WorkUnit::new(
            trigger,
            EntityRef::Post(post.id),
            UnitAction::Publish {
                post_id: post.id,
                site_id: post.site_id,
            },
            1,
            now,
        )))
    }

    async fn execute(&self, unit: &WorkUnit) -> std::result::Result<UnitOutcome, String> {
        let UnitAction::Publish { post_id, site_id } = &unit.action else {
            return Err(format!("post publisher cannot run {}", unit.action.name()));
        };
        let post = self
            .store
            .get_post(*post_id)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("post {post_id} no longer exists"))?;
        if !post.is_due(unit.planned_at) {
            return Ok(UnitOutcome::Skipped {
                reason: match post.status {
                    PostStatus::Scheduled => "post was rescheduled".to_string(),
                    status => format!("post is {status}"),
                },
            });
        }
        let site = self
            .store
            .get_site(*site_id)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("site {site_id} no longer exists"))?;
        self.publisher
            .publish(&post, &site)
            .await
            .map(|receipt| UnitOutcome::Published { receipt })
            .map_err(|e| e.to_string())
    }

    fn apply_result(&self, report: &UnitReport) -> Result<()> {
        let EntityRef::Post(id) = report.unit.target else {
            return Ok(());
        };
        if let Ok(UnitOutcome::Skipped { reason }) = &report.result {
            debug!(post = id, %reason, "publish skipped");
            return Ok(());
        }
        let Some(current) = self.store.get_post(id)? else {
            return Ok(());
        };
        let planned_at = report.unit.planned_at;
        if !current.is_due(planned_at) {
            // Published, pulled or rescheduled since planning; leave it alone.
            debug!(post = id, status = %current.status, "post no longer due, result ignored");
            return Ok(());
        }

        let now = report.finished_at;
        let updated = self.store.update_post(id, &mut |p: &mut Post| {
            if !p.is_due(planned_at) {
                return Ok(());
            }
            match &report.result {
                Ok(UnitOutcome::Published { receipt }) => {
                    p.status = PostStatus::Published;
                    p.published_at = Some(now);
                    p.external_url = receipt.external_url.clone();
                    p.last_error = None;
                }
                Ok(_) => {}
                Err(failure) => {
                    p.status = PostStatus::Failed;
                    p.last_error = Some(failure.to_string());
                }
            }
            Ok(())
        })?;
        match updated.status {
            PostStatus::Published => info!(post = id, url = ?updated.external_url, "post published"),
            PostStatus::Failed => warn!(
                post = id,
                error = updated.last_error.as_deref().unwrap_or(""),
                "post publish failed"
            ),
            _ => {}
        }
        Ok(())
    }
}
