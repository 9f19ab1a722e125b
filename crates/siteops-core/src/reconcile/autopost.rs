//! Creates the next post for sites with autoposting enabled.
//!
//! `last_autopost_at` only advances when the generated post has been
//! stored, so a failed compose leaves the site due for the next sweep.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::{Candidate, Reconciler};
use crate::collab::Composer;
use crate::entity::NewPost;
use crate::error::Result;
use crate::orchestrator::{UnitAction, UnitOutcome, UnitReport, WorkUnit};
use crate::store::Store;
use crate::types::{EntityRef, ReconcilerKind};

pub struct AutopostPlanner {
    store: Arc<dyn Store>,
    composer: Arc<dyn Composer>,
}

impl AutopostPlanner {
    pub fn new(store: Arc<dyn Store>, composer: Arc<dyn Composer>) -> Self {
        Self { store, composer }
    }
}

#[async_trait]
impl Reconciler for AutopostPlanner {
    fn kind(&self) -> ReconcilerKind {
        ReconcilerKind::Autopost
    }

    fn select_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Candidate>> {
        Ok(self
            .store
            .list_sites()?
            .into_iter()
            .filter(|s| s.is_autopost_due(now))
            .map(Candidate::Site)
            .collect())
    }

    fn plan_unit(
        &self,
        trigger: &str,
        candidate: Candidate,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkUnit>> {
        let Candidate::Site(site) = candidate else {
            return Ok(None);
        };
        Ok(Some(WorkUnit::new(
            trigger,
            EntityRef::Site(site.id),
            UnitAction::Autopost { site_id: site.id },
            1,
            now,
        )))
    }

    async fn execute(&self, unit: &WorkUnit) -> std::result::Result<UnitOutcome, String> {
        let UnitAction::Autopost { site_id } = &unit.action else {
            return Err(format!("autopost planner cannot run {}", unit.action.name()));
        };
        let site = self
            .store
            .get_site(*site_id)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("site {site_id} no longer exists"))?;
        if !site.is_autopost_due(unit.planned_at) {
            return Ok(UnitOutcome::Skipped {
                reason: "autopost no longer due".into(),
            });
        }
        let post = self.composer.compose(&site).await.map_err(|e| e.to_string())?;
        if post.title.trim().is_empty() {
            return Err("composer returned an empty title".into());
        }
        Ok(UnitOutcome::Composed { post })
    }

    fn apply_result(&self, report: &UnitReport) -> Result<()> {
        let EntityRef::Site(site_id) = report.unit.target else {
            return Ok(());
        };
        let composed = match &report.result {
            Ok(UnitOutcome::Composed { post }) => post,
            Ok(_) => return Ok(()),
            Err(failure) => {
                warn!(site = site_id, error = %failure, "autopost failed, site stays due");
                return Ok(());
            }
        };

        // Someone may have posted (or disabled autoposting) while we composed.
        let Some(site) = self.store.get_site(site_id)? else {
            return Ok(());
        };
        if !site.is_autopost_due(report.unit.planned_at) {
            debug!(site = site_id, "autopost no longer due, composed post dropped");
            return Ok(());
        }

        let now = report.finished_at;
        let post = self.store.record_autopost(
            site_id,
            NewPost::scheduled(site_id, composed.title.clone(), composed.body.clone(), now),
            now,
        )?;
        info!(site = site_id, post = post.id, title = %post.title, "autopost scheduled");
        Ok(())
    }
}
