//! Wiring: config → database → store, ledger, dispatcher, collaborators →
//! reconcilers → scheduler.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use redb::Database;
use tracing::{info, warn};

use crate::collab::{
    Collaborators, CommandCertificateIssuer, CommandComposer, DohNameserverChecker, HttpProber,
    WebhookPublisher,
};
use crate::config::{Config, TriggerAction, TriggerConfig};
use crate::error::{Result, SiteopsError};
use crate::housekeeping::CommandRunnable;
use crate::orchestrator::{Dispatcher, RunLedger, RunOutcome, Runnable, Scheduler};
use crate::reconcile::{
    AutopostPlanner, DomainStatusReconciler, PostPublisher, Reconciler, ReconcilerRunnable,
    ServerHealthChecker,
};
use crate::store::RedbStore;
use crate::types::ReconcilerKind;

/// Build the HTTP and command adapters described by `config`.
pub fn default_collaborators(config: &Config) -> Result<Collaborators> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.publishing.request_timeout_secs.max(1)))
        .user_agent(concat!("siteops/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let d = &config.domains;
    Ok(Collaborators {
        nameservers: Arc::new(DohNameserverChecker::new(
            client.clone(),
            d.doh_endpoint.clone(),
            &d.expected_nameservers,
        )),
        certificates: Arc::new(CommandCertificateIssuer::new(
            d.certificate_command.clone(),
            Duration::from_secs(d.certificate_timeout_secs),
        )),
        publisher: Arc::new(WebhookPublisher::new(client.clone())),
        prober: Arc::new(HttpProber::new(
            client,
            config.health.path.clone(),
            Duration::from_millis(config.health.degraded_after_ms),
        )),
        composer: Arc::new(CommandComposer::new(
            config.autopost.composer_command.clone(),
            Duration::from_secs(config.autopost.composer_timeout_secs),
        )),
    })
}

pub struct Daemon {
    config: Config,
    store: Arc<RedbStore>,
    ledger: RunLedger,
    dispatcher: Dispatcher,
    collaborators: Collaborators,
}

impl Daemon {
    /// Open the database next to `config_path` and wire the default adapters.
    pub fn open(config: Config, config_path: &Path) -> Result<Self> {
        let db = crate::db::open(&config.database_path(config_path))?;
        let collaborators = default_collaborators(&config)?;
        Ok(Self::with_collaborators(config, db, collaborators))
    }

    pub fn with_collaborators(
        config: Config,
        db: Arc<Database>,
        collaborators: Collaborators,
    ) -> Self {
        let dispatcher = Dispatcher::new(config.dispatcher_config());
        Self {
            store: Arc::new(RedbStore::new(Arc::clone(&db))),
            ledger: RunLedger::new(db),
            dispatcher,
            collaborators,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> Arc<RedbStore> {
        Arc::clone(&self.store)
    }

    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn reconciler(&self, kind: ReconcilerKind) -> Arc<dyn Reconciler> {
        let c = &self.collaborators;
        let store = self.store.clone();
        match kind {
            ReconcilerKind::DomainStatus => Arc::new(DomainStatusReconciler::new(
                store,
                Arc::clone(&c.nameservers),
                Arc::clone(&c.certificates),
                self.config.domain_policy(),
            )),
            ReconcilerKind::PostPublisher => Arc::new(PostPublisher::new(
                store,
                Arc::clone(&c.publisher),
                self.config.publisher_policy(),
            )),
            ReconcilerKind::Autopost => {
                Arc::new(AutopostPlanner::new(store, Arc::clone(&c.composer)))
            }
            ReconcilerKind::ServerHealth => Arc::new(ServerHealthChecker::new(
                store,
                Arc::clone(&c.prober),
                self.config.health_policy(),
            )),
        }
    }

    fn runnable(&self, trigger: &TriggerConfig) -> Result<Arc<dyn Runnable>> {
        match &trigger.action {
            TriggerAction::Reconcile { reconciler } => {
                let kind: ReconcilerKind = reconciler.parse()?;
                Ok(Arc::new(ReconcilerRunnable::new(
                    self.reconciler(kind),
                    self.dispatcher.clone(),
                    self.config.sweep_max_wait(),
                )))
            }
            TriggerAction::Command { argv, timeout_secs } => Ok(Arc::new(CommandRunnable::new(
                argv.clone(),
                Duration::from_secs(*timeout_secs),
            )?)),
        }
    }

    /// A scheduler with every configured trigger registered.
    pub fn scheduler(&self) -> Result<Scheduler> {
        let mut scheduler = Scheduler::new(self.ledger.clone(), self.config.scheduler_config());
        for trigger in &self.config.triggers {
            let runnable = self.runnable(trigger).map_err(|e| {
                SiteopsError::InvalidConfig(format!("trigger '{}': {e}", trigger.name))
            })?;
            scheduler.register(trigger.name.clone(), trigger.interval(), runnable)?;
        }
        Ok(scheduler)
    }

    /// Fire one trigger now and wait for it and its units.
    ///
    /// Returns `None` when another run currently holds the trigger.
    pub async fn run_trigger(&self, name: &str) -> Result<Option<RunOutcome>> {
        let scheduler = self.scheduler()?;
        let outcome = scheduler.run_now(name).await?;
        self.drain().await;
        Ok(outcome)
    }

    /// Run the scheduler until `shutdown` resolves, then drain the pool.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let scheduler = self.scheduler()?;
        info!(
            triggers = self.config.triggers.len(),
            pool = self.dispatcher.capacity(),
            "daemon started"
        );
        let handle = scheduler.start();
        shutdown.await;
        info!("shutdown requested");
        handle.shutdown().await;
        self.dispatcher.close();
        self.drain().await;
        info!("daemon stopped");
        Ok(())
    }

    /// Wait for running units, at most one unit timeout.
    async fn drain(&self) {
        let limit = self.dispatcher.unit_timeout();
        if tokio::time::timeout(limit, self.dispatcher.wait_idle())
            .await
            .is_err()
        {
            warn!(
                in_flight = self.dispatcher.in_flight(),
                "units still running after drain timeout"
            );
        }
    }
}
