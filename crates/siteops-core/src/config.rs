use crate::collab::command::resolve_program;
use crate::collab::dns::DEFAULT_DOH_ENDPOINT;
use crate::error::{Result, SiteopsError};
use crate::orchestrator::{DispatcherConfig, SchedulerConfig};
use crate::reconcile::{DomainPolicy, HealthPolicy, PublisherPolicy};
use crate::types::ReconcilerKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "siteops.yaml";

/// Upper bound for the domain policy durations: ten years.
const MAX_POLICY_DAYS: u32 = 3650;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// SchedulerSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// A `running` ledger entry older than this many intervals is reclaimed.
    #[serde(default = "default_stale_multiplier")]
    pub stale_multiplier: u32,
    /// How long a sweep waits for its units before reporting done.
    #[serde(default = "default_sweep_max_wait")]
    pub sweep_max_wait_secs: u64,
}

fn default_tick_ms() -> u64 {
    1000
}

fn default_stale_multiplier() -> u32 {
    3
}

fn default_sweep_max_wait() -> u64 {
    600
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            stale_multiplier: default_stale_multiplier(),
            sweep_max_wait_secs: default_sweep_max_wait(),
        }
    }
}

// ---------------------------------------------------------------------------
// PoolSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    #[serde(default = "default_pool_size")]
    pub size: usize,
    #[serde(default = "default_unit_timeout")]
    pub unit_timeout_secs: u64,
}

fn default_pool_size() -> usize {
    8
}

fn default_unit_timeout() -> u64 {
    120
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            unit_timeout_secs: default_unit_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub name: String,
    pub interval_secs: u64,
    pub action: TriggerAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerAction {
    /// Sweep one of the built-in reconcilers (`domain_status`, `post_publisher`,
    /// `autopost`, `server_health`).
    Reconcile { reconciler: String },
    /// Run an external housekeeping command.
    Command {
        argv: Vec<String>,
        #[serde(default = "default_command_timeout")]
        timeout_secs: u64,
    },
}

fn default_command_timeout() -> u64 {
    300
}

impl TriggerAction {
    pub fn reconcile(kind: ReconcilerKind) -> Self {
        TriggerAction::Reconcile {
            reconciler: kind.as_str().to_string(),
        }
    }

    pub fn reconciler_kind(&self) -> Option<Result<ReconcilerKind>> {
        match self {
            TriggerAction::Reconcile { reconciler } => Some(reconciler.parse()),
            TriggerAction::Command { .. } => None,
        }
    }
}

impl TriggerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_triggers() -> Vec<TriggerConfig> {
    let reconcile = |name: &str, interval_secs: u64, kind: ReconcilerKind| TriggerConfig {
        name: name.to_string(),
        interval_secs,
        action: TriggerAction::reconcile(kind),
    };
    vec![
        reconcile("domain-status", 300, ReconcilerKind::DomainStatus),
        reconcile("post-publisher", 60, ReconcilerKind::PostPublisher),
        reconcile("autopost", 900, ReconcilerKind::Autopost),
        reconcile("server-health", 60, ReconcilerKind::ServerHealth),
    ]
}

// ---------------------------------------------------------------------------
// DomainSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainSettings {
    #[serde(default = "default_renewal_window")]
    pub renewal_window_days: u32,
    #[serde(default = "default_ns_grace")]
    pub ns_propagation_grace_hours: u32,
    #[serde(default = "default_max_auto_rechecks")]
    pub max_auto_rechecks: u32,
    #[serde(default = "default_failed_recheck_after")]
    pub failed_recheck_after_hours: u32,
    /// Nameservers a domain must delegate to. Empty accepts any delegation.
    #[serde(default)]
    pub expected_nameservers: Vec<String>,
    #[serde(default = "default_doh_endpoint")]
    pub doh_endpoint: String,
    /// Issuance command; `{hostname}` is substituted.
    #[serde(default)]
    pub certificate_command: Vec<String>,
    #[serde(default = "default_collaborator_timeout")]
    pub certificate_timeout_secs: u64,
}

fn default_renewal_window() -> u32 {
    30
}

fn default_ns_grace() -> u32 {
    72
}

fn default_max_auto_rechecks() -> u32 {
    3
}

fn default_failed_recheck_after() -> u32 {
    6
}

fn default_doh_endpoint() -> String {
    DEFAULT_DOH_ENDPOINT.to_string()
}

fn default_collaborator_timeout() -> u64 {
    100
}

impl Default for DomainSettings {
    fn default() -> Self {
        Self {
            renewal_window_days: default_renewal_window(),
            ns_propagation_grace_hours: default_ns_grace(),
            max_auto_rechecks: default_max_auto_rechecks(),
            failed_recheck_after_hours: default_failed_recheck_after(),
            expected_nameservers: Vec::new(),
            doh_endpoint: default_doh_endpoint(),
            certificate_command: Vec::new(),
            certificate_timeout_secs: default_collaborator_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// PublishSettings / AutopostSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishSettings {
    #[serde(default = "default_max_posts")]
    pub max_posts_per_sweep: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_max_posts() -> usize {
    100
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            max_posts_per_sweep: default_max_posts(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutopostSettings {
    /// Content generator; receives the site as JSON on stdin.
    #[serde(default)]
    pub composer_command: Vec<String>,
    #[serde(default = "default_collaborator_timeout")]
    pub composer_timeout_secs: u64,
}

impl Default for AutopostSettings {
    fn default() -> Self {
        Self {
            composer_command: Vec::new(),
            composer_timeout_secs: default_collaborator_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// HealthSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    #[serde(default = "default_health_path")]
    pub path: String,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    /// Successful probes slower than this are `degraded`.
    #[serde(default = "default_degraded_after")]
    pub degraded_after_ms: u64,
    #[serde(default = "default_unreachable_alert")]
    pub unreachable_alert_after: u32,
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_probe_timeout() -> u64 {
    5000
}

fn default_degraded_after() -> u64 {
    1500
}

fn default_unreachable_alert() -> u32 {
    3
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            path: default_health_path(),
            probe_timeout_ms: default_probe_timeout(),
            degraded_after_ms: default_degraded_after(),
            unreachable_alert_after: default_unreachable_alert(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database file, relative to the config file's directory.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default = "default_triggers")]
    pub triggers: Vec<TriggerConfig>,
    #[serde(default)]
    pub domains: DomainSettings,
    #[serde(default)]
    pub publishing: PublishSettings,
    #[serde(default)]
    pub autopost: AutopostSettings,
    #[serde(default)]
    pub health: HealthSettings,
}

fn default_database() -> PathBuf {
    PathBuf::from("siteops.redb")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            scheduler: SchedulerSettings::default(),
            pool: PoolSettings::default(),
            triggers: default_triggers(),
            domains: DomainSettings::default(),
            publishing: PublishSettings::default(),
            autopost: AutopostSettings::default(),
            health: HealthSettings::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SiteopsError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(SiteopsError::ConfigNotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// Write the default config unless a file already exists. Returns true if written.
    pub fn init(path: &Path) -> Result<bool> {
        let data = serde_yaml::to_string(&Self::default())?;
        crate::io::write_if_missing(path, data.as_bytes())
    }

    /// Database path resolved against the directory holding `config_path`.
    pub fn database_path(&self, config_path: &Path) -> PathBuf {
        if self.database.is_absolute() {
            return self.database.clone();
        }
        match config_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(&self.database),
            _ => self.database.clone(),
        }
    }

    pub fn trigger(&self, name: &str) -> Option<&TriggerConfig> {
        self.triggers.iter().find(|t| t.name == name)
    }

    fn uses_reconciler(&self, kind: ReconcilerKind) -> bool {
        self.triggers
            .iter()
            .any(|t| matches!(t.action.reconciler_kind(), Some(Ok(k)) if k == kind))
    }

    // -----------------------------------------------------------------------
    // Derived runtime settings
    // -----------------------------------------------------------------------

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick: Duration::from_millis(self.scheduler.tick_ms.max(1)),
            stale_multiplier: self.scheduler.stale_multiplier.max(1),
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            pool_size: self.pool.size.max(1),
            unit_timeout: Duration::from_secs(self.pool.unit_timeout_secs),
        }
    }

    pub fn sweep_max_wait(&self) -> Duration {
        Duration::from_secs(self.scheduler.sweep_max_wait_secs)
    }

    pub fn domain_policy(&self) -> DomainPolicy {
        let d = &self.domains;
        DomainPolicy {
            renewal_window: chrono::Duration::days(d.renewal_window_days.into()),
            ns_propagation_grace: chrono::Duration::hours(d.ns_propagation_grace_hours.into()),
            max_auto_rechecks: d.max_auto_rechecks,
            failed_recheck_after: chrono::Duration::hours(d.failed_recheck_after_hours.into()),
        }
    }

    pub fn publisher_policy(&self) -> PublisherPolicy {
        PublisherPolicy {
            max_posts_per_sweep: self.publishing.max_posts_per_sweep.max(1),
        }
    }

    pub fn health_policy(&self) -> HealthPolicy {
        HealthPolicy {
            probe_timeout: Duration::from_millis(self.health.probe_timeout_ms),
            unreachable_alert_after: self.health.unreachable_alert_after,
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        // 1. Trigger table: unique names, non-zero intervals, resolvable actions
        let mut seen = HashSet::new();
        for t in &self.triggers {
            if !seen.insert(t.name.as_str()) {
                error(format!("duplicate trigger name '{}'", t.name));
            }
            if t.interval_secs == 0 {
                error(format!("trigger '{}' has interval_secs = 0", t.name));
            }
            match &t.action {
                TriggerAction::Reconcile { reconciler } => {
                    if reconciler.parse::<ReconcilerKind>().is_err() {
                        error(format!(
                            "trigger '{}' names unknown reconciler '{}'",
                            t.name, reconciler
                        ));
                    }
                }
                TriggerAction::Command { argv, .. } => {
                    if argv.is_empty() || argv[0].trim().is_empty() {
                        error(format!("trigger '{}' has an empty command", t.name));
                    }
                }
            }
        }

        // 2. Pool / scheduler bounds
        if self.pool.size == 0 {
            error("pool.size must be at least 1".to_string());
        }
        if self.pool.unit_timeout_secs == 0 {
            error("pool.unit_timeout_secs must be at least 1".to_string());
        }
        if self.scheduler.tick_ms == 0 {
            error("scheduler.tick_ms must be at least 1".to_string());
        }

        // 3. Domain timing stays inside a horizon the sweep can add to a timestamp
        for (key, value, max) in [
            ("domains.renewal_window_days", self.domains.renewal_window_days, MAX_POLICY_DAYS),
            (
                "domains.ns_propagation_grace_hours",
                self.domains.ns_propagation_grace_hours,
                MAX_POLICY_DAYS * 24,
            ),
            (
                "domains.failed_recheck_after_hours",
                self.domains.failed_recheck_after_hours,
                MAX_POLICY_DAYS * 24,
            ),
        ] {
            if value > max {
                error(format!("{key}={value} exceeds the maximum of {max}"));
            }
        }

        let mut warn = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message,
            })
        };

        if self.triggers.is_empty() {
            warn("no triggers configured; the daemon will idle".to_string());
        }
        if self.scheduler.stale_multiplier < 2 {
            warn(format!(
                "scheduler.stale_multiplier={} may reclaim runs that are still alive",
                self.scheduler.stale_multiplier
            ));
        }

        // 4. Command binaries resolvable on PATH
        for t in &self.triggers {
            if let TriggerAction::Command { argv, .. } = &t.action {
                if let Some(program) = argv.first().filter(|p| !p.trim().is_empty()) {
                    if resolve_program(argv).is_err() {
                        warn(format!(
                            "trigger '{}': command '{}' not found on PATH",
                            t.name, program
                        ));
                    }
                }
            }
        }
        for (key, argv) in [
            ("domains.certificate_command", &self.domains.certificate_command),
            ("autopost.composer_command", &self.autopost.composer_command),
        ] {
            if let Some(program) = argv.first() {
                if resolve_program(argv).is_err() {
                    warn(format!("{key}: command '{program}' not found on PATH"));
                }
            }
        }

        // 5. Collaborators the configured reconcilers depend on
        let unit_timeout_ms = self.pool.unit_timeout_secs.saturating_mul(1000);
        if self.uses_reconciler(ReconcilerKind::DomainStatus) {
            if self.domains.certificate_command.is_empty() {
                warn(
                    "domains.certificate_command is empty; certificate issuance will fail"
                        .to_string(),
                );
            }
            if self.domains.certificate_timeout_secs >= self.pool.unit_timeout_secs {
                warn("domains.certificate_timeout_secs should be below pool.unit_timeout_secs".to_string());
            }
        }
        if self.uses_reconciler(ReconcilerKind::Autopost) {
            if self.autopost.composer_command.is_empty() {
                warn("autopost.composer_command is empty; autoposts will fail".to_string());
            }
            if self.autopost.composer_timeout_secs >= self.pool.unit_timeout_secs {
                warn("autopost.composer_timeout_secs should be below pool.unit_timeout_secs".to_string());
            }
        }
        if self.uses_reconciler(ReconcilerKind::ServerHealth)
            && self.health.probe_timeout_ms >= unit_timeout_ms
        {
            warn(format!(
                "health.probe_timeout_ms={} is not below the unit timeout; timed-out probes will be reported as failures",
                self.health.probe_timeout_ms
            ));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn errors(cfg: &Config) -> Vec<String> {
        cfg.validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect()
    }

    #[test]
    fn defaults_have_four_reconcile_triggers() {
        let cfg = Config::default();
        let names: Vec<_> = cfg.triggers.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            ["domain-status", "post-publisher", "autopost", "server-health"]
        );
        assert!(errors(&cfg).is_empty());
    }

    #[test]
    fn empty_yaml_yields_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.pool.size, 8);
        assert_eq!(cfg.scheduler.stale_multiplier, 3);
        assert_eq!(cfg.domains.renewal_window_days, 30);
        assert_eq!(cfg.triggers.len(), 4);
    }

    #[test]
    fn parses_trigger_table() {
        let yaml = r#"
triggers:
  - name: publish
    interval_secs: 30
    action:
      type: reconcile
      reconciler: post_publisher
  - name: prune-logs
    interval_secs: 86400
    action:
      type: command
      argv: ["find", "/var/log/siteops", "-mtime", "+14", "-delete"]
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.triggers.len(), 2);
        assert_eq!(
            cfg.triggers[0].action.reconciler_kind().unwrap().unwrap(),
            ReconcilerKind::PostPublisher
        );
        match &cfg.triggers[1].action {
            TriggerAction::Command { argv, timeout_secs } => {
                assert_eq!(argv[0], "find");
                assert_eq!(*timeout_secs, 300);
            }
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn validate_flags_bad_triggers() {
        let mut cfg = Config::default();
        cfg.triggers = vec![
            TriggerConfig {
                name: "a".into(),
                interval_secs: 0,
                action: TriggerAction::Reconcile {
                    reconciler: "cleanup".into(),
                },
            },
            TriggerConfig {
                name: "a".into(),
                interval_secs: 10,
                action: TriggerAction::Command {
                    argv: vec![],
                    timeout_secs: 10,
                },
            },
        ];
        let errs = errors(&cfg);
        assert!(errs.iter().any(|m| m.contains("duplicate trigger name 'a'")));
        assert!(errs.iter().any(|m| m.contains("interval_secs = 0")));
        assert!(errs.iter().any(|m| m.contains("unknown reconciler 'cleanup'")));
        assert!(errs.iter().any(|m| m.contains("empty command")));
    }

    #[test]
    fn validate_flags_zero_pool() {
        let mut cfg = Config::default();
        cfg.pool.size = 0;
        assert!(errors(&cfg).iter().any(|m| m.contains("pool.size")));
    }

    #[test]
    fn validate_flags_out_of_range_domain_timing() {
        let mut cfg = Config::default();
        cfg.domains.renewal_window_days = 200_000_000;
        cfg.domains.failed_recheck_after_hours = u32::MAX;
        let errs = errors(&cfg);
        assert!(errs.iter().any(|m| m.contains("domains.renewal_window_days")));
        assert!(errs.iter().any(|m| m.contains("domains.failed_recheck_after_hours")));
        assert!(!errs.iter().any(|m| m.contains("ns_propagation_grace_hours")));
    }

    #[test]
    fn validate_warns_on_missing_collaborator_binary() {
        let mut cfg = Config::default();
        cfg.domains.certificate_command = vec!["definitely-not-a-real-acme-4821".into()];
        assert!(cfg.validate().iter().any(|w| w.level == WarnLevel::Warning
            && w.message.contains("domains.certificate_command: command")));
    }

    #[test]
    fn validate_warns_about_missing_collaborators() {
        let cfg = Config::default();
        let warnings: Vec<_> = cfg
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Warning)
            .map(|w| w.message)
            .collect();
        assert!(warnings.iter().any(|m| m.contains("certificate_command")));
        assert!(warnings.iter().any(|m| m.contains("composer_command")));
    }

    #[test]
    fn validate_warns_on_missing_binary() {
        let mut cfg = Config::default();
        cfg.triggers.push(TriggerConfig {
            name: "prune".into(),
            interval_secs: 60,
            action: TriggerAction::Command {
                argv: vec!["definitely-not-a-real-binary-4821".into()],
                timeout_secs: 10,
            },
        });
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("not found on PATH")));
    }

    #[test]
    fn load_missing_is_config_not_found() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(&dir.path().join(CONFIG_FILE)).unwrap_err();
        assert!(matches!(err, SiteopsError::ConfigNotFound(_)));
        assert!(Config::load_or_default(&dir.path().join(CONFIG_FILE)).is_ok());
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut cfg = Config::default();
        cfg.pool.size = 3;
        cfg.domains.expected_nameservers = vec!["ns1.example.net".into()];
        cfg.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.pool.size, 3);
        assert_eq!(loaded.domains.expected_nameservers, ["ns1.example.net"]);
        assert_eq!(loaded.triggers, cfg.triggers);
    }

    #[test]
    fn init_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        assert!(Config::init(&path).unwrap());
        std::fs::write(&path, "pool:\n  size: 2\n").unwrap();
        assert!(!Config::init(&path).unwrap());
        assert_eq!(Config::load(&path).unwrap().pool.size, 2);
    }

    #[test]
    fn database_path_is_relative_to_config() {
        let cfg = Config::default();
        assert_eq!(
            cfg.database_path(Path::new("/etc/siteops/siteops.yaml")),
            PathBuf::from("/etc/siteops/siteops.redb")
        );
        assert_eq!(
            cfg.database_path(Path::new("siteops.yaml")),
            PathBuf::from("siteops.redb")
        );
    }

    #[test]
    fn derived_policies_use_settings() {
        let mut cfg = Config::default();
        cfg.domains.renewal_window_days = 14;
        cfg.health.probe_timeout_ms = 250;
        assert_eq!(cfg.domain_policy().renewal_window, chrono::Duration::days(14));
        assert_eq!(cfg.health_policy().probe_timeout, Duration::from_millis(250));
        assert_eq!(cfg.dispatcher_config().pool_size, 8);
    }
}
