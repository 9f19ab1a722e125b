//! Command triggers: periodic housekeeping that runs an external program
//! under the same single-flight guarantees as the reconcilers.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::collab::command::run_command;
use crate::error::{Result, SiteopsError};
use crate::orchestrator::{RunContext, RunReport, Runnable};

/// Runs `argv` once per fire. `{trigger}` and `{run_id}` are substituted.
pub struct CommandRunnable {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandRunnable {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Result<Self> {
        if argv.is_empty() {
            return Err(SiteopsError::InvalidConfig(
                "command trigger needs a non-empty argv".into(),
            ));
        }
        Ok(Self { argv, timeout })
    }
}

#[async_trait]
impl Runnable for CommandRunnable {
    async fn run(&self, ctx: RunContext) -> Result<RunReport> {
        let run_id = ctx.run_id.to_string();
        let vars = [("trigger", ctx.trigger.as_str()), ("run_id", run_id.as_str())];
        let output = run_command(&self.argv, &vars, None, self.timeout).await?;
        if !output.success() {
            warn!(trigger = %ctx.trigger, code = ?output.code, "housekeeping command failed");
            return Err(SiteopsError::Command(format!(
                "{} exited with {:?}: {}",
                self.argv[0],
                output.code,
                output.hint()
            )));
        }
        debug!(trigger = %ctx.trigger, stdout = %output.stdout.trim(), "housekeeping command done");
        Ok(RunReport {
            candidates: 1,
            planned: 1,
            succeeded: 1,
            ..RunReport::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn ctx() -> RunContext {
        RunContext {
            trigger: "prune".into(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[test]
    fn empty_argv_rejected() {
        assert!(CommandRunnable::new(vec![], Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn success_reports_one_unit() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let script = format!("echo {{trigger}} > {}", marker.display());
        let r = CommandRunnable::new(sh(&script), Duration::from_secs(5)).unwrap();
        let report = r.run(ctx()).await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(std::fs::read_to_string(&marker).unwrap().trim(), "prune");
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let r = CommandRunnable::new(sh("echo disk full >&2; exit 3"), Duration::from_secs(5))
            .unwrap();
        let err = r.run(ctx()).await.unwrap_err();
        assert!(err.to_string().contains("disk full"), "{err}");
    }
}
