use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::command::run_command;
use super::{CertOutcome, CertificateIssuer};
use crate::error::{Result, SiteopsError};

/// Issues or renews certificates by running an external command.
///
/// The command receives the hostname through the `{hostname}` placeholder and
/// prints a JSON [`CertOutcome`] on stdout, e.g.
/// `{"status":"active","expires_at":"2026-01-01T00:00:00Z"}`. A non-zero exit
/// without parseable output is treated as a failed issuance.
pub struct CommandCertificateIssuer {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandCertificateIssuer {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }
}

#[async_trait]
impl CertificateIssuer for CommandCertificateIssuer {
    async fn issue_or_renew(&self, hostname: &str) -> Result<CertOutcome> {
        if self.argv.is_empty() {
            return Err(SiteopsError::Collaborator(
                "no certificate command configured".into(),
            ));
        }
        let output = run_command(&self.argv, &[("hostname", hostname)], None, self.timeout).await?;
        debug!(hostname, code = ?output.code, "certificate command finished");

        match serde_json::from_str::<CertOutcome>(output.stdout.trim()) {
            Ok(outcome) => Ok(outcome),
            Err(_) if !output.success() => Ok(CertOutcome::Failed {
                reason: format!("exit {:?}: {}", output.code, output.hint()),
            }),
            Err(e) => Err(SiteopsError::Collaborator(format!(
                "certificate command printed invalid JSON: {e}"
            ))),
        }
    }
}
