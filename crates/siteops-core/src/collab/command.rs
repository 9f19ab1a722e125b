//! External command invocation shared by the command-backed adapters.
//!
//! Commands speak a JSON stdin/stdout protocol: an optional JSON document is
//! written to stdin, and the command prints its result to stdout. Arguments
//! may reference `{name}` placeholders that are substituted before spawning.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{Result, SiteopsError};

#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// First few hundred characters of stderr (or stdout when stderr is empty).
    pub fn hint(&self) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        source.trim().chars().take(500).collect()
    }
}

/// Replace `{key}` in each argument with the matching value.
pub fn expand_args(argv: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    argv.iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (key, value)| {
                acc.replace(&format!("{{{key}}}"), value)
            })
        })
        .collect()
}

/// Check that the program named by `argv[0]` can be found.
pub fn resolve_program(argv: &[String]) -> Result<()> {
    let program = argv
        .first()
        .ok_or_else(|| SiteopsError::Command("empty command".into()))?;
    which::which(program)
        .map(|_| ())
        .map_err(|e| SiteopsError::Command(format!("'{program}' not found: {e}")))
}

/// Run `argv` to completion, feeding `stdin` if given.
///
/// A non-zero exit is not an error here; callers decide what it means. The
/// child is killed if `timeout` elapses.
pub async fn run_command(
    argv: &[String],
    vars: &[(&str, &str)],
    stdin: Option<&str>,
    timeout: Duration,
) -> Result<CommandOutput> {
    let argv = expand_args(argv, vars);
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| SiteopsError::Command("empty command".into()))?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| SiteopsError::Command(format!("failed to spawn '{program}': {e}")))?;

    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|e| SiteopsError::Command(format!("failed to write stdin: {e}")))?;
            // Dropping the pipe closes stdin so the child sees EOF.
        }
    }

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| {
            SiteopsError::Command(format!("'{program}' timed out after {timeout:?}"))
        })??;

    Ok(CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[test]
    fn expand_args_substitutes_placeholders() {
        let argv = vec!["certbot".to_string(), "-d".into(), "{hostname}".into()];
        let out = expand_args(&argv, &[("hostname", "example.com")]);
        assert_eq!(out, ["certbot", "-d", "example.com"]);
    }

    #[test]
    fn expand_args_leaves_unknown_placeholders() {
        let argv = vec!["{other}".to_string()];
        assert_eq!(expand_args(&argv, &[("hostname", "x")]), ["{other}"]);
    }

    #[test]
    fn resolve_program_rejects_missing() {
        assert!(resolve_program(&["sh".into()]).is_ok());
        assert!(resolve_program(&["definitely-not-a-real-binary-4821".into()]).is_err());
        assert!(resolve_program(&[]).is_err());
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let out = run_command(&sh("echo hello; exit 3"), &[], None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.code, Some(3));
        assert!(!out.success());
    }

    #[tokio::test]
    async fn feeds_stdin() {
        let out = run_command(&["cat".into()], &[], Some("{\"a\":1}"), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "{\"a\":1}");
    }

    #[tokio::test]
    async fn timeout_is_an_error() {
        let err = run_command(&sh("sleep 5"), &[], None, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn spawn_failure_is_an_error() {
        let err = run_command(
            &["definitely-not-a-real-binary-4821".into()],
            &[],
            None,
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SiteopsError::Command(_)));
    }

    #[test]
    fn hint_prefers_stderr() {
        let out = CommandOutput {
            code: Some(1),
            stdout: "out".into(),
            stderr: "  boom  ".into(),
        };
        assert_eq!(out.hint(), "boom");
    }
}
