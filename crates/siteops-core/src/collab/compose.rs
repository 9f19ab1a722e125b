use std::time::Duration;

use async_trait::async_trait;

use super::command::run_command;
use super::{ComposedPost, Composer};
use crate::entity::Site;
use crate::error::{Result, SiteopsError};

/// Produces autopost content by running an external generator.
///
/// The site is written to stdin as JSON; the command prints
/// `{"title": "...", "body": "..."}` on stdout.
pub struct CommandComposer {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandComposer {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }
}

#[async_trait]
impl Composer for CommandComposer {
    async fn compose(&self, site: &Site) -> Result<ComposedPost> {
        if self.argv.is_empty() {
            return Err(SiteopsError::Collaborator("no composer command configured".into()));
        }
        let input = serde_json::to_string(site)?;
        let id = site.id.to_string();
        let vars = [("site_id", id.as_str()), ("site_name", site.name.as_str())];
        let output = run_command(&self.argv, &vars, Some(&input), self.timeout).await?;
        if !output.success() {
            return Err(SiteopsError::Command(format!(
                "composer exited with {:?}: {}",
                output.code,
                output.hint()
            )));
        }
        let post: ComposedPost = serde_json::from_str(output.stdout.trim())?;
        if post.title.trim().is_empty() {
            return Err(SiteopsError::Collaborator("composer returned an empty title".into()));
        }
        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composer(script: &str) -> CommandComposer {
        CommandComposer::new(
            vec!["sh".into(), "-c".into(), script.into()],
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn reads_title_and_body() {
        let site = Site::new(7, "garden-notes", None);
        let c = composer(r#"echo '{"title":"Spring bulbs","body":"Plant them now."}'"#);
        let post = c.compose(&site).await.unwrap();
        assert_eq!(post.title, "Spring bulbs");
        assert_eq!(post.body, "Plant them now.");
    }

    #[tokio::test]
    async fn site_json_arrives_on_stdin() {
        let site = Site::new(7, "garden-notes", None);
        // Echo the site name back as the title.
        let c = composer(
            r#"name=$(sed -n 's/.*"name":"\([^"]*\)".*/\1/p'); printf '{"title":"%s"}' "$name""#,
        );
        let post = c.compose(&site).await.unwrap();
        assert_eq!(post.title, "garden-notes");
        assert_eq!(post.body, "");
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let site = Site::new(7, "garden-notes", None);
        let err = composer("echo 'model offline' >&2; exit 2")
            .compose(&site)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model offline"));
    }

    #[tokio::test]
    async fn empty_title_is_rejected() {
        let site = Site::new(7, "garden-notes", None);
        assert!(composer(r#"echo '{"title":"  "}'"#).compose(&site).await.is_err());
    }
}
