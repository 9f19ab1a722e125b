use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{PublishReceipt, Publisher};
use crate::entity::{Post, Site};
use crate::error::{Result, SiteopsError};
use crate::types::{PostId, SiteId};

#[derive(Serialize)]
struct PublishBody<'a> {
    id: PostId,
    site_id: SiteId,
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Deserialize, Default)]
struct PublishResponse {
    #[serde(default)]
    url: Option<String>,
}

/// Publishes posts by upserting them on the site's publish target.
///
/// Issues `PUT {target}/posts/{post_id}` with an `Idempotency-Key` derived
/// from the post id, so a repeat publish overwrites instead of duplicating.
pub struct WebhookPublisher {
    client: reqwest::Client,
}

impl WebhookPublisher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn idempotency_key(post: &Post) -> String {
        format!("siteops-post-{}", post.id)
    }
}

#[async_trait]
impl Publisher for WebhookPublisher {
    async fn publish(&self, post: &Post, site: &Site) -> Result<PublishReceipt> {
        let target = site.publish_target.as_ref().ok_or_else(|| {
            SiteopsError::Collaborator(format!("site '{}' has no publish target", site.name))
        })?;
        let url = format!("{}/posts/{}", target.url.trim_end_matches('/'), post.id);

        let mut request = self
            .client
            .put(&url)
            .header("Idempotency-Key", Self::idempotency_key(post))
            .json(&PublishBody {
                id: post.id,
                site_id: post.site_id,
                title: &post.title,
                body: &post.body,
                scheduled_at: post.scheduled_at,
            });
        if let Some(token) = &target.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SiteopsError::Collaborator(format!(
                "publish target returned {status}: {}",
                text.chars().take(300).collect::<String>()
            )));
        }
        let created = status == reqwest::StatusCode::CREATED;
        let text = response.text().await?;
        let parsed: PublishResponse = serde_json::from_str(&text).unwrap_or_default();
        debug!(post = post.id, %status, "published");
        Ok(PublishReceipt {
            external_url: parsed.url,
            created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{NewPost, PublishTarget};
    use chrono::Utc;
    use mockito::Matcher;

    fn fixtures(url: String) -> (Post, Site) {
        let post = NewPost::scheduled(3, "Hello", "First post", Utc::now()).into_post(11);
        let mut site = Site::new(3, "blog", None);
        site.publish_target = Some(PublishTarget {
            url,
            token: Some("s3cret".into()),
        });
        (post, site)
    }

    #[tokio::test]
    async fn puts_post_with_idempotency_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/posts/11")
            .match_header("idempotency-key", "siteops-post-11")
            .match_header("authorization", "Bearer s3cret")
            .match_body(Matcher::PartialJsonString(
                r#"{"id":11,"site_id":3,"title":"Hello"}"#.into(),
            ))
            .with_status(201)
            .with_body(r#"{"url":"https://blog.example.com/hello"}"#)
            .create_async()
            .await;

        let (post, site) = fixtures(format!("{}/", server.url()));
        let receipt = WebhookPublisher::new(reqwest::Client::new())
            .publish(&post, &site)
            .await
            .unwrap();
        mock.assert_async().await;
        assert!(receipt.created);
        assert_eq!(
            receipt.external_url.as_deref(),
            Some("https://blog.example.com/hello")
        );
    }

    #[tokio::test]
    async fn republish_hits_same_resource() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/posts/11")
            .match_header("idempotency-key", "siteops-post-11")
            .with_status(200)
            .expect(2)
            .create_async()
            .await;

        let (post, site) = fixtures(server.url());
        let publisher = WebhookPublisher::new(reqwest::Client::new());
        publisher.publish(&post, &site).await.unwrap();
        let second = publisher.publish(&post, &site).await.unwrap();
        mock.assert_async().await;
        assert!(!second.created);
        assert!(second.external_url.is_none());
    }

    #[tokio::test]
    async fn error_status_is_err() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/posts/11")
            .with_status(500)
            .with_body("upstream down")
            .create_async()
            .await;
        let (post, site) = fixtures(server.url());
        let err = WebhookPublisher::new(reqwest::Client::new())
            .publish(&post, &site)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("upstream down"));
    }

    #[tokio::test]
    async fn missing_target_is_err() {
        let (post, mut site) = fixtures(String::new());
        site.publish_target = None;
        assert!(WebhookPublisher::new(reqwest::Client::new())
            .publish(&post, &site)
            .await
            .is_err());
    }
}
