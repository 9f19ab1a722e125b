use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use super::{ProbeReport, Prober};
use crate::types::HealthStatus;

/// HTTP health probe: `GET {base_url}{path}`.
///
/// A 2xx answered within `degraded_after` is healthy; a slower 2xx or any
/// other status is degraded; transport errors and timeouts are unreachable.
pub struct HttpProber {
    client: reqwest::Client,
    path: String,
    degraded_after: Duration,
}

impl HttpProber {
    pub fn new(client: reqwest::Client, path: impl Into<String>, degraded_after: Duration) -> Self {
        Self {
            client,
            path: path.into(),
            degraded_after,
        }
    }

    fn url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        if self.path.is_empty() {
            base.to_string()
        } else if self.path.starts_with('/') {
            format!("{base}{}", self.path)
        } else {
            format!("{base}/{}", self.path)
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, base_url: &str, timeout: Duration) -> ProbeReport {
        let url = self.url(base_url);
        let started = Instant::now();
        let result = tokio::time::timeout(timeout, self.client.get(&url).send()).await;
        let latency = started.elapsed();
        let latency_ms = Some(latency.as_millis().min(u64::MAX as u128) as u64);

        let status = match result {
            Ok(Ok(response)) if response.status().is_success() => {
                if latency > self.degraded_after {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                }
            }
            Ok(Ok(response)) => {
                debug!(%url, status = %response.status(), "probe got non-success status");
                HealthStatus::Degraded
            }
            Ok(Err(e)) => {
                debug!(%url, error = %e, "probe failed");
                return ProbeReport::unreachable();
            }
            Err(_) => {
                debug!(%url, ?timeout, "probe timed out");
                return ProbeReport::unreachable();
            }
        };
        ProbeReport { status, latency_ms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn success_is_healthy() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;
        let prober = HttpProber::new(reqwest::Client::new(), "/health", FAST);
        let report = prober.probe(&server.url(), Duration::from_secs(5)).await;
        mock.assert_async().await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.latency_ms.is_some());
    }

    #[tokio::test]
    async fn server_error_is_degraded() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(503)
            .create_async()
            .await;
        let prober = HttpProber::new(reqwest::Client::new(), "health", FAST);
        let report = prober.probe(&format!("{}/", server.url()), Duration::from_secs(5)).await;
        assert_eq!(report.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn slow_success_is_degraded() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;
        // Any real round trip exceeds a zero threshold.
        let prober = HttpProber::new(reqwest::Client::new(), "/health", Duration::ZERO);
        let report = prober.probe(&server.url(), Duration::from_secs(5)).await;
        assert_eq!(report.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn connection_refused_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let prober = HttpProber::new(reqwest::Client::new(), "/health", FAST);
        let report = prober.probe(&format!("http://{addr}"), Duration::from_secs(5)).await;
        assert_eq!(report, ProbeReport::unreachable());
    }

    #[tokio::test]
    async fn hanging_server_times_out_as_unreachable() {
        // Accepts connections but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _accept = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        let prober = HttpProber::new(reqwest::Client::new(), "/health", FAST);
        let report = prober
            .probe(&format!("http://{addr}"), Duration::from_millis(200))
            .await;
        assert_eq!(report.status, HealthStatus::Unreachable);
    }
}
