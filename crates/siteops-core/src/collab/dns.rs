//! Nameserver delegation check over DNS-over-HTTPS (JSON wire format).

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{NameserverChecker, NsCheck};
use crate::error::{Result, SiteopsError};

pub const DEFAULT_DOH_ENDPOINT: &str = "https://cloudflare-dns.com/dns-query";

/// NS record type.
const TYPE_NS: u16 = 2;
/// RCODE 3.
const NXDOMAIN: u32 = 3;

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohRecord>,
}

#[derive(Debug, Deserialize)]
struct DohRecord {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

fn normalize(ns: &str) -> String {
    ns.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Checks that a hostname is delegated to the expected nameservers.
///
/// With no expected nameservers configured, any NS answer counts as active.
pub struct DohNameserverChecker {
    client: reqwest::Client,
    endpoint: String,
    expected: BTreeSet<String>,
}

impl DohNameserverChecker {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, expected: &[String]) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            expected: expected.iter().map(|ns| normalize(ns)).collect(),
        }
    }

    fn classify(&self, response: DohResponse) -> NsCheck {
        if response.status == NXDOMAIN {
            return NsCheck::Failed;
        }
        let found: BTreeSet<String> = response
            .answer
            .iter()
            .filter(|r| r.record_type == TYPE_NS)
            .map(|r| normalize(&r.data))
            .collect();
        if found.is_empty() {
            return NsCheck::Pending;
        }
        if self.expected.is_subset(&found) {
            NsCheck::Active
        } else {
            NsCheck::Pending
        }
    }
}

#[async_trait]
impl NameserverChecker for DohNameserverChecker {
    async fn check(&self, hostname: &str) -> Result<NsCheck> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("name", hostname), ("type", "NS")])
            .header(reqwest::header::ACCEPT, "application/dns-json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SiteopsError::Collaborator(format!(
                "DoH resolver returned {}",
                response.status()
            )));
        }
        let body: DohResponse = response.json().await?;
        let check = self.classify(body);
        debug!(hostname, ?check, "nameserver check");
        Ok(check)
    }
}
