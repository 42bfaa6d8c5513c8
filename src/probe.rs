//! HTTP reachability probes for tunneled hosts
//!
//! A host counts as reachable when it answers a HEAD request with 200 or
//! 403. A 403 still proves the packets made it through the tunnel; the
//! server just refused us.

use reqwest::{Client, StatusCode};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to build HTTP client: {0}")]
    ClientError(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Forbidden,
    UnexpectedStatus(StatusCode),
    Unreachable(String),
}

impl Reachability {
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::OK => Reachability::Reachable,
            StatusCode::FORBIDDEN => Reachability::Forbidden,
            other => Reachability::UnexpectedStatus(other),
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, Reachability::Reachable | Reachability::Forbidden)
    }
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reachability::Reachable => write!(f, "reachable (200 OK)"),
            Reachability::Forbidden => write!(f, "reachable (403 Forbidden)"),
            Reachability::UnexpectedStatus(status) => write!(f, "unexpected status {}", status),
            Reachability::Unreachable(reason) => write!(f, "unreachable: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub host: String,
    pub url: String,
    pub reachability: Reachability,
}

/// URL probed for a host; bare names get `https://`
pub fn probe_url(host: &str) -> String {
    if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}/", host)
    }
}

pub struct Prober {
    client: Client,
}

impl Prober {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        // A proxy would answer for the host and hide a broken tunnel
        let client = Client::builder().timeout(timeout).no_proxy().build()?;
        Ok(Self { client })
    }

    pub async fn probe(&self, host: &str) -> ProbeResult {
        let url = probe_url(host);
        debug!("HEAD {}", url);

        let reachability = match self.client.head(&url).send().await {
            Ok(response) => Reachability::from_status(response.status()),
            Err(e) => Reachability::Unreachable(describe_error(&e)),
        };

        info!("{}: {}", host, reachability);
        ProbeResult {
            host: host.to_string(),
            url,
            reachability,
        }
    }

    pub async fn probe_all(&self, hosts: &[String]) -> Vec<ProbeResult> {
        let mut results = Vec::with_capacity(hosts.len());
        for host in hosts {
            results.push(self.probe(host).await);
        }
        results
    }
}

fn describe_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "timed out".to_string()
    } else if e.is_connect() {
        "connection failed".to_string()
    } else {
        e.to_string()
    }
}
