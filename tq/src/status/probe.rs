//! Per-item status probes

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::context::ViewContext;

/// One row of a watched list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchItem {
    /// Stable identity, used to de-duplicate submissions
    pub key: String,

    /// Absolute URL or path relative to the context's backend
    pub location: String,
}

impl WatchItem {
    pub fn new(key: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            location: location.into(),
        }
    }

    /// Parse a `key location` line; a lone location is its own key
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let mut parts = line.split_whitespace();
        let first = parts.next()?;
        match parts.next() {
            Some(location) => Some(Self::new(first, location)),
            None => Some(Self::new(first, first)),
        }
    }
}

/// Observed status of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStatus {
    pub code: u16,
    pub healthy: bool,
    pub latency_ms: u64,
}

/// Errors that can occur while probing an item
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid location: {0}")]
    InvalidLocation(String),
}

/// A probe result recorded by the status board
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub key: String,
    pub status: Option<ItemStatus>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl StatusReport {
    pub fn from_result(key: &str, result: &Result<ItemStatus, ProbeError>) -> Self {
        let (status, error) = match result {
            Ok(status) => (Some(status.clone()), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            key: key.to_string(),
            status,
            error,
            checked_at: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.healthy)
    }
}

/// Fetches the status of a single item
///
/// Each call is independent; the queue decides when it runs.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn probe(&self, context: &ViewContext, item: &WatchItem) -> Result<ItemStatus, ProbeError>;
}

/// Probe that issues an HTTP GET per item
pub struct HttpProbe {
    http: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, ProbeError> {
        debug!(?timeout, %user_agent, "HttpProbe::new: called");
        let http = Client::builder().timeout(timeout).user_agent(user_agent).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl StatusProbe for HttpProbe {
    async fn probe(&self, context: &ViewContext, item: &WatchItem) -> Result<ItemStatus, ProbeError> {
        let url = context.resolve(&item.location);
        debug!(key = %item.key, %url, "HttpProbe::probe: called");
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ProbeError::InvalidLocation(url));
        }

        let started = Instant::now();
        let mut request = self.http.get(&url);
        if let Some(workspace) = &context.workspace {
            request = request.header("X-Workspace", workspace.as_str());
        }
        let response = request.send().await?;
        let status = response.status();

        Ok(ItemStatus {
            code: status.as_u16(),
            healthy: status.is_success(),
            latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }
}
