//! HTTP client for the answer service: health probe, query, resource metrics.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

use crate::config::ServerSection;
use crate::messages::{Answer, HistoryTurn, QueryRequest, ServerMetrics};

/// Client error. Every variant is a recoverable runtime condition.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned status {0}")]
    Status(StatusCode),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Transport(e) if e.is_timeout())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Malformed(e.to_string())
    }
}

/// Handle to one answer service. Cheap to clone; clones share the
/// connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    health_path: String,
    probe_timeout: Duration,
}

fn user_agent() -> String {
    format!("hale-client/{}", env!("CARGO_PKG_VERSION"))
}

impl Client {
    /// Build a client for `base_url` (e.g. `http://localhost:8000`).
    /// `request_timeout` bounds `/query`; `probe_timeout` bounds `/health`.
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        probe_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent())
            .timeout(request_timeout)
            .build()?;
        Ok(Client {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            health_path: "/health".into(),
            probe_timeout,
        })
    }

    pub fn from_config(server: &ServerSection) -> Result<Self, ClientError> {
        let mut client = Self::new(
            server.base_url(),
            server.request_timeout(),
            server.probe_timeout(),
        )?;
        client.health_path = server.health_path().to_string();
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Reachability probe. Any success status is `Ok`; the body is ignored.
    pub async fn health(&self) -> Result<(), ClientError> {
        let resp = self
            .http
            .get(self.url(&self.health_path))
            .timeout(self.probe_timeout)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }
        Ok(())
    }

    /// Send one question with its history. Makes exactly one attempt.
    pub async fn query(
        &self,
        question: &str,
        history: &[HistoryTurn],
    ) -> Result<Answer, ClientError> {
        let body = QueryRequest::new(question, history);
        debug!(turns = history.len(), "sending query");
        let resp = self.http.post(self.url("/query")).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }
        let bytes = resp.bytes().await?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        Answer::from_json(&value).map_err(ClientError::Malformed)
    }

    /// Resource usage reported by the service's `/metrics` endpoint.
    pub async fn server_metrics(&self) -> Result<ServerMetrics, ClientError> {
        let resp = self
            .http
            .get(self.url("/metrics"))
            .timeout(self.probe_timeout)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
