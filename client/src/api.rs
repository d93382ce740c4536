//! Relay API client
//!
//! Sends descriptors to the relay's `/proxy` endpoint and unwraps the
//! answer into the three-way outcome: envelope, or a classified failure.

use anyhow::{Context, Result};
use reqwest::StatusCode;
use std::time::Duration;
use studio_shared::{ForwardError, ProxyFailure, ProxyRequestDescriptor, ProxyResponseEnvelope};
use tracing::debug;

/// Envelope when the target answered, `ForwardError` when the relay could not
/// get an answer. The outer `anyhow::Result` covers failing to talk to the
/// relay itself.
pub type Outcome = std::result::Result<ProxyResponseEnvelope, ForwardError>;

pub struct ProxyClient {
    http: reqwest::Client,
    endpoint: reqwest::Url,
}

impl ProxyClient {
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = reqwest::Url::parse(endpoint)
            .with_context(|| format!("Invalid proxy endpoint: {}", endpoint))?;

        // No overall timeout: the relay bounds each forward with its own.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    pub async fn forward(&self, descriptor: &ProxyRequestDescriptor) -> Result<Outcome> {
        debug!("Forwarding {} {} via {}", descriptor.method, descriptor.url, self.endpoint);

        let resp = self
            .http
            .post(self.endpoint.clone())
            .json(descriptor)
            .send()
            .await
            .with_context(|| format!("Failed to reach relay at {}", self.endpoint))?;

        let status = resp.status();
        let body = resp.bytes().await.context("Failed to read relay response")?;

        match status {
            StatusCode::OK => {
                let envelope: ProxyResponseEnvelope = serde_json::from_slice(&body)
                    .context("Relay returned a malformed envelope")?;
                Ok(Ok(envelope))
            }
            StatusCode::INTERNAL_SERVER_ERROR => {
                let failure: ProxyFailure = serde_json::from_slice(&body).with_context(|| {
                    format!("Relay failed: {}", String::from_utf8_lossy(&body))
                })?;
                Ok(Err(failure.into_error()))
            }
            other => anyhow::bail!(
                "Unexpected relay status {}: {}",
                other,
                String::from_utf8_lossy(&body)
            ),
        }
    }
}
