//! Wire types for the `/proxy` endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{ForwardError, NO_RESPONSE_MESSAGE, SETUP_MESSAGE};

/// Path the relay serves the forwarding endpoint on
pub const PROXY_PATH: &str = "/proxy";

/// Caller's description of the request to forward
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequestDescriptor {
    /// HTTP verb, case-insensitive
    pub method: String,

    /// Absolute URL of the target
    pub url: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Forwarded as the request body. Strings go out verbatim,
    /// any other JSON value is serialized.
    #[serde(default, alias = "body", skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ProxyRequestDescriptor {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            data: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Normalized target response. Shape is identical for every status code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponseEnvelope {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub data: Value,
    pub is_error: bool,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ProxyResponseEnvelope {
    /// Target-reported failure: 4xx or 5xx
    pub fn is_error_status(status: u16) -> bool {
        (400..600).contains(&status)
    }
}

/// Body of a proxy-level failure (HTTP 500 from the relay)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyFailure {
    pub message: String,
    pub error: String,
}

impl ProxyFailure {
    /// Recover the failure kind from its headline.
    /// Unknown headlines count as no-response: the target was not reached.
    pub fn into_error(self) -> ForwardError {
        match self.message.as_str() {
            SETUP_MESSAGE => ForwardError::Setup(self.error),
            NO_RESPONSE_MESSAGE => ForwardError::NoResponse(self.error),
            _ => ForwardError::NoResponse(format!("{}: {}", self.message, self.error)),
        }
    }
}
