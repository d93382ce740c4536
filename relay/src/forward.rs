//! Request forwarding
//!
//! Turns a caller's descriptor into an outbound request, dispatches it
//! through the shared transport, and normalizes whatever comes back into
//! an envelope. Three outcomes are kept apart:
//!
//! - the target answered (any status): `Ok(envelope)`, `isError` set for 4xx/5xx
//! - nothing came back: `Err(ForwardError::NoResponse)`
//! - the descriptor was unusable: `Err(ForwardError::Setup)`, raised before any I/O

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use studio_shared::{ForwardError, ProxyRequestDescriptor, ProxyResponseEnvelope, Result};
use tracing::{info, warn};

use crate::headers::HeaderRewriter;
use crate::metrics::Metrics;
use crate::transport::{OutboundRequest, TargetResponse, Transport};

/// Verbs the relay will forward
const SUPPORTED_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "DELETE", "PATCH", "OPTIONS", "TRACE",
];

pub struct Forwarder {
    transport: Arc<dyn Transport>,
    rewriter: HeaderRewriter,
    metrics: Metrics,
}

impl Forwarder {
    pub fn new(transport: Arc<dyn Transport>, rewriter: HeaderRewriter, metrics: Metrics) -> Self {
        Self { transport, rewriter, metrics }
    }

    /// Forward a descriptor received as raw JSON
    pub async fn forward_raw(&self, raw: &[u8]) -> Result<ProxyResponseEnvelope> {
        match parse_descriptor(raw) {
            Ok(descriptor) => self.forward(&descriptor).await,
            Err(err) => {
                warn!("Rejected descriptor: {}", err);
                self.metrics.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Execute the described request against its target
    pub async fn forward(&self, descriptor: &ProxyRequestDescriptor) -> Result<ProxyResponseEnvelope> {
        let request = match self.prepare(descriptor) {
            Ok(r) => r,
            Err(err) => {
                warn!("Setup failed for {} {}: {}", descriptor.method, descriptor.url, err.detail());
                self.metrics.record_failure(&err);
                return Err(err);
            }
        };

        let method = request.method.clone();
        let url = request.url.clone();
        let started = Instant::now();

        match self.transport.send(request).await {
            Ok(response) => {
                let elapsed = started.elapsed();
                let size = response.body.len() as u64;
                let env = envelope(response, elapsed);
                info!("{} {} -> {} ({} ms)", method, url, env.status, env.duration_ms);
                self.metrics
                    .record_envelope(env.status, elapsed.as_micros() as u64, size)
                    .await;
                Ok(env)
            }
            Err(err) => {
                warn!("{} {} failed [{}]: {}", method, url, err.kind(), err.detail());
                self.metrics.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Validate and build the outbound request. Performs no I/O.
    pub fn prepare(&self, descriptor: &ProxyRequestDescriptor) -> Result<OutboundRequest> {
        let method = parse_method(&descriptor.method)?;
        let url = parse_url(&descriptor.url)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &descriptor.headers {
            let k = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ForwardError::setup(format!("invalid header name '{}': {}", name, e)))?;
            let v = HeaderValue::from_str(value)
                .map_err(|e| ForwardError::setup(format!("invalid value for header '{}': {}", name, e)))?;
            headers.insert(k, v);
        }
        self.rewriter.rewrite_request(&mut headers);

        let body = match &descriptor.data {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(Bytes::from(s.clone())),
            Some(other) => {
                let encoded = serde_json::to_vec(other)
                    .map_err(|e| ForwardError::setup(format!("failed to serialize body: {}", e)))?;
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                Some(Bytes::from(encoded))
            }
        };

        Ok(OutboundRequest { method, url, headers, body })
    }
}

/// Parse a descriptor from raw JSON. Missing `method`/`url` is a setup failure.
pub fn parse_descriptor(raw: &[u8]) -> Result<ProxyRequestDescriptor> {
    serde_json::from_slice(raw)
        .map_err(|e| ForwardError::setup(format!("malformed descriptor: {}", e)))
}

fn parse_method(raw: &str) -> Result<Method> {
    let upper = raw.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Err(ForwardError::setup("missing method"));
    }
    if !SUPPORTED_METHODS.contains(&upper.as_str()) {
        return Err(ForwardError::setup(format!("unsupported method '{}'", raw)));
    }
    Method::from_bytes(upper.as_bytes())
        .map_err(|e| ForwardError::setup(format!("invalid method '{}': {}", raw, e)))
}

fn parse_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ForwardError::setup("missing url"));
    }
    let url = Url::parse(raw)
        .map_err(|e| ForwardError::setup(format!("invalid url '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ForwardError::setup(format!("unsupported url scheme '{}'", other))),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ForwardError::setup(format!("url '{}' has no host", raw)));
    }
    Ok(url)
}

/// Normalize a target response. Every status code yields the same shape.
pub fn envelope(response: TargetResponse, elapsed: Duration) -> ProxyResponseEnvelope {
    let status = response.status.as_u16();
    let status_text = match response.reason {
        Some(reason) => reason,
        None => response.status.canonical_reason().unwrap_or("").to_string(),
    };
    ProxyResponseEnvelope {
        status,
        status_text,
        data: decode_body(&response.headers, &response.body),
        headers: flatten_headers(&response.headers),
        is_error: ProxyResponseEnvelope::is_error_status(status),
        duration_ms: elapsed.as_millis() as u64,
    }
}

/// Lowercase names; repeated headers joined with ", "
fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            (name.as_str().to_string(), joined)
        })
        .collect()
}

/// JSON bodies parse to values, everything else stays text
fn decode_body(headers: &HeaderMap, body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::String(String::new());
    }
    if is_json(headers) {
        if let Ok(v) = serde_json::from_slice(body) {
            return v;
        }
    }
    Value::String(String::from_utf8_lossy(body).into_owned())
}

fn is_json(headers: &HeaderMap) -> bool {
    let Some(ct) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let essence = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}
