//! Outbound HTTP transport
//!
//! One pooled `reqwest::Client` is built at startup and shared by every
//! forward. Its keep-alive pool reuses idle connections per host so repeat
//! calls to a target skip the TCP/TLS handshake. Compressed bodies
//! (gzip, brotli, deflate) are decoded before they reach the envelope.

use async_trait::async_trait;
use bytes::Bytes;
use hyper::ext::ReasonPhrase;
use reqwest::header::HeaderMap;
use reqwest::{redirect, Client, Method, StatusCode, Url};
use studio_shared::ForwardError;
use tracing::debug;

use crate::config::RelayConfig;

/// Fully validated request, ready to go on the wire
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Whatever the target sent back, body fully read
#[derive(Debug, Clone)]
pub struct TargetResponse {
    pub status: StatusCode,
    /// Reason phrase as sent, when it differs from the canonical one
    pub reason: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Sends a prepared request to its target.
///
/// Implementations report only transport-level failures; any HTTP status
/// the target answers with is a successful `TargetResponse`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<TargetResponse, ForwardError>;
}

/// Transport backed by a shared reqwest connection pool
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &RelayConfig) -> Result<Self, reqwest::Error> {
        let policy = if config.follow_redirects {
            redirect::Policy::limited(config.max_redirects)
        } else {
            redirect::Policy::none()
        };

        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .pool_idle_timeout(config.pool_idle_timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .tcp_keepalive(config.tcp_keepalive())
            .redirect(policy)
            .user_agent(config.user_agent.as_str())
            .no_proxy()
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TargetResponse, ForwardError> {
        let OutboundRequest { method, url, headers, body } = request;

        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        let reason = response
            .extensions()
            .get::<ReasonPhrase>()
            .map(|r| String::from_utf8_lossy(r.as_bytes()).into_owned());
        let headers = response.headers().clone();
        debug!("Target answered {} from {}", status, response.url());

        // A body cut off mid-read means no complete response was received.
        let body = response.bytes().await.map_err(classify)?;

        Ok(TargetResponse { status, reason, headers, body })
    }
}

/// Builder errors never touched the network; everything else did.
fn classify(err: reqwest::Error) -> ForwardError {
    let detail = describe(&err);
    if err.is_builder() {
        ForwardError::Setup(detail)
    } else {
        ForwardError::NoResponse(detail)
    }
}

/// reqwest's top-level message is generic ("error sending request");
/// the useful part is in the source chain.
fn describe(err: &reqwest::Error) -> String {
    let mut detail = if err.is_timeout() {
        format!("timeout: {}", err)
    } else {
        err.to_string()
    };
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_from_default_config() {
        assert!(HttpTransport::new(&RelayConfig::default()).is_ok());
    }

    #[test]
    fn test_builds_without_redirects() {
        let config = RelayConfig { follow_redirects: false, ..Default::default() };
        assert!(HttpTransport::new(&config).is_ok());
    }

    #[tokio::test]
    async fn test_refused_connection_is_no_response() {
        let transport = HttpTransport::new(&RelayConfig::default()).unwrap();
        let request = OutboundRequest {
            method: Method::GET,
            url: Url::parse("http://127.0.0.1:1/").unwrap(),
            headers: HeaderMap::new(),
            body: None,
        };
        let err = transport.send(request).await.unwrap_err();
        assert!(matches!(err, ForwardError::NoResponse(_)), "got {:?}", err);
    }
}
