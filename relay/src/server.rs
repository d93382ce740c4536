//! HTTP surface of the relay
//!
//! `POST /proxy` answers 200 with an envelope whenever the target was
//! reached, whatever its status, and 500 with a `{message, error}` body
//! when the forward itself failed.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use studio_shared::protocol::PROXY_PATH;
use studio_shared::ForwardError;
use tracing::warn;

use crate::config::RelayConfig;
use crate::forward::Forwarder;
use crate::headers::HeaderRewriter;
use crate::metrics::Metrics;
use crate::transport::{HttpTransport, Transport};

/// Shared per-process state: one forwarder, one connection pool
#[derive(Clone)]
pub struct AppState {
    forwarder: Arc<Forwarder>,
    rewriter: Arc<HeaderRewriter>,
    metrics: Metrics,
    max_body_bytes: usize,
}

impl AppState {
    /// Build state with the pooled HTTP transport
    pub fn new(config: &RelayConfig) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(config)
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: &RelayConfig, transport: Arc<dyn Transport>) -> Self {
        let rewriter = HeaderRewriter {
            strip_hop_by_hop: true,
            inject_cors: config.cors,
            rules: config.header_rules.clone(),
        };
        let metrics = Metrics::new();
        let forwarder = Forwarder::new(transport, rewriter.clone(), metrics.clone());

        Self {
            forwarder: Arc::new(forwarder),
            rewriter: Arc::new(rewriter),
            metrics,
            max_body_bytes: config.max_body_bytes,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(PROXY_PATH, post(proxy_handler).options(preflight_handler))
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn_with_state(state.clone(), cors_middleware))
        .with_state(state)
}

async fn proxy_handler(State(state): State<AppState>, req: Request<Body>) -> Response {
    let outcome = match axum::body::to_bytes(req.into_body(), state.max_body_bytes).await {
        Ok(raw) => state.forwarder.forward_raw(&raw).await,
        Err(e) => {
            let err = ForwardError::setup(format!("failed to read descriptor: {}", e));
            warn!("{}", err);
            state.metrics.record_failure(&err);
            Err(err)
        }
    };

    match outcome {
        Ok(envelope) => (StatusCode::OK, Json(envelope)).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(err.to_failure())).into_response(),
    }
}

async fn preflight_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus().await,
    )
}

async fn cors_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    state.rewriter.rewrite_response(res.headers_mut());
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::{Method, Request as HttpRequest};
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use reqwest::header::HeaderMap;
    use studio_shared::{ProxyFailure, ProxyResponseEnvelope};
    use tower::ServiceExt;

    use crate::transport::{OutboundRequest, TargetResponse};

    /// Answers every request with the status encoded in the URL path
    struct EchoStatus;

    #[async_trait]
    impl Transport for EchoStatus {
        async fn send(&self, request: OutboundRequest) -> Result<TargetResponse, ForwardError> {
            if request.url.host_str() == Some("unreachable.invalid") {
                return Err(ForwardError::no_response("dns error: no such host"));
            }
            let code: u16 = request.url.path().trim_start_matches('/').parse().unwrap_or(200);
            Ok(TargetResponse {
                status: reqwest::StatusCode::from_u16(code).unwrap(),
                reason: None,
                headers: HeaderMap::new(),
                body: Bytes::from_static(b"body"),
            })
        }
    }

    fn app() -> Router {
        router(AppState::with_transport(&RelayConfig::default(), Arc::new(EchoStatus)))
    }

    fn proxy_request(body: &str) -> Request<Body> {
        HttpRequest::builder()
            .method(Method::POST)
            .uri(PROXY_PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_target_500_is_proxy_200() {
        let resp = app()
            .oneshot(proxy_request(r#"{"method":"GET","url":"http://target.test/500"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let env: ProxyResponseEnvelope = body_json(resp).await;
        assert_eq!(env.status, 500);
        assert!(env.is_error);
        assert_eq!(env.data, serde_json::json!("body"));
    }

    #[tokio::test]
    async fn test_no_response_is_proxy_500() {
        let resp = app()
            .oneshot(proxy_request(r#"{"method":"GET","url":"http://unreachable.invalid/"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let failure: ProxyFailure = body_json(resp).await;
        assert_eq!(failure.message, "No response received from target");
        assert!(failure.error.contains("no such host"));
    }

    #[tokio::test]
    async fn test_setup_is_proxy_500() {
        let resp = app()
            .oneshot(proxy_request(r#"{"method":"POST","url":"not-a-url"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let failure: ProxyFailure = body_json(resp).await;
        assert_eq!(failure.message, "Error setting up request");
    }

    #[tokio::test]
    async fn test_malformed_json_is_setup_not_422() {
        let resp = app().oneshot(proxy_request("{not json")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let failure: ProxyFailure = body_json(resp).await;
        assert_eq!(failure.message, "Error setting up request");
    }

    #[tokio::test]
    async fn test_oversized_descriptor_is_setup() {
        let config = RelayConfig { max_body_bytes: 16, ..Default::default() };
        let app = router(AppState::with_transport(&config, Arc::new(EchoStatus)));
        let resp = app
            .oneshot(proxy_request(r#"{"method":"GET","url":"http://target.test/200"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let failure: ProxyFailure = body_json(resp).await;
        assert_eq!(failure.message, "Error setting up request");
    }

    #[tokio::test]
    async fn test_preflight_and_cors() {
        let resp = app()
            .oneshot(
                HttpRequest::builder()
                    .method(Method::OPTIONS)
                    .uri(PROXY_PATH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn test_cors_disabled() {
        let config = RelayConfig { cors: false, ..Default::default() };
        let app = router(AppState::with_transport(&config, Arc::new(EchoStatus)));
        let resp = app
            .oneshot(HttpRequest::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn test_metrics_reflect_outcomes() {
        let state = AppState::with_transport(&RelayConfig::default(), Arc::new(EchoStatus));
        let app = router(state.clone());
        app.clone()
            .oneshot(proxy_request(r#"{"method":"GET","url":"http://target.test/404"}"#))
            .await
            .unwrap();
        app.clone().oneshot(proxy_request("[]")).await.unwrap();

        assert_eq!(state.metrics().envelopes(), 1);
        assert_eq!(state.metrics().failures(), (1, 0));

        let resp = app
            .oneshot(HttpRequest::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let text = String::from_utf8(resp.into_body().collect().await.unwrap().to_bytes().to_vec()).unwrap();
        assert!(text.contains(r#"studio_relay_target_status{status="4xx"} 1"#));
    }
}
