//! Postman Studio Relay
//!
//! Server-side forwarding proxy for the browser client: accepts a request
//! descriptor on `POST /proxy`, performs the call through one shared
//! keep-alive connection pool, and returns a normalized envelope.

pub mod config;
pub mod forward;
pub mod headers;
pub mod metrics;
pub mod server;
pub mod transport;

pub use config::RelayConfig;
pub use forward::Forwarder;
pub use server::{router, AppState};
pub use transport::{HttpTransport, Transport};

use std::future::Future;
use tokio::net::TcpListener;

/// Serve the relay on an already-bound listener until `shutdown` resolves
pub async fn run(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
