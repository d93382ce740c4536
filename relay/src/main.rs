use anyhow::{Context, Result};
use studio_relay::{AppState, RelayConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("studio_relay=info")),
        )
        .init();

    let config = RelayConfig::from_env().context("Failed to load relay configuration")?;
    let state = AppState::new(&config)?;

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        "Postman Studio relay on {} (timeout {} ms, pool {} idle/host)",
        addr, config.request_timeout_ms, config.pool_max_idle_per_host
    );

    studio_relay::run(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down...");
    })
    .await?;

    Ok(())
}
