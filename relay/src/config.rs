//! Relay configuration
//!
//! Loaded from `studio-relay.yml` (or the file named by
//! `STUDIO_RELAY_CONFIG`), then overridden from the environment.
//! Connection-level settings are fixed here for the process lifetime;
//! nothing is configurable per forwarded request.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::headers::HeaderRule;

/// Env var naming an explicit config file
pub const CONFIG_ENV: &str = "STUDIO_RELAY_CONFIG";

/// Upper bound on redirect hops when following is enabled
const MAX_REDIRECT_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Interface to listen on
    pub bind: IpAddr,

    pub port: u16,

    /// TCP/TLS connect budget per outbound call
    pub connect_timeout_ms: u64,

    /// Whole-exchange budget per outbound call (connect to last body byte)
    pub request_timeout_ms: u64,

    /// How long an idle pooled connection is kept
    pub pool_idle_timeout_secs: u64,

    pub pool_max_idle_per_host: usize,

    /// 0 disables TCP keepalive probes
    pub tcp_keepalive_secs: u64,

    pub follow_redirects: bool,

    pub max_redirects: usize,

    /// Largest descriptor accepted on `/proxy`
    pub max_body_bytes: usize,

    /// Add CORS headers to relay responses
    pub cors: bool,

    /// Sent when the descriptor carries no user-agent
    pub user_agent: String,

    /// Extra rewrite rules applied to every outbound request
    pub header_rules: Vec<HeaderRule>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([0, 0, 0, 0]),
            port: 8080,
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            pool_idle_timeout_secs: 90,
            pool_max_idle_per_host: 16,
            tcp_keepalive_secs: 60,
            follow_redirects: true,
            max_redirects: 5,
            max_body_bytes: 10 * 1024 * 1024,
            cors: true,
            user_agent: concat!("postman-studio-relay/", env!("CARGO_PKG_VERSION")).to_string(),
            header_rules: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: RelayConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// File (if any) → environment overrides → validation
    pub fn from_env() -> Result<Self> {
        let mut config = match Self::find_config() {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };

        if let Ok(port) = std::env::var("PORT") {
            config.port = port.parse().with_context(|| format!("Invalid PORT: {}", port))?;
        }
        if let Ok(bind) = std::env::var("STUDIO_BIND") {
            config.bind = bind.parse().with_context(|| format!("Invalid STUDIO_BIND: {}", bind))?;
        }
        if let Ok(ms) = std::env::var("STUDIO_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = ms
                .parse()
                .with_context(|| format!("Invalid STUDIO_REQUEST_TIMEOUT_MS: {}", ms))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Invalid port 0");
        }
        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 {
            anyhow::bail!("Timeouts must be greater than zero");
        }
        if self.follow_redirects && self.max_redirects > MAX_REDIRECT_LIMIT {
            anyhow::bail!(
                "max_redirects {} exceeds limit of {}",
                self.max_redirects,
                MAX_REDIRECT_LIMIT
            );
        }
        if self.max_body_bytes == 0 {
            anyhow::bail!("max_body_bytes must be greater than zero");
        }
        for rule in &self.header_rules {
            rule.validate().map_err(anyhow::Error::msg)?;
        }
        Ok(())
    }

    /// Search for config file: explicit env var first, then the working directory
    pub fn find_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }

        ["studio-relay.yml", "studio-relay.yaml"]
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }

    pub fn tcp_keepalive(&self) -> Option<Duration> {
        (self.tcp_keepalive_secs > 0).then(|| Duration::from_secs(self.tcp_keepalive_secs))
    }
}
