//! Request/Response Header Rewriting
//!
//! Strips connection-scoped headers from the caller's descriptor before it
//! goes out, applies configured add/set/remove rules, and supplies the CORS
//! headers the browser UI needs on the relay's own responses.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

/// Headers that describe the caller→relay hop, not the relay→target hop.
/// The outbound client sets its own framing and host.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Header rewrite rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum HeaderRule {
    /// Add header (won't overwrite existing)
    Add { name: String, value: String },
    /// Set header (overwrites existing)
    Set { name: String, value: String },
    /// Remove header by name
    Remove { name: String },
}

impl HeaderRule {
    pub fn name(&self) -> &str {
        match self {
            Self::Add { name, .. } | Self::Set { name, .. } | Self::Remove { name } => name,
        }
    }

    /// Check the rule yields a legal header name and value
    pub fn validate(&self) -> Result<(), String> {
        HeaderName::from_bytes(self.name().as_bytes())
            .map_err(|e| format!("invalid header name '{}': {}", self.name(), e))?;
        match self {
            Self::Add { value, .. } | Self::Set { value, .. } => {
                HeaderValue::from_str(value)
                    .map_err(|e| format!("invalid value for header '{}': {}", self.name(), e))?;
            }
            Self::Remove { .. } => {}
        }
        Ok(())
    }
}

/// Header rewriter configuration
#[derive(Debug, Clone)]
pub struct HeaderRewriter {
    /// Drop hop-by-hop headers from outbound requests
    pub strip_hop_by_hop: bool,
    /// Inject CORS headers on relay responses
    pub inject_cors: bool,
    /// Custom rules applied in order
    pub rules: Vec<HeaderRule>,
}

impl Default for HeaderRewriter {
    fn default() -> Self {
        Self {
            strip_hop_by_hop: true,
            inject_cors: true,
            rules: Vec::new(),
        }
    }
}

impl HeaderRewriter {
    /// Rewrite request headers before forwarding to the target
    pub fn rewrite_request(&self, headers: &mut HeaderMap) {
        if self.strip_hop_by_hop {
            for name in HOP_BY_HOP {
                headers.remove(*name);
            }
        }

        for rule in &self.rules {
            // validated at config load
            match rule {
                HeaderRule::Add { name, value } => {
                    if let Some((k, v)) = parse_pair(name, value) {
                        if !headers.contains_key(&k) {
                            headers.insert(k, v);
                        }
                    }
                }
                HeaderRule::Set { name, value } => {
                    if let Some((k, v)) = parse_pair(name, value) {
                        headers.insert(k, v);
                    }
                }
                HeaderRule::Remove { name } => {
                    if let Ok(k) = HeaderName::from_bytes(name.as_bytes()) {
                        headers.remove(k);
                    }
                }
            }
        }
    }

    /// Add CORS headers to a relay response
    pub fn rewrite_response(&self, headers: &mut HeaderMap) {
        if !self.inject_cors {
            return;
        }
        let cors = [
            ("access-control-allow-origin", "*"),
            ("access-control-allow-methods", "GET, POST, PUT, DELETE, PATCH, OPTIONS"),
            ("access-control-allow-headers", "Content-Type, Authorization"),
            ("access-control-max-age", "86400"),
        ];
        for (k, v) in cors {
            headers.insert(HeaderName::from_static(k), HeaderValue::from_static(v));
        }
    }
}

fn parse_pair(name: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
    let k = HeaderName::from_bytes(name.as_bytes()).ok()?;
    let v = HeaderValue::from_str(value).ok()?;
    Some((k, v))
}
