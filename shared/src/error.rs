//! Proxy-level failures.
//!
//! A target answering 4xx/5xx is not an error here; it travels as an
//! envelope. Only the two kinds below fail a forward.

use thiserror::Error;

use crate::protocol::ProxyFailure;

pub type Result<T> = std::result::Result<T, ForwardError>;

/// Headline sent when the request went out but nothing came back.
pub const NO_RESPONSE_MESSAGE: &str = "No response received from target";

/// Headline sent when the descriptor never became a request.
pub const SETUP_MESSAGE: &str = "Error setting up request";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForwardError {
    /// Descriptor could not be turned into a dispatchable request.
    /// Raised before any network I/O.
    #[error("Error setting up request: {0}")]
    Setup(String),

    /// Request was dispatched but no response arrived
    /// (refused, reset, DNS failure, timeout).
    #[error("No response received from target: {0}")]
    NoResponse(String),
}

impl ForwardError {
    pub fn setup(detail: impl Into<String>) -> Self {
        Self::Setup(detail.into())
    }

    pub fn no_response(detail: impl Into<String>) -> Self {
        Self::NoResponse(detail.into())
    }

    /// Fixed headline for this kind
    pub fn message(&self) -> &'static str {
        match self {
            Self::Setup(_) => SETUP_MESSAGE,
            Self::NoResponse(_) => NO_RESPONSE_MESSAGE,
        }
    }

    /// Underlying transport or validation message
    pub fn detail(&self) -> &str {
        match self {
            Self::Setup(d) | Self::NoResponse(d) => d,
        }
    }

    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Setup(_) => "setup",
            Self::NoResponse(_) => "no_response",
        }
    }

    pub fn to_failure(&self) -> ProxyFailure {
        ProxyFailure {
            message: self.message().to_string(),
            error: self.detail().to_string(),
        }
    }
}

impl From<ProxyFailure> for ForwardError {
    fn from(failure: ProxyFailure) -> Self {
        failure.into_error()
    }
}
