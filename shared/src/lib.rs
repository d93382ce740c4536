//! Postman Studio Shared Library
//!
//! Wire types for the forwarding proxy and the failure taxonomy
//! shared by the relay and the command-line client.

pub mod protocol;
pub mod error;

pub use error::{ForwardError, Result};
pub use protocol::{ProxyFailure, ProxyRequestDescriptor, ProxyResponseEnvelope};
