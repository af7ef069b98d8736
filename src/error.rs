//! Errors surfaced by the client's public API.

use crate::config::ConfigError;
use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The application is unknown, or has no routable instances, even after
    /// refreshing it from the registry.
    #[error("No instances available for application {0}")]
    NotFound(String),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: &'static str },

    /// The client has no registrable identity for this process.
    #[error("Instance identity is not configured")]
    NoInstance,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
