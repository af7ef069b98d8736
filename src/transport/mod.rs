//! Registry transport abstraction.
//!
//! The client never talks to the registry server directly; every network
//! call goes through a [`RegistryTransport`]. [`RestTransport`] speaks the
//! Eureka REST API; tests use the in-memory mock in `test_utils`.

pub mod rest;

use async_trait::async_trait;

use crate::model::{Application, Instance, InstanceStatus};

pub use rest::RestTransport;

/// Errors raised by a registry transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request never produced a response (connect, timeout, TLS).
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The registry answered with a non-success status.
    #[error("Registry returned {status} for {method} {url}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
    },

    /// The response body could not be decoded.
    #[error("Failed to decode registry response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The registry does not know the requested application.
    #[error("Application not found in registry: {0}")]
    NotFound(String),

    /// The registry could not be reached for another reason.
    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// Whether retrying the same request, here or on another registry node,
    /// could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Http { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            TransportError::Unavailable(_) => true,
            TransportError::Decode(_) | TransportError::NotFound(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Network calls the client makes against the registry server.
///
/// `app` arguments are registry application ids (uppercase by convention).
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    /// Register an instance. The registry records it with its current status.
    async fn register(&self, app: &str, instance: &Instance) -> Result<()>;

    /// Remove an instance from the registry.
    async fn deregister(&self, app: &str, instance_id: &str) -> Result<()>;

    /// Renew an instance's lease.
    async fn heartbeat(&self, app: &str, instance_id: &str) -> Result<()>;

    /// Override an instance's status.
    async fn update_status(&self, app: &str, instance_id: &str, status: InstanceStatus)
        -> Result<()>;

    /// Fetch one application and all of its instances.
    async fn query_application(&self, app_id: &str) -> Result<Application>;

    /// Fetch every application the registry knows about.
    async fn query_all(&self) -> Result<Vec<Application>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Unavailable("down".to_string()).is_transient());
        assert!(TransportError::Status {
            method: "GET",
            url: "http://r/apps".to_string(),
            status: 503,
        }
        .is_transient());
        assert!(!TransportError::Status {
            method: "PUT",
            url: "http://r/apps/A/1".to_string(),
            status: 404,
        }
        .is_transient());
        assert!(!TransportError::NotFound("ORDERS".to_string()).is_transient());
    }
}
