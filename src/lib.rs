//! Eureka agent - client for a pull-based service registry
//!
//! Registers this process with a Eureka registry, keeps its lease alive,
//! mirrors the registry into a local cache and resolves logical application
//! names to live `host:port` endpoints.
//!
//! ## Architecture
//! ```text
//! lookups --> EurekaClient --> RegistryCache <-- RegistryRefresher --+
//!                  |                                                 |
//!                  +--> Registrar --> Heartbeat                      |
//!                           |                                        |
//!                           +------> RegistryTransport (REST) <------+
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod instance;
pub mod model;
pub mod registration;
pub mod registry;
pub mod shutdown;
pub mod state;
pub mod transport;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use client::{EurekaClient, ShutdownOutcome};
pub use config::{Config, ConfigError};
pub use error::ClientError;
pub use model::{Application, Instance, InstanceStatus, LeaseInfo, PortInfo};
pub use registration::RegistrationState;
pub use registry::Protocol;
pub use transport::{RegistryTransport, RestTransport, TransportError};
