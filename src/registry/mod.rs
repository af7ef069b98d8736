//! Local view of the registry.
//!
//! - [`RegistryCache`]: snapshot of applications plus the routing tables
//!   derived from it
//! - [`SelectionCounter`]: picks one candidate out of a routing table
//! - [`RegistryRefresher`]: repopulates the cache from the transport

mod cache;
mod refresh;
mod selection;

pub use cache::{
    cache_key, DerivedTables, EndpointMap, InstanceMap, ProtocolEndpoints, RegistryCache,
};
pub use refresh::{spawn_refresh_loop, RegistryRefresher};
pub use selection::SelectionCounter;

/// Which port of an instance a caller wants to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Non-TLS port, used for `http` URLs.
    Plain,
    /// TLS port, used for `https` URLs.
    Secure,
}

impl Protocol {
    /// Protocol for a URL scheme, if the scheme is routable.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        if scheme.eq_ignore_ascii_case("http") {
            Some(Protocol::Plain)
        } else if scheme.eq_ignore_ascii_case("https") {
            Some(Protocol::Secure)
        } else {
            None
        }
    }
}
