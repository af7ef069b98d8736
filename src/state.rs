//! State shared between the client, its background tasks and lookups.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::instance::InstanceDescriptor;
use crate::registration::RegistrationState;
use crate::registry::RegistryCache;

/// Everything guarded by the client's single reader/writer lock.
///
/// Lookups take the read side; cache refreshes, status promotion and the
/// running flag take the write side.
#[derive(Debug, Default)]
pub struct ClientState {
    /// Last-known registry snapshot.
    pub cache: RegistryCache,
    /// This instance, or `None` when its configured identity is incomplete.
    pub instance: Option<InstanceDescriptor>,
    pub registration: RegistrationState,
    /// True between `run` and a successful de-registration.
    pub running: bool,
}

impl ClientState {
    pub fn new(instance: Option<InstanceDescriptor>) -> Self {
        Self {
            instance,
            ..Default::default()
        }
    }

    pub fn transition(&mut self, next: RegistrationState) {
        if self.registration != next {
            debug!(from = %self.registration, to = %next, "Registration state changed");
            self.registration = next;
        }
    }
}

/// Handle to the client state, cloned into every task.
pub type SharedState = Arc<RwLock<ClientState>>;

pub fn shared(state: ClientState) -> SharedState {
    Arc::new(RwLock::new(state))
}

/// Held across every registry write that moves this instance between
/// lifecycle states (register, promote, de-register), so those calls never
/// overlap. Always taken before the state lock.
pub type RegistrationGate = Arc<Mutex<()>>;

pub fn registration_gate() -> RegistrationGate {
    Arc::new(Mutex::new(()))
}
