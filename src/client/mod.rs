//! The agent facade.
//!
//! [`EurekaClient`] owns the shared state, starts the background tasks
//! (registry refresh, registration, signal handling) and answers lookups
//! from the local cache.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::instance::InstanceDescriptor;
use crate::model::{Application, Instance};
use crate::registration::{RegistrationState, Registrar};
use crate::registry::{
    spawn_refresh_loop, EndpointMap, InstanceMap, Protocol, RegistryRefresher, SelectionCounter,
};
use crate::shutdown::{ShutdownCoordinator, ShutdownTrigger};
use crate::state::{registration_gate, shared, ClientState, RegistrationGate, SharedState};
use crate::transport::RegistryTransport;

/// What a call to [`EurekaClient::shutdown`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Not running, or de-registration disabled.
    Skipped,
    /// The instance was removed from the registry.
    Deregistered,
}

/// Background tasks of one `run`, and the trigger that stops them.
struct Background {
    trigger: ShutdownTrigger,
    handles: Vec<JoinHandle<()>>,
}

struct ClientInner {
    config: Config,
    transport: Arc<dyn RegistryTransport>,
    state: SharedState,
    gate: RegistrationGate,
    selector: SelectionCounter,
    refresher: Arc<RegistryRefresher>,
    background: Mutex<Background>,
    instance_id: Option<String>,
}

/// Registry client handle. Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct EurekaClient {
    inner: Arc<ClientInner>,
}

impl EurekaClient {
    /// Create a client. Nothing touches the network until [`run`](Self::run).
    ///
    /// An incomplete instance identity is logged here; the client still
    /// serves lookups but will not register.
    pub fn new(config: Config, transport: Arc<dyn RegistryTransport>) -> Self {
        let descriptor = match InstanceDescriptor::from_config(&config.instance) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                error!(error = %e, "Invalid instance configuration");
                None
            }
        };
        let instance_id = descriptor.as_ref().map(|d| d.instance_id().to_string());

        let state = shared(ClientState::new(descriptor));
        let refresher = Arc::new(RegistryRefresher::new(
            transport.clone(),
            state.clone(),
            config.client.filter_only_up_instances,
        ));

        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                state,
                gate: registration_gate(),
                selector: SelectionCounter::new(),
                refresher,
                background: Mutex::new(Background {
                    trigger: ShutdownTrigger::new(),
                    handles: Vec::new(),
                }),
                instance_id,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Configured instance id of this process, if its identity is complete.
    pub fn instance_id(&self) -> Option<&str> {
        self.inner.instance_id.as_deref()
    }

    /// Start the background tasks. Calling `run` on a running client is a
    /// no-op.
    pub async fn run(&self) {
        {
            let mut state = self.inner.state.write().await;
            if state.running {
                debug!("Client already running");
                return;
            }
            state.running = true;
        }

        let config = &self.inner.config.client;
        let mut background = self.inner.background.lock().await;
        if background.trigger.is_triggered() {
            background.trigger = ShutdownTrigger::new();
        }
        background.handles.retain(|h| !h.is_finished());

        if config.fetch_registry {
            let handle = spawn_refresh_loop(
                self.inner.refresher.clone(),
                config.registry_fetch_interval(),
                background.trigger.signal(),
            );
            background.handles.push(handle);
        }

        if config.register_with_eureka {
            let registrar = Registrar::new(
                self.inner.transport.clone(),
                self.inner.state.clone(),
                self.inner.gate.clone(),
                Arc::from(config.retry.policy()),
                config.port_check_timeout(),
            );
            let handle = tokio::spawn(registrar.run(background.trigger.signal()));
            background.handles.push(handle);
        } else {
            warn!("Registration disabled, instance will not be registered");
        }

        if config.handle_signals {
            let handle = ShutdownCoordinator::spawn(self.clone(), background.trigger.signal());
            background.handles.push(handle);
        }

        info!(
            instance_id = self.instance_id().unwrap_or("<none>"),
            fetch_registry = config.fetch_registry,
            register = config.register_with_eureka,
            "Registry client started"
        );
    }

    /// De-register this instance and stop the background tasks.
    ///
    /// A no-op unless the client is running and de-registration on shutdown
    /// is enabled. Waits for an in-flight registration or status update to
    /// finish first; concurrent calls run one after the other. On failure the
    /// instance stays registered, the client keeps running and the error is
    /// returned. Background tasks are signalled but not awaited; use
    /// [`halt`](Self::halt) to wait for them.
    pub async fn shutdown(&self) -> Result<ShutdownOutcome> {
        let _gate = self.inner.gate.lock().await;
        let (app, instance_id, previous) = {
            let mut state = self.inner.state.write().await;
            if !state.running || !self.inner.config.client.should_unregister_on_shutdown {
                debug!(running = state.running, "Shutdown skipped");
                return Ok(ShutdownOutcome::Skipped);
            }
            let Some(descriptor) = state.instance.as_ref() else {
                error!("Cannot de-register: instance identity is not configured");
                return Err(ClientError::NoInstance);
            };
            let target = (
                descriptor.app().to_string(),
                descriptor.instance_id().to_string(),
                state.registration,
            );
            state.transition(RegistrationState::Deregistering);
            target
        };

        info!(app = %app, instance_id = %instance_id, "De-registering instance");
        if let Err(e) = self.inner.transport.deregister(&app, &instance_id).await {
            self.inner.state.write().await.transition(previous);
            error!(
                app = %app,
                instance_id = %instance_id,
                error = %e,
                "De-registration failed, instance remains registered"
            );
            return Err(e.into());
        }

        {
            let mut state = self.inner.state.write().await;
            state.running = false;
            state.transition(RegistrationState::Deregistered);
        }
        self.inner.background.lock().await.trigger.trigger();

        info!(app = %app, instance_id = %instance_id, "Instance de-registered");
        Ok(ShutdownOutcome::Deregistered)
    }

    /// Stop every background task and wait for them to finish.
    ///
    /// Does not de-register; the running flag is left as is.
    pub async fn halt(&self) {
        let handles = {
            let mut background = self.inner.background.lock().await;
            background.trigger.trigger();
            std::mem::take(&mut background.handles)
        };

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        debug!("Background tasks stopped");
    }

    /// Routable instances of an application, keyed by ordinal.
    ///
    /// If the application is not cached it is fetched from the registry once
    /// before giving up with [`ClientError::NotFound`]. A cached application
    /// without routable instances is `NotFound` straight away.
    pub async fn instances_for(&self, app_id: &str) -> Result<InstanceMap> {
        let instances = self
            .cached_or_fetch(app_id, |state| state.cache.instances_for(app_id).cloned())
            .await?;
        if instances.is_empty() {
            return Err(ClientError::NotFound(app_id.to_string()));
        }
        Ok(instances)
    }

    /// `host:port` endpoints of an application for one protocol, keyed by
    /// ordinal. Misses are handled as in [`instances_for`](Self::instances_for).
    pub async fn endpoints_for(&self, app_id: &str, protocol: Protocol) -> Result<EndpointMap> {
        let endpoints = self
            .cached_or_fetch(app_id, |state| {
                state
                    .cache
                    .endpoints_for(app_id)
                    .map(|endpoints| endpoints.get(&protocol).cloned().unwrap_or_default())
            })
            .await?;
        if endpoints.is_empty() {
            return Err(ClientError::NotFound(app_id.to_string()));
        }
        Ok(endpoints)
    }

    /// Select one routable instance of an application.
    pub async fn get_next_instance(&self, app_id: &str) -> Result<Instance> {
        let instances = self.instances_for(app_id).await?;
        self.inner
            .selector
            .pick(instances.into_values())
            .ok_or_else(|| ClientError::NotFound(app_id.to_string()))
    }

    /// Replace the host of `template` with a selected instance endpoint.
    ///
    /// The host segment names an application; any port on it is ignored.
    /// `http` selects plain endpoints and `https` secure ones:
    /// `http://ORDERS/api/x` becomes `http://10.0.0.5:8080/api/x`.
    pub async fn resolve_url(&self, template: &str) -> Result<String> {
        let invalid = |reason| ClientError::InvalidUrl {
            url: template.to_string(),
            reason,
        };

        let (scheme, rest) = template
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;
        let protocol =
            Protocol::from_scheme(scheme).ok_or_else(|| invalid("scheme must be http or https"))?;

        let host_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let (host, tail) = rest.split_at(host_end);
        let app_id = host.split(':').next().unwrap_or_default();
        if app_id.is_empty() {
            return Err(invalid("missing application name"));
        }

        let endpoints = self.endpoints_for(app_id, protocol).await?;
        let endpoint = self
            .inner
            .selector
            .pick(endpoints.into_values())
            .ok_or_else(|| ClientError::NotFound(app_id.to_string()))?;

        Ok(format!("{}://{}{}", scheme, endpoint, tail))
    }

    /// Fetch the whole registry now, replacing the cache.
    pub async fn refresh_registry(&self) -> Result<usize> {
        Ok(self.inner.refresher.refresh_all().await?)
    }

    /// Raw cached applications, keyed by uppercase application id.
    pub async fn applications(&self) -> HashMap<String, Application> {
        self.inner.state.read().await.cache.applications().clone()
    }

    /// Cached routable instances, keyed by uppercase application id.
    pub async fn instances(&self) -> HashMap<String, InstanceMap> {
        self.inner.state.read().await.cache.instances().clone()
    }

    /// This process's instance as last reported to the registry.
    pub async fn instance(&self) -> Option<Instance> {
        self.inner
            .state
            .read()
            .await
            .instance
            .as_ref()
            .map(|d| d.instance().clone())
    }

    pub async fn registration_state(&self) -> RegistrationState {
        self.inner.state.read().await.registration
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.read().await.running
    }

    /// Read an application's cache entry, fetching it once if it is absent.
    async fn cached_or_fetch<T>(
        &self,
        app_id: &str,
        lookup: impl Fn(&ClientState) -> Option<T>,
    ) -> Result<T> {
        if let Some(value) = lookup(&*self.inner.state.read().await) {
            return Ok(value);
        }

        debug!(app = %app_id, "Cache miss, fetching application");
        if let Err(e) = self.inner.refresher.refresh_application(app_id).await {
            warn!(app = %app_id, error = %e, "Failed to fetch application");
        }
        lookup(&*self.inner.state.read().await)
            .ok_or_else(|| ClientError::NotFound(app_id.to_string()))
    }
}
