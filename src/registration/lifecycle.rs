//! Registration state machine.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::{Heartbeat, RegistrationState, RetryPolicy};
use crate::instance::InstanceDescriptor;
use crate::model::InstanceStatus;
use crate::shutdown::ShutdownSignal;
use crate::state::{RegistrationGate, SharedState};
use crate::transport::RegistryTransport;
use crate::utils::net::port_accepting;

/// Drives this instance through registration, UP promotion and heartbeats.
///
/// ```text
/// Unregistered -> Registering -> Starting -> PromotingToUp -> Up
/// ```
///
/// Registration and promotion retry until they succeed or shutdown fires.
/// De-registration is not handled here; see `EurekaClient::shutdown`. Each
/// register and status attempt holds the registration gate, so a
/// de-registration either runs before it or sees its outcome.
pub struct Registrar {
    transport: Arc<dyn RegistryTransport>,
    state: SharedState,
    gate: RegistrationGate,
    policy: Arc<dyn RetryPolicy>,
    port_check_timeout: Duration,
}

impl Registrar {
    pub fn new(
        transport: Arc<dyn RegistryTransport>,
        state: SharedState,
        gate: RegistrationGate,
        policy: Arc<dyn RetryPolicy>,
        port_check_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            state,
            gate,
            policy,
            port_check_timeout,
        }
    }

    /// Run the full lifecycle: register, then heartbeat and promote
    /// concurrently. Returns when shutdown fires, or immediately if the
    /// instance cannot be registered.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        let Some(descriptor) = self.register(&mut shutdown).await else {
            return;
        };

        let heartbeat = Heartbeat::for_instance(self.transport.clone(), &descriptor);
        tokio::join!(
            heartbeat.run(shutdown.clone()),
            self.promote_to_up(&descriptor, shutdown),
        );
    }

    /// Register until the registry accepts the instance.
    ///
    /// The instance is always registered as STARTING; promotion reports UP.
    /// Returns the registered descriptor, or `None` if the instance identity
    /// is missing or shutdown fired first.
    pub async fn register(&self, shutdown: &mut ShutdownSignal) -> Option<InstanceDescriptor> {
        let descriptor = {
            let _gate = shutdown.run_until(self.gate.lock()).await?;
            if shutdown.is_triggered() {
                return None;
            }
            let mut state = self.state.write().await;
            let Some(instance) = state.instance.as_mut() else {
                error!("Instance identity is not configured, cannot register");
                return None;
            };
            instance.set_status(InstanceStatus::Starting);
            let descriptor = instance.clone();
            state.transition(RegistrationState::Registering);
            descriptor
        };

        let mut attempt = 0;
        loop {
            let gate = shutdown.run_until(self.gate.lock()).await?;
            // A de-registration that got the gate first owns the state.
            if self.state.read().await.registration != RegistrationState::Registering {
                debug!("Registration abandoned");
                return None;
            }

            let registration = self
                .transport
                .register(descriptor.app(), descriptor.instance());
            match shutdown.run_until(registration).await {
                Some(Ok(())) => {
                    self.state
                        .write()
                        .await
                        .transition(RegistrationState::Starting);
                    break;
                }
                Some(Err(e)) => {
                    drop(gate);
                    let delay = self.policy.next_delay(attempt);
                    warn!(
                        app = %descriptor.app(),
                        instance_id = %descriptor.instance_id(),
                        attempt,
                        ?delay,
                        error = %e,
                        "Registration failed, retrying"
                    );
                    attempt += 1;
                    if !shutdown.sleep(delay).await {
                        return None;
                    }
                }
                None => return None,
            }
        }

        info!(
            app = %descriptor.app(),
            instance_id = %descriptor.instance_id(),
            status = %descriptor.status(),
            "Registered with registry"
        );
        Some(descriptor)
    }

    /// Promote a registered instance to UP.
    ///
    /// Unless the instance is enabled on init, waits for its service port to
    /// accept connections first. Returns true once the registry accepted the
    /// UP status; false if shutdown fired first.
    pub async fn promote_to_up(
        &self,
        descriptor: &InstanceDescriptor,
        mut shutdown: ShutdownSignal,
    ) -> bool {
        {
            let Some(_gate) = shutdown.run_until(self.gate.lock()).await else {
                return false;
            };
            let mut state = self.state.write().await;
            if state.registration != RegistrationState::Starting {
                debug!(state = %state.registration, "Skipping promotion");
                return false;
            }
            state.transition(RegistrationState::PromotingToUp);
        }

        let mut attempt = 0;
        loop {
            if descriptor.enabled_on_init() || self.service_started(descriptor).await {
                let Some(_gate) = shutdown.run_until(self.gate.lock()).await else {
                    return false;
                };
                let current = self.state.read().await.registration;
                if current != RegistrationState::PromotingToUp {
                    debug!(state = %current, "Promotion abandoned");
                    return false;
                }

                info!(instance_id = %descriptor.instance_id(), "Updating instance status to UP");
                let update = self.transport.update_status(
                    descriptor.app(),
                    descriptor.instance_id(),
                    InstanceStatus::Up,
                );
                match shutdown.run_until(update).await {
                    Some(Ok(())) => {
                        if !self.mark_up().await {
                            return false;
                        }
                        info!(instance_id = %descriptor.instance_id(), "Instance status is UP");
                        return true;
                    }
                    Some(Err(e)) => {
                        warn!(
                            instance_id = %descriptor.instance_id(),
                            error = %e,
                            "Failed to update instance status to UP"
                        );
                    }
                    None => return false,
                }
            }

            let delay = self.policy.next_delay(attempt);
            attempt += 1;
            if !shutdown.sleep(delay).await {
                return false;
            }
        }
    }

    async fn service_started(&self, descriptor: &InstanceDescriptor) -> bool {
        port_accepting(
            &descriptor.instance().ip_addr,
            descriptor.service_port(),
            self.port_check_timeout,
        )
        .await
    }

    /// Record the accepted UP status, unless the instance has left promotion.
    async fn mark_up(&self) -> bool {
        let mut state = self.state.write().await;
        if state.registration != RegistrationState::PromotingToUp {
            debug!(state = %state.registration, "Instance left promotion, not marking UP");
            return false;
        }
        if let Some(instance) = state.instance.as_mut() {
            instance.set_status(InstanceStatus::Up);
        }
        state.transition(RegistrationState::Up);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstanceConfig;
    use crate::registration::FixedInterval;
    use crate::shutdown::ShutdownTrigger;
    use crate::state::{registration_gate, shared, ClientState};
    use crate::test_utils::MockTransport;
    use tokio::net::TcpListener;
    use tokio::time::Instant;

    const RETRY: Duration = Duration::from_secs(3);

    fn descriptor(enabled_on_init: bool, port: u16) -> InstanceDescriptor {
        InstanceDescriptor::from_config(&InstanceConfig {
            app_name: "orders".to_string(),
            ip_address: "127.0.0.1".to_string(),
            port,
            instance_enabled_on_init: enabled_on_init,
            ..Default::default()
        })
        .unwrap()
    }

    fn registrar(
        transport: Arc<MockTransport>,
        instance: Option<InstanceDescriptor>,
    ) -> (Registrar, SharedState) {
        let state = shared(ClientState::new(instance));
        let registrar = Registrar::new(
            transport,
            state.clone(),
            registration_gate(),
            Arc::new(FixedInterval::new(RETRY)),
            Duration::from_millis(200),
        );
        (registrar, state)
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_retries_until_success() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_next_registers(2).await;
        let (registrar, state) = registrar(transport.clone(), Some(descriptor(true, 8080)));
        let trigger = ShutdownTrigger::new();

        let started = Instant::now();
        let registered = registrar.register(&mut trigger.signal()).await;

        assert!(registered.is_some());
        assert_eq!(started.elapsed(), RETRY * 2);
        assert_eq!(transport.register_count().await, 3);
        assert_eq!(state.read().await.registration, RegistrationState::Starting);
    }

    #[tokio::test]
    async fn test_register_sends_starting_status() {
        let transport = Arc::new(MockTransport::new());
        let mut up = descriptor(true, 8080);
        up.set_status(InstanceStatus::Up);
        let (registrar, state) = registrar(transport.clone(), Some(up));
        let trigger = ShutdownTrigger::new();

        let registered = registrar.register(&mut trigger.signal()).await.unwrap();

        assert_eq!(registered.status(), InstanceStatus::Starting);
        assert_eq!(
            state.read().await.instance.as_ref().unwrap().status(),
            InstanceStatus::Starting
        );
        let sent = transport
            .registered_instance("ORDERS", "127.0.0.1:orders:8080")
            .await
            .unwrap();
        assert_eq!(sent.status, InstanceStatus::Starting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_waits_for_gate_holder() {
        let transport = Arc::new(MockTransport::new());
        let state = shared(ClientState::new(Some(descriptor(true, 8080))));
        let gate = registration_gate();
        let registrar = Registrar::new(
            transport.clone(),
            state.clone(),
            gate.clone(),
            Arc::new(FixedInterval::new(RETRY)),
            Duration::from_millis(200),
        );
        let trigger = ShutdownTrigger::new();

        let held = gate.lock().await;
        let mut signal = trigger.signal();
        let handle = tokio::spawn(async move { registrar.register(&mut signal).await });
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.register_count().await, 0);

        // The holder de-registered the instance; registration must not resume.
        state.write().await.transition(RegistrationState::Deregistered);
        drop(held);
        trigger.trigger();

        assert!(handle.await.unwrap().is_none());
        assert_eq!(transport.register_count().await, 0);
    }

    #[tokio::test]
    async fn test_register_without_identity_aborts() {
        let transport = Arc::new(MockTransport::new());
        let (registrar, state) = registrar(transport.clone(), None);
        let trigger = ShutdownTrigger::new();

        assert!(registrar.register(&mut trigger.signal()).await.is_none());
        assert_eq!(transport.register_count().await, 0);
        assert_eq!(state.read().await.registration, RegistrationState::Unregistered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_stops_on_shutdown() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_next_registers(u32::MAX).await;
        let (registrar, state) = registrar(transport.clone(), Some(descriptor(true, 8080)));
        let trigger = ShutdownTrigger::new();
        let mut signal = trigger.signal();

        let handle = tokio::spawn(async move { registrar.register(&mut signal).await });
        tokio::time::sleep(Duration::from_secs(10)).await;
        trigger.trigger();

        assert!(handle.await.unwrap().is_none());
        assert_eq!(transport.register_count().await, 4);
        assert_eq!(state.read().await.registration, RegistrationState::Registering);
    }

    #[tokio::test]
    async fn test_promote_when_enabled_on_init() {
        let transport = Arc::new(MockTransport::new());
        let descriptor = descriptor(true, 1);
        let (registrar, state) = registrar(transport.clone(), Some(descriptor.clone()));
        let trigger = ShutdownTrigger::new();
        registrar.register(&mut trigger.signal()).await.unwrap();

        assert!(registrar.promote_to_up(&descriptor, trigger.signal()).await);

        let state = state.read().await;
        assert_eq!(state.registration, RegistrationState::Up);
        assert_eq!(state.instance.as_ref().unwrap().status(), InstanceStatus::Up);
        assert_eq!(transport.status_updates().await, vec![InstanceStatus::Up]);
    }

    #[tokio::test]
    async fn test_promote_waits_for_service_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = Arc::new(MockTransport::new());
        let descriptor = descriptor(false, port);
        let state = shared(ClientState::new(Some(descriptor.clone())));
        let registrar = Registrar::new(
            transport.clone(),
            state.clone(),
            registration_gate(),
            Arc::new(FixedInterval::new(Duration::from_millis(50))),
            Duration::from_millis(200),
        );
        let trigger = ShutdownTrigger::new();
        registrar.register(&mut trigger.signal()).await.unwrap();

        let promotion = {
            let descriptor = descriptor.clone();
            let signal = trigger.signal();
            tokio::spawn(async move { registrar.promote_to_up(&descriptor, signal).await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(transport.status_updates().await.is_empty());
        assert_eq!(
            state.read().await.registration,
            RegistrationState::PromotingToUp
        );

        let _listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        assert!(promotion.await.unwrap());
        assert_eq!(state.read().await.registration, RegistrationState::Up);
    }

    #[tokio::test(start_paused = true)]
    async fn test_promote_retries_failed_status_update() {
        let transport = Arc::new(MockTransport::new());
        transport.set_fail_on_update_status(true).await;
        let descriptor = descriptor(true, 8080);
        let (registrar, state) = registrar(transport.clone(), Some(descriptor.clone()));
        let trigger = ShutdownTrigger::new();
        registrar.register(&mut trigger.signal()).await.unwrap();

        let promotion = {
            let descriptor = descriptor.clone();
            let signal = trigger.signal();
            tokio::spawn(async move { registrar.promote_to_up(&descriptor, signal).await })
        };

        tokio::time::sleep(RETRY * 2 + Duration::from_millis(1)).await;
        assert_eq!(transport.update_status_count().await, 3);

        transport.set_fail_on_update_status(false).await;
        assert!(promotion.await.unwrap());
        assert_eq!(transport.update_status_count().await, 4);
        assert_eq!(state.read().await.registration, RegistrationState::Up);
    }

    #[tokio::test]
    async fn test_mark_up_ignored_after_promotion_left() {
        let transport = Arc::new(MockTransport::new());
        let (registrar, state) = registrar(transport, Some(descriptor(true, 8080)));
        state
            .write()
            .await
            .transition(RegistrationState::Deregistering);

        assert!(!registrar.mark_up().await);

        let state = state.read().await;
        assert_eq!(state.registration, RegistrationState::Deregistering);
        assert_eq!(
            state.instance.as_ref().unwrap().status(),
            InstanceStatus::Starting
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_promotion_abandoned_when_state_changes() {
        let transport = Arc::new(MockTransport::new());
        transport.set_fail_on_update_status(true).await;
        let descriptor = descriptor(true, 8080);
        let (registrar, state) = registrar(transport.clone(), Some(descriptor.clone()));
        let trigger = ShutdownTrigger::new();
        registrar.register(&mut trigger.signal()).await.unwrap();

        let promotion = {
            let descriptor = descriptor.clone();
            let signal = trigger.signal();
            tokio::spawn(async move { registrar.promote_to_up(&descriptor, signal).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.update_status_count().await, 1);

        state
            .write()
            .await
            .transition(RegistrationState::Deregistered);
        transport.set_fail_on_update_status(false).await;

        assert!(!promotion.await.unwrap());
        assert_eq!(transport.update_status_count().await, 1);
        assert_eq!(
            state.read().await.instance.as_ref().unwrap().status(),
            InstanceStatus::Starting
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_heartbeats_after_registration() {
        let transport = Arc::new(MockTransport::new());
        let (registrar, state) = registrar(transport.clone(), Some(descriptor(true, 8080)));
        let trigger = ShutdownTrigger::new();

        let handle = tokio::spawn(registrar.run(trigger.signal()));
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(transport.register_count().await, 1);
        assert_eq!(transport.heartbeat_count().await, 3);
        assert_eq!(state.read().await.registration, RegistrationState::Up);

        trigger.trigger();
        handle.await.unwrap();
    }
}
