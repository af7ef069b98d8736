//! Test utilities and mock implementations.
//!
//! [`MockTransport`] is an in-memory registry: registrations show up in
//! queries, and every call can be made to fail on demand.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{Application, Instance, InstanceStatus};
use crate::registry::cache_key;
use crate::transport::{RegistryTransport, Result, TransportError};

/// A call received by the mock, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Register { app: String, instance_id: String },
    Deregister { app: String, instance_id: String },
    Heartbeat { app: String, instance_id: String },
    UpdateStatus {
        app: String,
        instance_id: String,
        status: InstanceStatus,
    },
    QueryApplication { app_id: String },
    QueryAll,
}

/// Mock registry transport backed by an in-memory application table.
#[derive(Default)]
pub struct MockTransport {
    applications: RwLock<HashMap<String, Application>>,
    calls: RwLock<Vec<TransportCall>>,
    accepted_statuses: RwLock<Vec<InstanceStatus>>,
    failing_registers: RwLock<u32>,
    fail_on_deregister: RwLock<bool>,
    fail_on_heartbeat: RwLock<bool>,
    fail_on_update_status: RwLock<bool>,
    fail_on_query: RwLock<bool>,
    register_latency: RwLock<Duration>,
    deregister_latency: RwLock<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace an application as the registry would report it.
    pub async fn put_application(&self, application: Application) {
        self.applications
            .write()
            .await
            .insert(cache_key(&application.name), application);
    }

    pub async fn remove_application(&self, app_id: &str) {
        self.applications.write().await.remove(&cache_key(app_id));
    }

    /// Make the next `count` registrations fail.
    pub async fn fail_next_registers(&self, count: u32) {
        *self.failing_registers.write().await = count;
    }

    pub async fn set_fail_on_deregister(&self, fail: bool) {
        *self.fail_on_deregister.write().await = fail;
    }

    pub async fn set_fail_on_heartbeat(&self, fail: bool) {
        *self.fail_on_heartbeat.write().await = fail;
    }

    pub async fn set_fail_on_update_status(&self, fail: bool) {
        *self.fail_on_update_status.write().await = fail;
    }

    /// Fail both single-application and full-registry queries.
    pub async fn set_fail_on_query(&self, fail: bool) {
        *self.fail_on_query.write().await = fail;
    }

    /// Delay every registration by `latency` before it is answered.
    pub async fn set_register_latency(&self, latency: Duration) {
        *self.register_latency.write().await = latency;
    }

    /// Delay every de-registration by `latency` before it is answered.
    pub async fn set_deregister_latency(&self, latency: Duration) {
        *self.deregister_latency.write().await = latency;
    }

    pub async fn calls(&self) -> Vec<TransportCall> {
        self.calls.read().await.clone()
    }

    pub async fn register_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Register { .. }))
            .await
    }

    pub async fn deregister_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Deregister { .. }))
            .await
    }

    pub async fn heartbeat_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Heartbeat { .. }))
            .await
    }

    pub async fn update_status_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::UpdateStatus { .. }))
            .await
    }

    pub async fn query_application_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::QueryApplication { .. }))
            .await
    }

    pub async fn query_all_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::QueryAll)).await
    }

    /// Statuses successfully pushed through `update_status`, in order.
    pub async fn status_updates(&self) -> Vec<InstanceStatus> {
        self.accepted_statuses.read().await.clone()
    }

    /// Instance as currently held by the mock registry.
    pub async fn registered_instance(&self, app: &str, instance_id: &str) -> Option<Instance> {
        self.applications
            .read()
            .await
            .get(&cache_key(app))
            .and_then(|a| a.instances.iter().find(|i| i.instance_id == instance_id))
            .cloned()
    }

    async fn count(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls.read().await.iter().filter(|c| predicate(c)).count()
    }

    async fn record(&self, call: TransportCall) {
        self.calls.write().await.push(call);
    }

    async fn respond_after(latency: Duration) {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn unavailable(operation: &str) -> TransportError {
        TransportError::Unavailable(format!("Mock {} failure", operation))
    }
}

#[async_trait]
impl RegistryTransport for MockTransport {
    async fn register(&self, app: &str, instance: &Instance) -> Result<()> {
        self.record(TransportCall::Register {
            app: app.to_string(),
            instance_id: instance.instance_id.clone(),
        })
        .await;
        Self::respond_after(*self.register_latency.read().await).await;

        {
            let mut failing = self.failing_registers.write().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(Self::unavailable("register"));
            }
        }

        let mut applications = self.applications.write().await;
        let application = applications
            .entry(cache_key(app))
            .or_insert_with(|| Application::new(app, Vec::new()));
        application
            .instances
            .retain(|i| i.instance_id != instance.instance_id);
        application.instances.push(instance.clone());
        Ok(())
    }

    async fn deregister(&self, app: &str, instance_id: &str) -> Result<()> {
        self.record(TransportCall::Deregister {
            app: app.to_string(),
            instance_id: instance_id.to_string(),
        })
        .await;
        Self::respond_after(*self.deregister_latency.read().await).await;

        if *self.fail_on_deregister.read().await {
            return Err(Self::unavailable("deregister"));
        }

        if let Some(application) = self.applications.write().await.get_mut(&cache_key(app)) {
            application.instances.retain(|i| i.instance_id != instance_id);
        }
        Ok(())
    }

    async fn heartbeat(&self, app: &str, instance_id: &str) -> Result<()> {
        self.record(TransportCall::Heartbeat {
            app: app.to_string(),
            instance_id: instance_id.to_string(),
        })
        .await;

        if *self.fail_on_heartbeat.read().await {
            return Err(Self::unavailable("heartbeat"));
        }
        Ok(())
    }

    async fn update_status(
        &self,
        app: &str,
        instance_id: &str,
        status: InstanceStatus,
    ) -> Result<()> {
        self.record(TransportCall::UpdateStatus {
            app: app.to_string(),
            instance_id: instance_id.to_string(),
            status,
        })
        .await;

        if *self.fail_on_update_status.read().await {
            return Err(Self::unavailable("update_status"));
        }
        self.accepted_statuses.write().await.push(status);

        if let Some(application) = self.applications.write().await.get_mut(&cache_key(app)) {
            for instance in application
                .instances
                .iter_mut()
                .filter(|i| i.instance_id == instance_id)
            {
                instance.status = status;
            }
        }
        Ok(())
    }

    async fn query_application(&self, app_id: &str) -> Result<Application> {
        self.record(TransportCall::QueryApplication {
            app_id: app_id.to_string(),
        })
        .await;

        if *self.fail_on_query.read().await {
            return Err(Self::unavailable("query"));
        }
        self.applications
            .read()
            .await
            .get(&cache_key(app_id))
            .cloned()
            .ok_or_else(|| TransportError::NotFound(app_id.to_string()))
    }

    async fn query_all(&self) -> Result<Vec<Application>> {
        self.record(TransportCall::QueryAll).await;

        if *self.fail_on_query.read().await {
            return Err(Self::unavailable("query"));
        }
        Ok(self.applications.read().await.values().cloned().collect())
    }
}
