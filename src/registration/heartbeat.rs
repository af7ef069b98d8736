//! Lease renewal.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::instance::InstanceDescriptor;
use crate::shutdown::ShutdownSignal;
use crate::transport::RegistryTransport;

/// Periodic lease renewal for one registered instance.
pub struct Heartbeat {
    transport: Arc<dyn RegistryTransport>,
    app: String,
    instance_id: String,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(
        transport: Arc<dyn RegistryTransport>,
        app: impl Into<String>,
        instance_id: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            transport,
            app: app.into(),
            instance_id: instance_id.into(),
            interval,
        }
    }

    /// Heartbeat at the instance's lease renewal interval.
    pub fn for_instance(
        transport: Arc<dyn RegistryTransport>,
        descriptor: &InstanceDescriptor,
    ) -> Self {
        Self::new(
            transport,
            descriptor.app(),
            descriptor.instance_id(),
            Duration::from_secs(descriptor.renewal_interval_secs()),
        )
    }

    /// Renew the lease, then wait one interval, until shutdown.
    ///
    /// The interval is the same whether or not the renewal succeeded.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        info!(
            app = %self.app,
            instance_id = %self.instance_id,
            interval_secs = self.interval.as_secs(),
            "Heartbeat started"
        );

        loop {
            let renewal = self.transport.heartbeat(&self.app, &self.instance_id);
            match shutdown.run_until(renewal).await {
                Some(Ok(())) => {
                    debug!(app = %self.app, instance_id = %self.instance_id, "Heartbeat sent");
                }
                Some(Err(e)) => {
                    warn!(
                        app = %self.app,
                        instance_id = %self.instance_id,
                        error = %e,
                        "Failed to send heartbeat"
                    );
                }
                None => break,
            }
            if !shutdown.sleep(self.interval).await {
                break;
            }
        }

        debug!(instance_id = %self.instance_id, "Heartbeat stopped");
    }
}
