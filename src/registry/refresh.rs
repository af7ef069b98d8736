//! Cache population from the registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::RegistryCache;
use crate::shutdown::ShutdownSignal;
use crate::state::SharedState;
use crate::transport::{self, RegistryTransport};

/// Pulls registry data through the transport into the shared cache.
pub struct RegistryRefresher {
    transport: Arc<dyn RegistryTransport>,
    state: SharedState,
    only_up: bool,
}

impl RegistryRefresher {
    pub fn new(transport: Arc<dyn RegistryTransport>, state: SharedState, only_up: bool) -> Self {
        Self {
            transport,
            state,
            only_up,
        }
    }

    /// Replace the whole cache with the registry's current view.
    ///
    /// Returns the number of applications cached. On failure the previous
    /// cache content is left untouched.
    pub async fn refresh_all(&self) -> transport::Result<usize> {
        debug!("Fetching registry");
        let applications = self.transport.query_all().await?;

        let cache = RegistryCache::from_applications(applications, self.only_up);
        let count = cache.len();
        self.state.write().await.cache = cache;

        debug!(applications = count, "Registry cache replaced");
        Ok(count)
    }

    /// Fetch one application and merge it into the cache, leaving every
    /// other application as it was.
    pub async fn refresh_application(&self, app_id: &str) -> transport::Result<()> {
        let application = self.transport.query_application(app_id).await?;
        let instances = application.instances.len();

        self.state
            .write()
            .await
            .cache
            .insert_as(app_id, application, self.only_up);

        debug!(app = %app_id, instances, "Application cache refreshed");
        Ok(())
    }
}

/// Spawn the periodic full-registry refresh.
///
/// Fetches immediately, then once per `interval`. Failures are logged and the
/// loop waits for the next tick; it only stops when `shutdown` fires.
pub fn spawn_refresh_loop(
    refresher: Arc<RegistryRefresher>,
    interval: Duration,
    mut shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Registry refresh loop started");

        loop {
            match shutdown.run_until(refresher.refresh_all()).await {
                Some(Ok(_)) => {}
                Some(Err(e)) => error!(error = %e, "Failed to fetch registry"),
                None => break,
            }
            if !shutdown.sleep(interval).await {
                break;
            }
        }

        info!("Registry refresh loop stopped");
    })
}
