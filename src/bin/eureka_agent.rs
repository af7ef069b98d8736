//! eureka-agent: registry sidecar
//!
//! Registers the configured instance with a Eureka registry, keeps its lease
//! alive and de-registers it on SIGHUP/SIGINT/SIGTERM/SIGQUIT.
//!
//! ## Configuration
//! - EUREKA_CONFIG: path to a YAML configuration file (optional)
//! - EUREKA__SECTION__KEY: overrides, e.g. EUREKA__INSTANCE__APP_NAME=orders
//! - EUREKA_LOG: log filter (default: info)

use std::sync::Arc;

use tracing::{error, info};

use eureka_agent::config::Config;
use eureka_agent::shutdown::wait_for_termination;
use eureka_agent::utils::bootstrap::init_tracing;
use eureka_agent::{EurekaClient, RestTransport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = std::env::args().nth(1);
    let mut config = Config::load(path.as_deref())?;
    // Signals are handled here so the agent can wait for its tasks to stop.
    config.client.handle_signals = false;

    let transport = Arc::new(RestTransport::new(&config.service_url)?);
    info!(service_urls = ?transport.urls(), "eureka-agent starting");

    let client = EurekaClient::new(config, transport);
    client.run().await;

    let signal = wait_for_termination().await?;
    info!(signal, "Termination signal received");

    if let Err(e) = client.shutdown().await {
        error!(error = %e, "Shutdown failed");
    }
    client.halt().await;

    info!("eureka-agent stopped");
    Ok(())
}
