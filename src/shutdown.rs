//! Shutdown coordination.
//!
//! [`ShutdownTrigger`]/[`ShutdownSignal`] stop the client's background loops.
//! [`ShutdownCoordinator`] maps OS termination signals onto
//! [`EurekaClient::shutdown`] and exits the process.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::client::EurekaClient;

/// Owner side of the cancellation channel.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// A receiver for background tasks.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Tell every task holding a signal to stop.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Task side of the cancellation channel.
///
/// A dropped trigger counts as triggered.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep for `duration`. Returns false if shutdown fired first.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.triggered() => false,
        }
    }

    /// Drive `future` to completion unless shutdown fires first.
    pub async fn run_until<F: Future>(&mut self, future: F) -> Option<F::Output> {
        if self.is_triggered() {
            return None;
        }
        tokio::select! {
            output = future => Some(output),
            _ = self.triggered() => None,
        }
    }
}

/// Wait for a process termination request.
///
/// Returns the name of the signal received: SIGHUP, SIGINT, SIGTERM or
/// SIGQUIT on unix, Ctrl+C elsewhere.
pub async fn wait_for_termination() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = signal(SignalKind::hangup())?;
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let mut quit = signal(SignalKind::quit())?;

        let name = tokio::select! {
            _ = hangup.recv() => "SIGHUP",
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
            _ = quit.recv() => "SIGQUIT",
        };
        Ok(name)
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("CTRL_C")
    }
}

/// Turns termination signals into a de-registration and process exit.
pub struct ShutdownCoordinator;

impl ShutdownCoordinator {
    /// Listen for termination signals on behalf of `client`.
    ///
    /// On a signal the client is shut down (de-registering if configured) and
    /// the process exits with status 0. The listener itself stops quietly if
    /// `shutdown` fires first.
    pub fn spawn(client: EurekaClient, shutdown: ShutdownSignal) -> JoinHandle<()> {
        Self::spawn_with(client, shutdown, wait_for_termination(), |code| {
            std::process::exit(code)
        })
    }

    pub(crate) fn spawn_with<T, E>(
        client: EurekaClient,
        mut shutdown: ShutdownSignal,
        termination: T,
        exit: E,
    ) -> JoinHandle<()>
    where
        T: Future<Output = std::io::Result<&'static str>> + Send + 'static,
        E: FnOnce(i32) + Send + 'static,
    {
        tokio::spawn(async move {
            let signal = match shutdown.run_until(termination).await {
                Some(Ok(signal)) => signal,
                Some(Err(e)) => {
                    error!(error = %e, "Failed to install termination signal handlers");
                    return;
                }
                None => return,
            };

            info!(
                signal,
                instance_id = client.instance_id().unwrap_or("<none>"),
                "Received termination signal"
            );
            if let Err(e) = client.shutdown().await {
                error!(error = %e, "Shutdown failed, instance may remain registered");
            }
            exit(0);
        })
    }
}
