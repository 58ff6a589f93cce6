use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::dispatcher::{DispatchStats, Dispatcher};

/// Broadcasts the stop signal and waits for every dispatcher to finish
pub struct ShutdownCoordinator {
    cancel: CancellationToken,
    dispatchers: Vec<(String, JoinHandle<DispatchStats>)>,
}

impl ShutdownCoordinator {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            dispatchers: Vec::new(),
        }
    }

    /// The shared signal every dispatcher observes
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn len(&self) -> usize {
        self.dispatchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }

    /// Spawn a dispatcher and track it until shutdown
    pub fn spawn(&mut self, name: impl Into<String>, dispatcher: Dispatcher) {
        let handle = tokio::spawn(dispatcher.run());
        self.dispatchers.push((name.into(), handle));
    }

    /// Cancel the token on the first Ctrl+C
    pub fn listen_for_interrupt(&self) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Interrupt received, stopping dispatchers"),
                Err(e) => tracing::error!(error = %e, "Unable to listen for interrupt"),
            }
            cancel.cancel();
        });
    }

    /// Signal every dispatcher to stop
    pub fn trigger(&self) {
        self.cancel.cancel();
    }

    /// Wait until every dispatcher has stopped
    ///
    /// Returns only after the signal fired and all tasks acknowledged it.
    pub async fn wait(self) -> Vec<DispatchStats> {
        self.cancel.cancelled().await;

        let mut stats = Vec::with_capacity(self.dispatchers.len());
        for (name, handle) in self.dispatchers {
            match handle.await {
                Ok(s) => stats.push(s),
                Err(e) => tracing::error!(host = %name, error = %e, "Dispatcher task failed"),
            }
        }
        stats
    }
}
