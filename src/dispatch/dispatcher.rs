use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::metrics::{MetricsSink, report_outcome};
use crate::state::{MonitoredHost, ProbeOutcome, ProbeReport};
use crate::transport::ProbeEngine;

/// Lifecycle of a dispatcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatcherState {
    #[default]
    Running,
    Stopping,
    Stopped,
}

/// Counters returned when a dispatcher stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub host: String,
    pub probes: u64,
    pub successes: u64,
    pub failures: u64,
    /// `Stopped` once the dispatcher has returned
    pub state: DispatcherState,
}

/// Drives periodic probing of one host
pub struct Dispatcher {
    host: MonitoredHost,
    engine: ProbeEngine,
    metrics: Arc<dyn MetricsSink>,
    cancel: CancellationToken,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(
        host: MonitoredHost,
        engine: ProbeEngine,
        metrics: Arc<dyn MetricsSink>,
        cancel: CancellationToken,
    ) -> Self {
        let stats = DispatchStats {
            host: host.name.clone(),
            ..DispatchStats::default()
        };
        Self {
            host,
            engine,
            metrics,
            cancel,
            stats,
        }
    }

    /// Probe until the shutdown signal is observed
    ///
    /// A probe already in flight always completes and is reported; the
    /// signal is checked before each new probe and cuts the sleep short.
    pub async fn run(mut self) -> DispatchStats {
        tracing::debug!(host = %self.host.name, "Starting Dispatcher");

        while self.stats.state == DispatcherState::Running {
            if self.cancel.is_cancelled() {
                self.stats.state = DispatcherState::Stopping;
                break;
            }

            let report = self.engine.probe_host(&self.host).await;
            self.record(&report);

            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep(self.host.interval) => {}
            }
        }

        tracing::debug!(
            host = %self.host.name,
            probes = self.stats.probes,
            failures = self.stats.failures,
            "Stopping dispatcher"
        );
        self.stats.state = DispatcherState::Stopped;
        self.stats
    }

    fn record(&mut self, report: &ProbeReport) {
        self.stats.probes += 1;
        match &report.outcome {
            ProbeOutcome::Success(rtt) => {
                self.stats.successes += 1;
                tracing::debug!(
                    host = %self.host.name,
                    sequence = ?report.sequence,
                    duration = ?rtt,
                    "Received Ping"
                );
            }
            ProbeOutcome::Failure(reason) => {
                self.stats.failures += 1;
                tracing::warn!(
                    host = %self.host.name,
                    sequence = ?report.sequence,
                    reason = %reason,
                    "Dropped Ping"
                );
            }
        }

        report_outcome(self.metrics.as_ref(), &self.host, &report.outcome);
    }
}
