use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::state::{FailureReason, MonitoredHost, ProbeReport};

/// A probe request handed to the transport worker
#[derive(Debug)]
pub struct ProbeSubmission {
    /// Host name, for logging
    pub host: String,
    pub target: IpAddr,
    /// Maximum wait for the reply, measured from the send
    pub ttl: Duration,
    pub reply: oneshot::Sender<ProbeReport>,
}

/// Handle for running probes through the shared transport
///
/// Cheap to clone; the worker shuts down after the last handle is dropped.
#[derive(Debug, Clone)]
pub struct ProbeEngine {
    submissions: mpsc::UnboundedSender<ProbeSubmission>,
}

impl ProbeEngine {
    pub fn new(submissions: mpsc::UnboundedSender<ProbeSubmission>) -> Self {
        Self { submissions }
    }

    /// Probe one target and wait for the outcome
    ///
    /// Resolves within `ttl` (plus one worker poll) of the send.
    pub async fn probe(&self, target: IpAddr, ttl: Duration) -> ProbeReport {
        self.submit(target.to_string(), target, ttl).await
    }

    /// Probe a monitored host using its address and time-to-live
    pub async fn probe_host(&self, host: &MonitoredHost) -> ProbeReport {
        self.submit(host.name.clone(), host.address, host.ttl).await
    }

    async fn submit(&self, host: String, target: IpAddr, ttl: Duration) -> ProbeReport {
        let (reply, rx) = oneshot::channel();
        let submission = ProbeSubmission {
            host,
            target,
            ttl,
            reply,
        };

        if self.submissions.send(submission).is_err() {
            return ProbeReport::unsent(FailureReason::TransportClosed);
        }

        // Sender dropped without a report: the worker stopped
        rx.await
            .unwrap_or_else(|_| ProbeReport::unsent(FailureReason::TransportClosed))
    }
}
