use anyhow::{Result, anyhow};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;

use crate::probe::{IcmpSocket, PROBE_PAYLOAD, build_echo_request, get_identifier};
use crate::state::{FailureReason, ProbeOutcome, ProbeReport};
use crate::transport::engine::{ProbeEngine, ProbeSubmission};
use crate::transport::icmp::{IcmpTransport, Incoming, TransportError};
use crate::transport::pending::{Correlation, CorrelationTable, PendingProbe};

/// Longest the worker blocks in a read before checking for new submissions
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Maximum consecutive errors before stopping the worker
const MAX_CONSECUTIVE_ERRORS: u32 = 50;

/// Receive buffer size
const RECV_BUFFER_SIZE: usize = 1500;

/// Owns the ICMP socket and the correlation table
///
/// Dispatchers never touch either directly: they submit probes through a
/// [`ProbeEngine`] and await the report. One read loop serves every host and
/// routes each reply to its waiter by sequence number.
pub struct TransportWorker<S> {
    transport: IcmpTransport<S>,
    table: CorrelationTable,
    submissions: mpsc::UnboundedReceiver<ProbeSubmission>,
    cancel: CancellationToken,
    rng: StdRng,
    consecutive_errors: u32,
}

impl<S: IcmpSocket> TransportWorker<S> {
    pub fn new(
        transport: IcmpTransport<S>,
        submissions: mpsc::UnboundedReceiver<ProbeSubmission>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            table: CorrelationTable::new(),
            submissions,
            cancel,
            rng: StdRng::from_entropy(),
            consecutive_errors: 0,
        }
    }

    /// Run the worker on the current thread (blocking I/O)
    ///
    /// Returns once every [`ProbeEngine`] handle is dropped and the last
    /// in-flight probe has resolved.
    pub fn run_blocking(mut self) -> Result<()> {
        tracing::debug!(identifier = self.transport.identifier(), "Starting transport");

        let mut buffer = [0u8; RECV_BUFFER_SIZE];
        let mut accepting = true;

        loop {
            if accepting {
                accepting = self.drain_submissions();
            }
            if !accepting && self.table.is_empty() {
                break;
            }

            // Never sleep past the nearest probe deadline
            let now = Instant::now();
            let poll_until = now + POLL_INTERVAL;
            let wait_until = self
                .table
                .next_deadline()
                .map_or(poll_until, |deadline| deadline.min(poll_until));

            match self.transport.receive_with_deadline(&mut buffer, wait_until) {
                Ok((len, peer)) => {
                    self.consecutive_errors = 0;
                    self.handle_datagram(&buffer[..len], peer);
                }
                Err(TransportError::Timeout) => {
                    self.consecutive_errors = 0;
                }
                Err(e) => {
                    self.consecutive_errors += 1;
                    tracing::warn!(
                        error = %e,
                        count = self.consecutive_errors,
                        "Receive error"
                    );

                    if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        // Waiters see their channel close and report TransportClosed
                        self.cancel.cancel();
                        return Err(anyhow!(
                            "Transport stopped: {} consecutive errors (last: {})",
                            self.consecutive_errors,
                            e
                        ));
                    }
                }
            }

            self.expire(Instant::now());
        }

        tracing::debug!("Closing transport");
        Ok(())
    }

    /// Start every queued submission; false once all senders are gone
    fn drain_submissions(&mut self) -> bool {
        loop {
            match self.submissions.try_recv() {
                Ok(submission) => self.start_probe(submission),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn start_probe(&mut self, submission: ProbeSubmission) {
        let Some(sequence) = self.table.allocate(&mut self.rng) else {
            tracing::warn!(host = %submission.host, "No free sequence identifier");
            let _ = submission
                .reply
                .send(ProbeReport::unsent(FailureReason::SequenceExhausted));
            return;
        };

        let Some(packet) = build_echo_request(self.transport.identifier(), sequence, PROBE_PAYLOAD)
        else {
            let _ = submission.reply.send(ProbeReport::new(
                sequence,
                ProbeOutcome::Failure(FailureReason::SendError(
                    "unable to create ICMP packet".into(),
                )),
            ));
            return;
        };

        let sent_at = Instant::now();

        // Register pending BEFORE sending to prevent race with fast responses
        self.table.insert(
            sequence,
            PendingProbe {
                host: submission.host,
                target: submission.target,
                sent_at,
                deadline: sent_at + submission.ttl,
                reply: submission.reply,
            },
        );

        if let Err(e) = self.transport.send(&packet, submission.target)
            && let Some(probe) = self.table.release(sequence)
        {
            let _ = probe.reply.send(ProbeReport::new(
                sequence,
                ProbeOutcome::Failure(FailureReason::SendError(e.to_string())),
            ));
        }
    }

    fn handle_datagram(&mut self, data: &[u8], peer: IpAddr) {
        let sequence = match self.transport.classify(data) {
            Incoming::EchoReply { sequence } => sequence,
            Incoming::Malformed => {
                tracing::debug!(peer = %peer, len = data.len(), "Unable to parse ICMP message");
                return;
            }
            Incoming::Ignored(body) => {
                tracing::trace!(peer = %peer, ?body, "Ignoring ICMP message");
                return;
            }
        };

        match self.table.correlate(sequence, peer) {
            Correlation::Matched(probe) => {
                let rtt = Instant::now().duration_since(probe.sent_at);
                let _ = probe
                    .reply
                    .send(ProbeReport::new(sequence, ProbeOutcome::Success(rtt)));
            }
            Correlation::ForeignPeer => {
                tracing::debug!(peer = %peer, sequence, "Echo reply from unexpected address");
            }
            Correlation::Unknown => {
                // Late packet arrival - response came after timeout
                tracing::debug!(peer = %peer, sequence, "Echo reply for no pending probe");
            }
        }
    }

    fn expire(&mut self, now: Instant) {
        for (sequence, probe) in self.table.take_expired(now) {
            let _ = probe.reply.send(ProbeReport::new(
                sequence,
                ProbeOutcome::Failure(FailureReason::Timeout),
            ));
        }
    }
}

/// Spawn the transport worker on a dedicated OS thread
///
/// Returns the engine handle dispatchers submit probes through.
pub fn spawn_transport<S: IcmpSocket>(
    socket: S,
    cancel: CancellationToken,
) -> (ProbeEngine, std::thread::JoinHandle<Result<()>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let transport = IcmpTransport::new(socket, get_identifier());

    let handle = std::thread::spawn(move || {
        let worker = TransportWorker::new(transport, rx, cancel);

        // Catch panics and convert to error with details
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| worker.run_blocking())) {
            Ok(result) => result,
            Err(panic_payload) => {
                let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                Err(anyhow!("Transport panicked: {}", msg))
            }
        }
    });

    (ProbeEngine::new(tx), handle)
}
