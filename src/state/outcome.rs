use std::fmt;
use std::time::Duration;

/// Why a probe failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Packet could not be built or written
    SendError(String),
    /// No matching reply within the time-to-live
    Timeout,
    /// The transport worker is no longer running
    TransportClosed,
    /// Every sequence identifier is in flight
    SequenceExhausted,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendError(detail) => write!(f, "send error: {}", detail),
            Self::Timeout => write!(f, "timeout"),
            Self::TransportClosed => write!(f, "transport closed"),
            Self::SequenceExhausted => write!(f, "no free sequence identifier"),
        }
    }
}

/// Result of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success(Duration),
    Failure(FailureReason),
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Outcome together with the sequence identifier that carried the probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    /// None if the probe never got an identifier
    pub sequence: Option<u16>,
    pub outcome: ProbeOutcome,
}

impl ProbeReport {
    pub fn new(sequence: u16, outcome: ProbeOutcome) -> Self {
        Self {
            sequence: Some(sequence),
            outcome,
        }
    }

    /// Failure that happened before a sequence identifier was assigned
    pub fn unsent(reason: FailureReason) -> Self {
        Self {
            sequence: None,
            outcome: ProbeOutcome::Failure(reason),
        }
    }
}

/// Convert to the fractional milliseconds statsd timings use
pub fn duration_millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1e3
}
