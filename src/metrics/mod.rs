//! Metric emission for probe outcomes.
//!
//! - [`MetricsSink`]: the counter/timing primitives a collector must provide
//! - [`StatsdClient`]: UDP statsd implementation
//! - [`report_outcome`]: maps a probe outcome to one emission

mod statsd;

pub use statsd::{DEFAULT_STATSD_PORT, MetricsError, StatsdClient};

use crate::state::{MonitoredHost, ProbeOutcome, duration_millis};

/// Destination for probe metrics
pub trait MetricsSink: Send + Sync {
    fn increment_counter(&self, name: &str);

    fn record_timing(&self, name: &str, milliseconds: f64);
}

/// Emit the metric for one probe outcome
///
/// Success records a timing sample under the host's success metric; every
/// failure kind increments the same failure counter.
pub fn report_outcome(sink: &dyn MetricsSink, host: &MonitoredHost, outcome: &ProbeOutcome) {
    match outcome {
        ProbeOutcome::Success(rtt) => sink.record_timing(&host.success_metric, duration_millis(*rtt)),
        ProbeOutcome::Failure(_) => sink.increment_counter(&host.failure_metric),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FailureReason;
    use parking_lot::Mutex;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        counters: Mutex<Vec<String>>,
        timings: Mutex<Vec<(String, f64)>>,
    }

    impl MetricsSink for RecordingSink {
        fn increment_counter(&self, name: &str) {
            self.counters.lock().push(name.to_string());
        }

        fn record_timing(&self, name: &str, milliseconds: f64) {
            self.timings.lock().push((name.to_string(), milliseconds));
        }
    }

    fn host() -> MonitoredHost {
        MonitoredHost::new("10.0.0.1", "lan", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))
            .with_metrics("ok.lan.10_0_0_1", "ko.lan.10_0_0_1")
    }

    #[test]
    fn test_success_records_timing() {
        let sink = RecordingSink::default();
        report_outcome(&sink, &host(), &ProbeOutcome::Success(Duration::from_millis(120)));

        let timings = sink.timings.lock();
        assert_eq!(timings.len(), 1);
        assert_eq!(timings[0].0, "ok.lan.10_0_0_1");
        assert!((timings[0].1 - 120.0).abs() < 1e-9);
        assert!(sink.counters.lock().is_empty());
    }

    #[test]
    fn test_every_failure_increments_one_counter() {
        let sink = RecordingSink::default();
        let reasons = [
            FailureReason::Timeout,
            FailureReason::SendError("boom".into()),
            FailureReason::TransportClosed,
            FailureReason::SequenceExhausted,
        ];
        for reason in reasons {
            report_outcome(&sink, &host(), &ProbeOutcome::Failure(reason));
        }

        let counters = sink.counters.lock();
        assert_eq!(counters.len(), 4);
        assert!(counters.iter().all(|name| name == "ko.lan.10_0_0_1"));
        assert!(sink.timings.lock().is_empty());
    }
}
