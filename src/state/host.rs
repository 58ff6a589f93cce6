use std::net::IpAddr;
use std::time::Duration;

/// A host probed on a fixed interval
///
/// Built once at startup from configuration and owned by its dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredHost {
    /// Host as written in the config file
    pub name: String,
    /// Config group the host belongs to
    pub group: String,
    /// Resolved address replies must come from
    pub address: IpAddr,
    /// Maximum wait for a reply
    pub ttl: Duration,
    /// Pause between probes
    pub interval: Duration,
    pub success_metric: String,
    pub failure_metric: String,
}

impl MonitoredHost {
    pub fn new(name: impl Into<String>, group: impl Into<String>, address: IpAddr) -> Self {
        let name = name.into();
        let group = group.into();
        Self {
            success_metric: format!("response.{}.{}", group, name),
            failure_metric: format!("failed.{}.{}", group, name),
            name,
            group,
            address,
            ttl: Duration::from_secs(1),
            interval: Duration::from_secs(2),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_metrics(mut self, success: impl Into<String>, failure: impl Into<String>) -> Self {
        self.success_metric = success.into();
        self.failure_metric = failure.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_host_defaults() {
        let host = MonitoredHost::new("10.0.0.1", "core", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(host.ttl, Duration::from_secs(1));
        assert_eq!(host.interval, Duration::from_secs(2));
        assert_eq!(host.success_metric, "response.core.10.0.0.1");
        assert_eq!(host.failure_metric, "failed.core.10.0.0.1");
    }

    #[test]
    fn test_host_builders() {
        let host = MonitoredHost::new("a", "g", IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_ttl(Duration::from_millis(300))
            .with_interval(Duration::from_secs(5))
            .with_metrics("ok", "ko");
        assert_eq!(host.ttl, Duration::from_millis(300));
        assert_eq!(host.interval, Duration::from_secs(5));
        assert_eq!(host.success_metric, "ok");
        assert_eq!(host.failure_metric, "ko");
    }
}
