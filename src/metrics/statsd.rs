use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use thiserror::Error;

use super::MetricsSink;

/// Port used when the configured address has none
pub const DEFAULT_STATSD_PORT: u16 = 8125;

/// Errors setting up a metrics client
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("unable to connect to statsd host {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Fire-and-forget statsd client over UDP
#[derive(Debug)]
pub struct StatsdClient {
    socket: UdpSocket,
    addr: String,
}

impl StatsdClient {
    /// Connect to `host[:port]`, defaulting the port to 8125
    pub fn connect(host: &str) -> Result<Self, MetricsError> {
        let addr = with_default_port(host);
        let connect = || -> io::Result<UdpSocket> {
            let target = addr.as_str().to_socket_addrs()?.next().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "host has no addresses")
            })?;
            // Local socket must match the target's address family
            let local: SocketAddr = match target {
                SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
                SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
            };
            let socket = UdpSocket::bind(local)?;
            socket.connect(target)?;
            Ok(socket)
        };

        match connect() {
            Ok(socket) => Ok(Self { socket, addr }),
            Err(source) => Err(MetricsError::Connect { addr, source }),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn send(&self, line: &str) {
        if let Err(e) = self.socket.send(line.as_bytes()) {
            tracing::debug!(statsd_server = %self.addr, error = %e, "Unable to send metric");
        }
    }
}

impl MetricsSink for StatsdClient {
    fn increment_counter(&self, name: &str) {
        self.send(&counter_line(name));
    }

    fn record_timing(&self, name: &str, milliseconds: f64) {
        self.send(&timing_line(name, milliseconds));
    }
}

fn with_default_port(host: &str) -> String {
    // A bare IPv6 literal ends in hex digits that look like a port
    if let Ok(v6) = host.parse::<Ipv6Addr>() {
        return format!("[{}]:{}", v6, DEFAULT_STATSD_PORT);
    }

    let has_port = match host.rsplit_once(':') {
        // Bracketed IPv6 literal: "[::1]" has no port, "[::1]:9125" does
        Some((head, port)) => {
            !port.is_empty()
                && port.chars().all(|c| c.is_ascii_digit())
                && (!head.starts_with('[') || head.ends_with(']'))
        }
        None => false,
    };

    if has_port {
        host.to_string()
    } else {
        format!("{}:{}", host, DEFAULT_STATSD_PORT)
    }
}

fn counter_line(name: &str) -> String {
    format!("{}:1|c", name)
}

fn timing_line(name: &str, milliseconds: f64) -> String {
    format!("{}:{}|ms", name, milliseconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_port() {
        assert_eq!(with_default_port("localhost"), "localhost:8125");
        assert_eq!(with_default_port("10.0.0.5:9125"), "10.0.0.5:9125");
        assert_eq!(with_default_port("[::1]"), "[::1]:8125");
        assert_eq!(with_default_port("[::1]:9125"), "[::1]:9125");
        assert_eq!(with_default_port("::1"), "[::1]:8125");
        assert_eq!(with_default_port("fe80::21"), "[fe80::21]:8125");
    }

    #[test]
    fn test_lines() {
        assert_eq!(counter_line("failed.dns.8_8_8_8"), "failed.dns.8_8_8_8:1|c");
        assert_eq!(timing_line("response.dns.8_8_8_8", 12.5), "response.dns.8_8_8_8:12.5|ms");
    }

    #[test]
    fn test_client_sends_datagrams() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        server
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = server.local_addr().unwrap().port();

        let client = StatsdClient::connect(&format!("127.0.0.1:{}", port)).unwrap();
        client.increment_counter("failed.a");
        client.record_timing("response.a", 3.25);

        let mut buf = [0u8; 128];
        let n = server.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"failed.a:1|c");
        let n = server.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"response.a:3.25|ms");
    }

    #[test]
    fn test_client_sends_over_ipv6() {
        // Hosts without IPv6 loopback have nothing to verify
        let Ok(server) = UdpSocket::bind("[::1]:0") else {
            return;
        };
        server
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = server.local_addr().unwrap().port();

        let client = StatsdClient::connect(&format!("[::1]:{}", port)).unwrap();
        client.increment_counter("failed.v6");

        let mut buf = [0u8; 64];
        let n = server.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"failed.v6:1|c");
    }

    #[test]
    fn test_connect_failure() {
        let err = StatsdClient::connect("no such host.invalid").unwrap_err();
        assert!(err.to_string().contains("no such host.invalid:8125"));
    }
}
