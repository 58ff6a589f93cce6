//! Send/receive wrapper around the shared ICMP socket.

use std::io;
use std::net::IpAddr;
use std::time::Instant;
use thiserror::Error;

use crate::probe::{IcmpSocket, ReplyBody, parse_reply};

/// Errors from the ICMP transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket accepted fewer bytes than the packet holds
    #[error("packet size mismatch: wrote {written} of {expected} bytes")]
    Unreachable { written: usize, expected: usize },

    /// Receive deadline elapsed
    #[error("receive deadline elapsed")]
    Timeout,

    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}

/// What an incoming datagram turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    /// Could not be parsed as ICMP
    Malformed,
    /// Echo reply belonging to this process
    EchoReply { sequence: u16 },
    /// Valid ICMP that is not ours to handle
    Ignored(ReplyBody),
}

/// The single ICMP endpoint of the process
pub struct IcmpTransport<S> {
    socket: S,
    identifier: u16,
}

impl<S: IcmpSocket> IcmpTransport<S> {
    pub fn new(socket: S, identifier: u16) -> Self {
        Self { socket, identifier }
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    /// Write one packet to `destination`
    pub fn send(&self, payload: &[u8], destination: IpAddr) -> Result<usize, TransportError> {
        let written = self.socket.send_to(payload, destination)?;
        if written != payload.len() {
            return Err(TransportError::Unreachable {
                written,
                expected: payload.len(),
            });
        }
        Ok(written)
    }

    /// Block until a datagram arrives or `deadline` passes
    pub fn receive_with_deadline(
        &self,
        buffer: &mut [u8],
        deadline: Instant,
    ) -> Result<(usize, IpAddr), TransportError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(TransportError::Timeout);
        }

        match self.socket.recv_from(buffer, remaining) {
            Ok(received) => Ok(received),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Err(TransportError::Timeout)
            }
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    /// Classify a received datagram
    ///
    /// DGRAM sockets have their identifier rewritten by the kernel, which
    /// also only delivers replies addressed to this socket, so the identifier
    /// is checked on RAW sockets only.
    pub fn classify(&self, data: &[u8]) -> Incoming {
        let is_dgram = self.socket.is_dgram();
        match parse_reply(data, is_dgram) {
            None => Incoming::Malformed,
            Some(ReplyBody::EchoReply {
                identifier,
                sequence,
            }) if is_dgram || identifier == self.identifier => Incoming::EchoReply { sequence },
            Some(body) => Incoming::Ignored(body),
        }
    }
}
