use anyhow::{Result, anyhow};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Smallest read timeout handed to the kernel (zero means "block forever")
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Datagram socket carrying ICMP messages
///
/// The transport worker is generic over this so tests can drive it without
/// raw socket privileges.
pub trait IcmpSocket: Send + 'static {
    /// Send one ICMP message to `target`
    fn send_to(&self, packet: &[u8], target: IpAddr) -> io::Result<usize>;

    /// Wait up to `timeout` for one datagram
    ///
    /// Returns `WouldBlock` or `TimedOut` when nothing arrived in time.
    fn recv_from(&self, buffer: &mut [u8], timeout: Duration) -> io::Result<(usize, IpAddr)>;

    /// True if received datagrams start at the ICMP header (no IP header)
    fn is_dgram(&self) -> bool;
}

/// Socket with metadata about type (for DGRAM-aware parsing)
#[derive(Debug)]
pub struct SocketInfo {
    pub socket: Socket,
    /// True if SOCK_DGRAM (no IP header in received packets)
    pub is_dgram: bool,
}

/// Create a raw ICMP socket
pub fn create_raw_icmp_socket() -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
    socket.set_nonblocking(false)?;
    Ok(socket)
}

/// Create an unprivileged ICMP socket (SOCK_DGRAM)
pub fn create_dgram_icmp_socket() -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4))?;
    socket.set_nonblocking(false)?;
    Ok(socket)
}

/// Open the process-wide ICMP socket
///
/// Prefers RAW, falls back to DGRAM for unprivileged ICMP.
pub fn open_icmp_socket() -> Result<SocketInfo> {
    if let Ok(socket) = create_raw_icmp_socket() {
        let _ = socket.set_recv_buffer_size(1024 * 1024);
        return Ok(SocketInfo {
            socket,
            is_dgram: false,
        });
    }

    if let Ok(socket) = create_dgram_icmp_socket() {
        tracing::warn!("Using unprivileged ICMP sockets");
        return Ok(SocketInfo {
            socket,
            is_dgram: true,
        });
    }

    let binary_path = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "pingviz".to_string());

    Err(anyhow!(
        "Unable to listen for ICMP packets.\n\n\
         Fix options:\n\
         \u{2022} Run with sudo: sudo pingviz\n\
         \u{2022} Add capability: sudo setcap cap_net_raw+ep {}\n\
         \u{2022} Enable unprivileged ICMP: sudo sysctl -w net.ipv4.ping_group_range='0 65534'",
        binary_path
    ))
}

impl IcmpSocket for SocketInfo {
    fn send_to(&self, packet: &[u8], target: IpAddr) -> io::Result<usize> {
        let addr = SockAddr::from(SocketAddr::new(target, 0));
        self.socket.send_to(packet, &addr)
    }

    fn recv_from(&self, buffer: &mut [u8], timeout: Duration) -> io::Result<(usize, IpAddr)> {
        self.socket
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;

        // SAFETY: recv_from only writes initialized bytes into the buffer and
        // a `u8` slice is a valid `MaybeUninit<u8>` slice of the same length.
        let uninit = unsafe {
            &mut *(buffer as *mut [u8] as *mut [MaybeUninit<u8>])
        };
        let (len, addr) = self.socket.recv_from(uninit)?;

        let source = addr
            .as_socket()
            .map(|s| s.ip())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "non-IP source address"))?;
        Ok((len, source))
    }

    fn is_dgram(&self) -> bool {
        self.is_dgram
    }
}
