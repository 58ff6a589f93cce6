use pnet::packet::MutablePacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpPacket, IcmpTypes, checksum};
use pnet::packet::ipv4::Ipv4Packet;

/// ICMP header size (fixed)
pub const ICMP_HEADER_SIZE: usize = 8;
/// Payload carried by every echo request
pub const PROBE_PAYLOAD: &[u8] = b"pingviz";

const IPPROTO_ICMP: u8 = 1;

/// Get process identifier for ICMP identification field
pub fn get_identifier() -> u16 {
    (std::process::id() & 0xffff) as u16
}

/// Body of a parsed ICMP message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyBody {
    EchoReply { identifier: u16, sequence: u16 },
    /// Anything else, carrying the ICMP type
    Other(u8),
}

/// Build an ICMPv4 Echo Request packet
///
/// Returns None if the payload does not fit an IPv4 datagram.
pub fn build_echo_request(identifier: u16, sequence: u16, payload: &[u8]) -> Option<Vec<u8>> {
    let packet_size = ICMP_HEADER_SIZE + payload.len();
    if packet_size > u16::MAX as usize {
        return None;
    }
    let mut buffer = vec![0u8; packet_size];

    {
        let mut packet = MutableEchoRequestPacket::new(&mut buffer)?;
        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_icmp_code(IcmpCode::new(0));
        packet.set_identifier(identifier);
        packet.set_sequence_number(sequence);
        packet.payload_mut().copy_from_slice(payload);
    }

    let cksum = checksum(&IcmpPacket::new(&buffer)?);
    MutableEchoRequestPacket::new(&mut buffer)?.set_checksum(cksum);

    Some(buffer)
}

/// True if the stored checksum matches the message contents
fn checksum_valid(packet: &IcmpPacket) -> bool {
    checksum(packet) == packet.get_checksum()
}

/// Parse a received datagram as an ICMP message
///
/// When `is_dgram` is true the data starts directly at the ICMP header, as
/// delivered by unprivileged ICMP sockets. Raw sockets prepend the IPv4 header.
///
/// Returns None if the packet is malformed or its checksum is invalid.
pub fn parse_reply(data: &[u8], is_dgram: bool) -> Option<ReplyBody> {
    let icmp_data = if is_dgram { data } else { strip_ipv4_header(data)? };

    if icmp_data.len() < ICMP_HEADER_SIZE {
        return None;
    }
    let icmp_packet = IcmpPacket::new(icmp_data)?;

    if !checksum_valid(&icmp_packet) {
        return None;
    }

    match icmp_packet.get_icmp_type() {
        IcmpTypes::EchoReply => Some(ReplyBody::EchoReply {
            identifier: u16::from_be_bytes([icmp_data[4], icmp_data[5]]),
            sequence: u16::from_be_bytes([icmp_data[6], icmp_data[7]]),
        }),
        other => Some(ReplyBody::Other(other.0)),
    }
}

fn strip_ipv4_header(data: &[u8]) -> Option<&[u8]> {
    let ip_packet = Ipv4Packet::new(data)?;
    if ip_packet.get_version() != 4 || ip_packet.get_next_level_protocol().0 != IPPROTO_ICMP {
        return None;
    }
    let ip_header_len = (ip_packet.get_header_length() as usize) * 4;
    if ip_header_len < 20 || data.len() < ip_header_len {
        return None;
    }
    Some(&data[ip_header_len..])
}
