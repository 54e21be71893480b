//! Ethernet frame classification.
//!
//! Only ARP and IPv4 frames are decoded past the link-layer header; everything
//! else is reported by ether-type so callers can drop it without guessing at
//! the payload format.

use smoltcp::wire::{
    ArpOperation, ArpPacket, ArpRepr, EthernetAddress, EthernetFrame, Ipv4Address, Ipv4Packet,
};
use std::net::Ipv4Addr;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;
pub const ETHERTYPE_IPV6: u16 = 0x86dd;

pub const IP_PROTO_ICMP: u8 = 1;

const IPV4_MIN_HEADER_LEN: usize = 20;

/// Error produced while decoding a frame delivered by the switch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("packet-in carried no frame data")]
    Empty,

    #[error("truncated ethernet frame ({0} bytes)")]
    TruncatedEthernet(usize),

    #[error("malformed ARP payload")]
    MalformedArp,

    #[error("unsupported ARP hardware/protocol combination")]
    UnsupportedArp,

    #[error("malformed IPv4 header")]
    MalformedIpv4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOp {
    Request,
    Reply,
    Other(u16),
}

impl From<ArpOperation> for ArpOp {
    fn from(op: ArpOperation) -> Self {
        match op {
            ArpOperation::Request => ArpOp::Request,
            ArpOperation::Reply => ArpOp::Reply,
            other => ArpOp::Other(u16::from(other)),
        }
    }
}

/// Decoded Ethernet/IPv4 ARP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpMessage {
    pub operation: ArpOp,
    pub sender_mac: EthernetAddress,
    pub sender_ip: Ipv4Addr,
    pub target_mac: EthernetAddress,
    pub target_ip: Ipv4Addr,
}

/// Addressing of an IPv4 frame; the payload is never inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Summary {
    pub src_mac: EthernetAddress,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub protocol: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Arp {
        eth_src: EthernetAddress,
        arp: ArpMessage,
    },
    Ipv4(Ipv4Summary),
    Other {
        ethertype: u16,
    },
}

pub(crate) fn to_std(addr: Ipv4Address) -> Ipv4Addr {
    Ipv4Addr::from(addr.0)
}

pub(crate) fn to_wire(addr: Ipv4Addr) -> Ipv4Address {
    Ipv4Address(addr.octets())
}

/// Decode the link-layer header and, for ARP and IPv4, the next header.
pub fn classify(data: &[u8]) -> Result<Frame, PacketError> {
    if data.is_empty() {
        return Err(PacketError::Empty);
    }

    let frame =
        EthernetFrame::new_checked(data).map_err(|_| PacketError::TruncatedEthernet(data.len()))?;
    let ethertype = u16::from(frame.ethertype());

    match ethertype {
        ETHERTYPE_ARP => {
            let packet =
                ArpPacket::new_checked(frame.payload()).map_err(|_| PacketError::MalformedArp)?;
            let repr = ArpRepr::parse(&packet).map_err(|_| PacketError::UnsupportedArp)?;

            #[allow(unreachable_patterns)]
            match repr {
                ArpRepr::EthernetIpv4 {
                    operation,
                    source_hardware_addr,
                    source_protocol_addr,
                    target_hardware_addr,
                    target_protocol_addr,
                } => Ok(Frame::Arp {
                    eth_src: frame.src_addr(),
                    arp: ArpMessage {
                        operation: operation.into(),
                        sender_mac: source_hardware_addr,
                        sender_ip: to_std(source_protocol_addr),
                        target_mac: target_hardware_addr,
                        target_ip: to_std(target_protocol_addr),
                    },
                }),
                _ => Err(PacketError::UnsupportedArp),
            }
        }
        ETHERTYPE_IPV4 => {
            // Packet-ins are cut at miss_send_len, so only the header is required.
            let payload = frame.payload();
            if payload.len() < IPV4_MIN_HEADER_LEN {
                return Err(PacketError::MalformedIpv4);
            }
            let packet = Ipv4Packet::new_unchecked(payload);
            let header_len = usize::from(packet.header_len());
            if packet.version() != 4 || header_len < IPV4_MIN_HEADER_LEN || header_len > payload.len() {
                return Err(PacketError::MalformedIpv4);
            }
            Ok(Frame::Ipv4(Ipv4Summary {
                src_mac: frame.src_addr(),
                src_ip: to_std(packet.src_addr()),
                dst_ip: to_std(packet.dst_addr()),
                protocol: u8::from(packet.next_header()),
            }))
        }
        other => Ok(Frame::Other { ethertype: other }),
    }
}

/// Parse "00:00:00:00:00:05" (or dash separated) into a MAC address.
pub fn parse_mac(s: &str) -> Option<EthernetAddress> {
    let mut octets = [0u8; 6];
    let mut parts = s.trim().split(|c| c == ':' || c == '-');

    for octet in octets.iter_mut() {
        let part = parts.next()?;
        if part.len() != 2 {
            return None;
        }
        *octet = u8::from_str_radix(part, 16).ok()?;
    }

    if parts.next().is_some() {
        return None;
    }
    Some(EthernetAddress(octets))
}
