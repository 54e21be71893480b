//! Packet decoding and forging.
//!
//! # Data Flow
//! ```text
//! PACKET_IN payload (raw Ethernet frame)
//!     → frame.rs (classify: ARP | IPv4 | other ether-type)
//!     → controller decides
//!     → arp.rs (forge ARP reply frame for PACKET_OUT)
//! ```
//!
//! # Design Decisions
//! - Wire parsing is delegated to smoltcp; no hand-rolled header offsets
//! - IPv4 payloads are never rewritten here; the switch applies rewrites
//!   through OpenFlow actions so the first packet and the flow rule agree

pub mod arp;
pub mod frame;

pub use arp::build_arp_reply;
pub use frame::{
    classify, parse_mac, ArpMessage, ArpOp, Frame, Ipv4Summary, PacketError, ETHERTYPE_ARP,
    ETHERTYPE_IPV4, ETHERTYPE_IPV6, IP_PROTO_ICMP,
};
