//! Typed results of packet-in handling.

use std::fmt;
use std::net::Ipv4Addr;

use crate::controller::switch::SwitchError;
use crate::packet::PacketError;

/// What the controller did with a packet-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// ARP request for the VIP answered on behalf of `server`.
    Admitted {
        client: Ipv4Addr,
        server: Ipv4Addr,
        new_binding: bool,
        rules_installed: bool,
    },
    /// A backend asked for a bound client's MAC and got it.
    ReverseArpAnswered { server: Ipv4Addr, client: Ipv4Addr },
    /// First packet of a flow pushed to its backend ahead of the rules.
    FirstPacketForwarded {
        client: Ipv4Addr,
        server: Ipv4Addr,
        rules_installed: bool,
    },
    /// Nothing sent; the packet is dropped.
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Neither ARP nor IPv4 (IPv6 lands here).
    EtherType(u16),
    /// ARP message that is not a request.
    ArpNotRequest,
    /// ARP request for an address the controller does not answer for.
    ArpNotHandled,
    /// A backend asked for the VIP.
    BackendRequestedVip,
    /// IPv4 traffic not addressed to the VIP.
    NotForVip,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::EtherType(_) => "ether_type",
            DropReason::ArpNotRequest => "arp_not_request",
            DropReason::ArpNotHandled => "arp_not_handled",
            DropReason::BackendRequestedVip => "backend_requested_vip",
            DropReason::NotForVip => "not_for_vip",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::EtherType(t) => write!(f, "unsupported ether-type {:#06x}", t),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Recoverable, per-packet failure. Never aborts the switch session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("malformed packet: {0}")]
    Malformed(#[from] PacketError),

    #[error("no binding recorded for client {client}")]
    UnknownBinding { client: Ipv4Addr },

    #[error(transparent)]
    Switch(#[from] SwitchError),
}

impl HandleError {
    pub fn kind(&self) -> &'static str {
        match self {
            HandleError::Malformed(_) => "malformed",
            HandleError::UnknownBinding { .. } => "unknown_binding",
            HandleError::Switch(_) => "switch",
        }
    }
}
