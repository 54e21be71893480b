//! Backend server endpoint.
//!
//! # Responsibilities
//! - Represent a single backend server behind the VIP
//! - Carry the switch port it is attached to
//! - Count how often it has been selected

use smoltcp::wire::EthernetAddress;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};

/// A single backend server.
#[derive(Debug)]
pub struct ServerEndpoint {
    /// Position in the pool.
    pub index: usize,
    /// Name from configuration, used in logs.
    pub name: String,
    /// Address translated traffic is rewritten to.
    pub ip: Ipv4Addr,
    /// Link-layer address of the server.
    pub mac: EthernetAddress,
    /// Switch port the server hangs off.
    pub port: u16,
    /// Number of times the selector handed this server out.
    selections: AtomicU64,
}

impl ServerEndpoint {
    /// Create a new server endpoint.
    pub fn new(index: usize, name: impl Into<String>, ip: Ipv4Addr, mac: EthernetAddress, port: u16) -> Self {
        Self {
            index,
            name: name.into(),
            ip,
            mac,
            port,
            selections: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_selection(&self) {
        self.selections.fetch_add(1, Ordering::Relaxed);
    }

    /// How many admissions picked this server.
    pub fn selections(&self) -> u64 {
        self.selections.load(Ordering::Relaxed)
    }
}

impl std::fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({}@{} port {})", self.name, self.ip, self.mac, self.port)
    }
}
