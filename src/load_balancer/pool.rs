//! Server pool management.
//!
//! # Responsibilities
//! - Build the fixed, ordered pool from configuration
//! - Reject empty pools and address collisions up front
//! - Apply the load balancing algorithm to select servers

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::load_balancer::{round_robin::RoundRobin, server::ServerEndpoint, LoadBalancer};
use crate::packet::parse_mac;

/// Largest pool whose indices fit the 16-bit server field of a flow cookie.
pub const MAX_SERVERS: usize = u16::MAX as usize + 1;

/// Error building a server pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("server pool is empty")]
    Empty,

    #[error("server pool has {0} servers, at most {max} are supported", max = MAX_SERVERS)]
    TooLarge(usize),

    #[error("server {server}: invalid MAC address {value:?}")]
    InvalidMac { server: String, value: String },

    #[error("server {server}: address {ip} is already used by another server")]
    DuplicateIp { server: String, ip: Ipv4Addr },

    #[error("server {server}: switch port {port} is already used by another server")]
    DuplicatePort { server: String, port: u16 },
}

/// Ordered, immutable set of backends plus the rotation state.
#[derive(Debug)]
pub struct ServerPool {
    servers: Vec<Arc<ServerEndpoint>>,
    len: NonZeroUsize,
    balancer: Box<dyn LoadBalancer>,
}

impl ServerPool {
    /// Create a round-robin pool from configuration.
    pub fn from_config(configs: &[ServerConfig]) -> Result<Self, PoolError> {
        let mut servers = Vec::with_capacity(configs.len());
        let mut ips = HashSet::new();
        let mut ports = HashSet::new();

        for (index, config) in configs.iter().enumerate() {
            let mac = parse_mac(&config.mac).ok_or_else(|| PoolError::InvalidMac {
                server: config.name.clone(),
                value: config.mac.clone(),
            })?;
            if !ips.insert(config.ip) {
                return Err(PoolError::DuplicateIp {
                    server: config.name.clone(),
                    ip: config.ip,
                });
            }
            if !ports.insert(config.port) {
                return Err(PoolError::DuplicatePort {
                    server: config.name.clone(),
                    port: config.port,
                });
            }
            servers.push(ServerEndpoint::new(index, config.name.clone(), config.ip, mac, config.port));
        }

        Self::new(servers, Box::new(RoundRobin::new()))
    }

    /// Create a pool from already-built endpoints.
    pub fn new(servers: Vec<ServerEndpoint>, balancer: Box<dyn LoadBalancer>) -> Result<Self, PoolError> {
        let len = NonZeroUsize::new(servers.len()).ok_or(PoolError::Empty)?;
        if len.get() > MAX_SERVERS {
            return Err(PoolError::TooLarge(len.get()));
        }
        tracing::debug!(servers = len.get(), algorithm = balancer.name(), "Server pool built");
        Ok(Self {
            servers: servers.into_iter().map(Arc::new).collect(),
            len,
            balancer,
        })
    }

    /// Select the next server in rotation.
    pub fn next(&self) -> Arc<ServerEndpoint> {
        let index = self.balancer.next_index(self.len);
        let server = self.servers[index].clone();
        server.record_selection();
        server
    }

    /// Look a server up by its address.
    pub fn by_ip(&self, ip: Ipv4Addr) -> Option<&Arc<ServerEndpoint>> {
        self.servers.iter().find(|s| s.ip == ip)
    }

    /// Look a server up by its position.
    pub fn get(&self, index: usize) -> Option<&Arc<ServerEndpoint>> {
        self.servers.get(index)
    }

    /// Return all servers in pool order.
    pub fn servers(&self) -> &[Arc<ServerEndpoint>] {
        &self.servers
    }

    pub fn len(&self) -> usize {
        self.len.get()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn algorithm(&self) -> &'static str {
        self.balancer.name()
    }
}
