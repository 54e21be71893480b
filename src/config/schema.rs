//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the controller.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Root configuration for the load balancer controller.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ControllerConfig {
    /// OpenFlow listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// The virtual service clients talk to.
    pub service: ServiceConfig,

    /// Backend server pool, in selection order.
    pub servers: Vec<ServerConfig>,

    /// Client pinning settings.
    pub session: SessionConfig,

    /// Flow rule programming settings.
    pub flows: FlowConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// OpenFlow listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:6633").
    pub bind_address: String,

    /// Maximum concurrent switch connections (backpressure).
    pub max_connections: usize,

    /// Largest OpenFlow message accepted from a switch, in bytes.
    pub max_message_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:6633".to_string(),
            max_connections: 16,
            max_message_bytes: 64 * 1024,
        }
    }
}

/// Virtual service definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Address clients resolve and connect to. Never assigned to a real host.
    pub virtual_ip: Ipv4Addr,

    /// Link-layer address advertised for the VIP.
    /// When unset, ARP replies carry the selected backend's own MAC.
    pub virtual_mac: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            virtual_ip: Ipv4Addr::new(10, 0, 0, 10),
            virtual_mac: None,
        }
    }
}

/// Backend server definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server identifier for logging/metrics.
    pub name: String,

    /// Server IPv4 address.
    pub ip: Ipv4Addr,

    /// Server MAC address ("00:00:00:00:00:05").
    pub mac: String,

    /// Switch port the server is attached to.
    pub port: u16,
}

/// How repeated admissions from the same client are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionPolicy {
    /// A client keeps its first server until its binding expires.
    #[default]
    Pinned,
    /// Every VIP ARP request advances the rotation.
    Rotate,
}

/// Client binding settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Admission policy.
    pub policy: SessionPolicy,

    /// Upper bound on tracked clients; the least recently seen is evicted first.
    pub max_bindings: usize,

    /// Bindings untouched for this long are dropped by the sweeper.
    pub binding_idle_secs: u64,

    /// How often the sweeper runs.
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            policy: SessionPolicy::Pinned,
            max_bindings: 4096,
            binding_idle_secs: 300,
            sweep_interval_secs: 30,
        }
    }
}

/// Flow rule settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Priority of the NAT rule pair.
    pub priority: u16,

    /// Priority of the rules installed at switch connect.
    pub default_priority: u16,

    /// Idle timeout attached to NAT rules (0 = none).
    pub idle_timeout_secs: u16,

    /// Hard timeout attached to NAT rules (0 = none).
    pub hard_timeout_secs: u16,

    /// Skip installation when the (ingress port, server) pair is already programmed.
    pub suppress_duplicates: bool,

    /// Upper bound on remembered rule pairs.
    pub max_installed: usize,

    /// Delete every flow on the switch when it connects.
    pub clear_on_connect: bool,

    /// Install a low-priority rule flooding ARP traffic.
    pub flood_arp: bool,

    /// Install a low-priority rule flooding ICMP traffic.
    pub flood_icmp: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            priority: 100,
            default_priority: 10,
            idle_timeout_secs: 30,
            hard_timeout_secs: 600,
            suppress_duplicates: true,
            max_installed: 4096,
            clear_on_connect: true,
            flood_arp: false,
            flood_icmp: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
