//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the server pool for emptiness and address collisions
//! - Validate value ranges (limits > 0, ports usable on an OpenFlow switch)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ControllerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ControllerConfig;
use crate::load_balancer::MAX_SERVERS;
use crate::openflow::wire::{OFPP_MAX, OFP_HEADER_LEN};
use crate::packet::parse_mac;

/// Smallest frame limit that still fits a full-size Ethernet packet-in.
const MIN_MESSAGE_BYTES: usize = 1518 + OFP_HEADER_LEN + 10;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check every rule and collect all violations.
pub fn validate_config(config: &ControllerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_listener(config, &mut errors);
    validate_service(config, &mut errors);
    validate_servers(config, &mut errors);
    validate_limits(config, &mut errors);
    validate_endpoints(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_listener(config: &ControllerConfig, errors: &mut Vec<ValidationError>) {
    let listener = &config.listener;
    if listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", listener.bind_address),
        ));
    }
    if listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }
    if listener.max_message_bytes < MIN_MESSAGE_BYTES {
        errors.push(ValidationError::new(
            "listener.max_message_bytes",
            format!("must be at least {}", MIN_MESSAGE_BYTES),
        ));
    }
}

fn validate_service(config: &ControllerConfig, errors: &mut Vec<ValidationError>) {
    let service = &config.service;
    if service.virtual_ip.is_unspecified() || service.virtual_ip.is_broadcast() {
        errors.push(ValidationError::new(
            "service.virtual_ip",
            format!("{} cannot be used as a service address", service.virtual_ip),
        ));
    }
    if let Some(mac) = &service.virtual_mac {
        if parse_mac(mac).is_none() {
            errors.push(ValidationError::new(
                "service.virtual_mac",
                format!("{:?} is not a MAC address", mac),
            ));
        }
    }
}

fn validate_servers(config: &ControllerConfig, errors: &mut Vec<ValidationError>) {
    if config.servers.is_empty() {
        errors.push(ValidationError::new("servers", "at least one server is required"));
        return;
    }
    if config.servers.len() > MAX_SERVERS {
        errors.push(ValidationError::new(
            "servers",
            format!("{} servers configured, at most {} are supported", config.servers.len(), MAX_SERVERS),
        ));
    }

    let mut ips = HashSet::new();
    let mut macs = HashSet::new();
    let mut ports = HashSet::new();

    for (i, server) in config.servers.iter().enumerate() {
        let field = |name: &str| format!("servers[{}].{}", i, name);

        if server.name.trim().is_empty() {
            errors.push(ValidationError::new(field("name"), "must not be empty"));
        }
        if server.ip == config.service.virtual_ip {
            errors.push(ValidationError::new(field("ip"), "must differ from the virtual IP"));
        }
        if !ips.insert(server.ip) {
            errors.push(ValidationError::new(field("ip"), format!("{} is used twice", server.ip)));
        }
        match parse_mac(&server.mac) {
            Some(mac) => {
                if !macs.insert(mac) {
                    errors.push(ValidationError::new(field("mac"), format!("{} is used twice", mac)));
                }
            }
            None => errors.push(ValidationError::new(
                field("mac"),
                format!("{:?} is not a MAC address", server.mac),
            )),
        }
        if server.port == 0 || server.port >= OFPP_MAX {
            errors.push(ValidationError::new(
                field("port"),
                format!("{} is not a physical switch port", server.port),
            ));
        } else if !ports.insert(server.port) {
            errors.push(ValidationError::new(field("port"), format!("{} is used twice", server.port)));
        }
    }
}

fn validate_limits(config: &ControllerConfig, errors: &mut Vec<ValidationError>) {
    if config.session.max_bindings == 0 {
        errors.push(ValidationError::new("session.max_bindings", "must be greater than 0"));
    }
    if config.session.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("session.sweep_interval_secs", "must be greater than 0"));
    }
    if config.flows.suppress_duplicates && config.flows.max_installed == 0 {
        errors.push(ValidationError::new("flows.max_installed", "must be greater than 0"));
    }
    if config.flows.priority <= config.flows.default_priority {
        errors.push(ValidationError::new(
            "flows.priority",
            format!(
                "must be above flows.default_priority ({})",
                config.flows.default_priority
            ),
        ));
    }
}

fn validate_endpoints(config: &ControllerConfig, errors: &mut Vec<ValidationError>) {
    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", observability.metrics_address),
        ));
    }

    let admin = &config.admin;
    if admin.enabled {
        if admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("{:?} is not a socket address", admin.bind_address),
            ));
        }
        if admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }
}
