//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define controller metrics (packet-ins, ARP replies, flow installs, drops)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track switch connections and binding table size
//!
//! # Metrics
//! - `lb_packet_in_total` (counter): packet-ins by classification kind
//! - `lb_arp_replies_total` (counter): forged ARP replies, `vip` or `reverse`
//! - `lb_flow_installs_total` (counter): FLOW_MODs sent, by direction
//! - `lb_packets_dropped_total` (counter): dropped packet-ins by reason
//! - `lb_switch_connections` (gauge): connected switches
//! - `lb_bindings` (gauge): client bindings held
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests never set one up
//! - Label values are static strings to keep cardinality fixed

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_packet_in(kind: &'static str) {
    metrics::counter!("lb_packet_in_total", "kind" => kind).increment(1);
}

pub fn record_arp_reply(kind: &'static str) {
    metrics::counter!("lb_arp_replies_total", "kind" => kind).increment(1);
}

pub fn record_flow_install(direction: &'static str) {
    metrics::counter!("lb_flow_installs_total", "direction" => direction).increment(1);
}

pub fn record_drop(reason: &'static str) {
    metrics::counter!("lb_packets_dropped_total", "reason" => reason).increment(1);
}

pub fn record_switch_connected() {
    metrics::gauge!("lb_switch_connections").increment(1.0);
}

pub fn record_switch_disconnected() {
    metrics::gauge!("lb_switch_connections").decrement(1.0);
}

pub fn record_bindings(count: usize) {
    metrics::gauge!("lb_bindings").set(count as f64);
}
