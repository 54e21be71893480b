use axum::{extract::State, Json};
use serde::Serialize;
use std::net::Ipv4Addr;
use std::time::Instant;

use crate::admin::AdminState;
use crate::config::SessionPolicy;
use crate::controller::{BindingSnapshot, InstalledFlowSnapshot};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub virtual_ip: Ipv4Addr,
    pub policy: SessionPolicy,
    pub algorithm: &'static str,
    pub servers: usize,
    pub switches: usize,
    pub sessions: u64,
    pub bindings: usize,
    pub installed_flows: usize,
}

#[derive(Serialize)]
pub struct ServerStatus {
    pub index: usize,
    pub name: String,
    pub ip: Ipv4Addr,
    pub mac: String,
    pub port: u16,
    pub selections: u64,
}

#[derive(Serialize)]
pub struct FlowsStatus {
    pub suppress_duplicates: bool,
    pub flows: Vec<InstalledFlowSnapshot>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let controller = &state.controller;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        virtual_ip: controller.vip(),
        policy: controller.policy(),
        algorithm: controller.pool().algorithm(),
        servers: controller.pool().len(),
        switches: controller.connected_switches(),
        sessions: state.tracker.active_count(),
        bindings: controller.bindings().len(),
        installed_flows: controller.installed_flows().map_or(0, |f| f.len()),
    })
}

pub async fn get_servers(State(state): State<AdminState>) -> Json<Vec<ServerStatus>> {
    let statuses = state
        .controller
        .pool()
        .servers()
        .iter()
        .map(|s| ServerStatus {
            index: s.index,
            name: s.name.clone(),
            ip: s.ip,
            mac: s.mac.to_string(),
            port: s.port,
            selections: s.selections(),
        })
        .collect();
    Json(statuses)
}

pub async fn get_bindings(State(state): State<AdminState>) -> Json<Vec<BindingSnapshot>> {
    Json(state.controller.bindings().snapshot(Instant::now()))
}

pub async fn get_flows(State(state): State<AdminState>) -> Json<FlowsStatus> {
    let installed = state.controller.installed_flows();
    Json(FlowsStatus {
        suppress_duplicates: installed.is_some(),
        flows: installed.map(|f| f.snapshot(Instant::now())).unwrap_or_default(),
    })
}
