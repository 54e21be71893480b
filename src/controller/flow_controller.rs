//! Packet-in classification, ARP forging and rule installation.

use smoltcp::wire::EthernetAddress;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{ControllerConfig, FlowConfig, SessionPolicy};
use crate::controller::bindings::{BindingTable, InstalledFlowKey, InstalledFlows};
use crate::controller::outcome::{DropReason, HandleError, Outcome};
use crate::controller::rules::{
    self, client_to_server, connect_rules, server_to_client, ClientEndpoint, FlowCookie,
    RuleSettings,
};
use crate::controller::switch::{Switch, SwitchError};
use crate::load_balancer::{PoolError, ServerEndpoint, ServerPool};
use crate::observability::metrics;
use crate::openflow::{FlowRemoved, FlowRemovedReason, PacketIn, PacketOut};
use crate::packet::{build_arp_reply, classify, parse_mac, ArpMessage, ArpOp, Frame, Ipv4Summary};

/// Error building a controller from configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("invalid virtual MAC address {0:?}")]
    InvalidVirtualMac(String),
}

/// Entries removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub bindings: usize,
    pub flows: usize,
}

/// The load balancer's control logic. Shared by every switch session.
#[derive(Debug)]
pub struct FlowController {
    vip: Ipv4Addr,
    virtual_mac: Option<EthernetAddress>,
    policy: SessionPolicy,
    pool: ServerPool,
    bindings: BindingTable,
    /// `None` when duplicate suppression is off.
    installed: Option<InstalledFlows>,
    rule_settings: RuleSettings,
    flows: FlowConfig,
    switches: AtomicUsize,
}

impl FlowController {
    /// Build the pool and tables. Fails before any switch can connect if the
    /// pool is empty or inconsistent.
    pub fn new(config: &ControllerConfig) -> Result<Self, ControllerError> {
        let pool = ServerPool::from_config(&config.servers)?;
        let virtual_mac = match &config.service.virtual_mac {
            Some(raw) => Some(parse_mac(raw).ok_or_else(|| ControllerError::InvalidVirtualMac(raw.clone()))?),
            None => None,
        };

        let installed = config.flows.suppress_duplicates.then(|| {
            InstalledFlows::new(config.flows.max_installed, installed_ttl(&config.flows))
        });

        tracing::info!(
            vip = %config.service.virtual_ip,
            servers = pool.len(),
            policy = ?config.session.policy,
            virtual_mac = ?virtual_mac.map(|m| m.to_string()),
            "Flow controller ready"
        );

        Ok(Self {
            vip: config.service.virtual_ip,
            virtual_mac,
            policy: config.session.policy,
            pool,
            bindings: BindingTable::new(
                config.session.max_bindings,
                Duration::from_secs(config.session.binding_idle_secs),
            ),
            installed,
            rule_settings: RuleSettings::from(&config.flows),
            flows: config.flows.clone(),
            switches: AtomicUsize::new(0),
        })
    }

    /// Push the connect-time rules to a freshly handshaken switch.
    pub fn on_switch_connected(&self, switch: &dyn Switch) -> Result<(), SwitchError> {
        self.switches.fetch_add(1, Ordering::Relaxed);
        metrics::record_switch_connected();

        // The switch's table is unknown; anything recorded is stale.
        if let Some(installed) = &self.installed {
            installed.clear();
        }

        let rules = connect_rules(self.vip, &self.flows);
        let count = rules.len();
        for rule in rules {
            switch.install_flow(rule)?;
        }

        tracing::info!(
            dpid = %format!("{:016x}", switch.datapath_id()),
            rules = count,
            "Switch connected, default rules installed"
        );
        Ok(())
    }

    pub fn on_switch_disconnected(&self, datapath_id: u64) {
        self.switches.fetch_sub(1, Ordering::Relaxed);
        metrics::record_switch_disconnected();
        if let Some(installed) = &self.installed {
            installed.clear();
        }
        tracing::info!(dpid = %format!("{:016x}", datapath_id), "Switch disconnected");
    }

    /// Classify one packet-in and act on it.
    pub fn on_packet_in(&self, switch: &dyn Switch, packet_in: &PacketIn) -> Result<Outcome, HandleError> {
        self.on_packet_in_at(switch, packet_in, Instant::now())
    }

    pub fn on_packet_in_at(
        &self,
        switch: &dyn Switch,
        packet_in: &PacketIn,
        now: Instant,
    ) -> Result<Outcome, HandleError> {
        let frame = match classify(&packet_in.data) {
            Ok(frame) => frame,
            Err(e) => {
                metrics::record_packet_in("malformed");
                metrics::record_drop("malformed");
                tracing::warn!(in_port = packet_in.in_port, error = %e, "Dropping malformed packet");
                return Err(e.into());
            }
        };

        match frame {
            Frame::Arp { arp, .. } => {
                metrics::record_packet_in("arp");
                self.handle_arp(switch, packet_in, &arp, now)
            }
            Frame::Ipv4(summary) => {
                metrics::record_packet_in("ipv4");
                self.handle_ipv4(switch, packet_in, &summary, now)
            }
            Frame::Other { ethertype } => {
                metrics::record_packet_in("other");
                Ok(self.dropped(DropReason::EtherType(ethertype), packet_in.in_port))
            }
        }
    }

    /// Forget the pair behind a removed client→server rule.
    ///
    /// An idle timeout or an explicit delete ends the session and unbinds the
    /// client. A hard timeout only retires the rules; the client keeps its
    /// server and the next packet reinstalls the pair.
    pub fn on_flow_removed(&self, removed: &FlowRemoved) {
        self.on_flow_removed_at(removed, Instant::now())
    }

    pub fn on_flow_removed_at(&self, removed: &FlowRemoved, now: Instant) {
        if removed.cookie == 0 {
            return;
        }
        let cookie = FlowCookie::decode(removed.cookie);
        let Some(server) = self.pool.get(cookie.server_index as usize) else {
            tracing::debug!(cookie = removed.cookie, "Flow removed with unknown server index");
            return;
        };

        if let Some(installed) = &self.installed {
            installed.release(&InstalledFlowKey {
                in_port: cookie.client_port,
                server: server.ip,
            });
        }
        let unbound = match removed.reason {
            FlowRemovedReason::IdleTimeout | FlowRemovedReason::Delete => {
                self.bindings.remove_if_server(cookie.client_ip, server.index)
            }
            FlowRemovedReason::HardTimeout | FlowRemovedReason::Other(_) => {
                // The rules were carrying traffic until now.
                self.bindings.touch(cookie.client_ip, now);
                false
            }
        };
        metrics::record_bindings(self.bindings.len());

        tracing::debug!(
            client = %cookie.client_ip,
            server = %server.name,
            in_port = cookie.client_port,
            reason = ?removed.reason,
            unbound,
            "Flow removed by switch"
        );
    }

    /// Evict installed keys whose rules have expired, then idle bindings.
    ///
    /// A binding whose rule pair is still installed is kept: traffic matched
    /// by the switch never reaches the controller to refresh it.
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> SweepReport {
        let flows = self.installed.as_ref().map_or(0, |i| i.sweep_at(now));
        let live = self
            .installed
            .as_ref()
            .map(|i| i.live_clients())
            .unwrap_or_default();
        let report = SweepReport {
            bindings: self.bindings.sweep_at(now, |b| live.contains(&b.client.ip)),
            flows,
        };
        metrics::record_bindings(self.bindings.len());
        if report != SweepReport::default() {
            tracing::debug!(bindings = report.bindings, flows = report.flows, "Swept expired entries");
        }
        report
    }

    fn handle_arp(
        &self,
        switch: &dyn Switch,
        packet_in: &PacketIn,
        arp: &ArpMessage,
        now: Instant,
    ) -> Result<Outcome, HandleError> {
        if arp.operation != ArpOp::Request {
            return Ok(self.dropped(DropReason::ArpNotRequest, packet_in.in_port));
        }

        if let Some(server) = self.pool.by_ip(arp.sender_ip) {
            if arp.target_ip == self.vip {
                return Ok(self.dropped(DropReason::BackendRequestedVip, packet_in.in_port));
            }
            return self.answer_reverse_arp(switch, packet_in, arp, server, now);
        }

        if arp.target_ip == self.vip && !arp.sender_ip.is_unspecified() {
            return self.admit(switch, packet_in, arp, now);
        }

        Ok(self.dropped(DropReason::ArpNotHandled, packet_in.in_port))
    }

    fn admit(
        &self,
        switch: &dyn Switch,
        packet_in: &PacketIn,
        arp: &ArpMessage,
        now: Instant,
    ) -> Result<Outcome, HandleError> {
        let client = ClientEndpoint {
            ip: arp.sender_ip,
            mac: arp.sender_mac,
            port: packet_in.in_port,
        };

        let (server, new_binding) = match self.policy {
            SessionPolicy::Pinned => self.bindings.bind_or_get(client, now, || self.pool.next()),
            SessionPolicy::Rotate => {
                let server = self.pool.next();
                let previous = self.bindings.rebind(client, server.clone(), now);
                (server, previous.is_none())
            }
        };
        metrics::record_bindings(self.bindings.len());

        let reply = build_arp_reply(self.advertised_mac(&server), self.vip, arp.sender_mac, arp.sender_ip);
        switch.send_packet_out(reply_out(packet_in.in_port, reply))?;
        release_buffer(switch, packet_in)?;
        metrics::record_arp_reply("vip");

        let rules_installed = self.install_pair(switch, &client, &server, now)?;

        tracing::info!(
            client = %client.ip,
            server = %server.name,
            in_port = client.port,
            new_binding,
            rules_installed,
            "Admitted client"
        );

        Ok(Outcome::Admitted {
            client: client.ip,
            server: server.ip,
            new_binding,
            rules_installed,
        })
    }

    fn answer_reverse_arp(
        &self,
        switch: &dyn Switch,
        packet_in: &PacketIn,
        arp: &ArpMessage,
        server: &ServerEndpoint,
        now: Instant,
    ) -> Result<Outcome, HandleError> {
        let Some(binding) = self.bindings.get(arp.target_ip) else {
            metrics::record_drop("unknown_binding");
            tracing::debug!(server = %server.name, client = %arp.target_ip, "Reverse ARP for unbound client");
            return Err(HandleError::UnknownBinding { client: arp.target_ip });
        };

        let reply = build_arp_reply(binding.client.mac, arp.target_ip, arp.sender_mac, arp.sender_ip);
        switch.send_packet_out(reply_out(packet_in.in_port, reply))?;
        release_buffer(switch, packet_in)?;
        metrics::record_arp_reply("reverse");
        // A backend resolving the client means the session is in use.
        self.bindings.touch(arp.target_ip, now);

        tracing::debug!(server = %server.name, client = %arp.target_ip, "Answered reverse ARP");
        Ok(Outcome::ReverseArpAnswered {
            server: server.ip,
            client: arp.target_ip,
        })
    }

    fn handle_ipv4(
        &self,
        switch: &dyn Switch,
        packet_in: &PacketIn,
        summary: &Ipv4Summary,
        now: Instant,
    ) -> Result<Outcome, HandleError> {
        if summary.dst_ip != self.vip {
            return Ok(self.dropped(DropReason::NotForVip, packet_in.in_port));
        }

        let client = ClientEndpoint {
            ip: summary.src_ip,
            mac: summary.src_mac,
            port: packet_in.in_port,
        };
        let (server, _) = self.bindings.bind_or_get(client, now, || self.pool.next());
        metrics::record_bindings(self.bindings.len());

        let rules_installed = self.install_pair(switch, &client, &server, now)?;

        let data = if packet_in.buffer_id.is_some() {
            Vec::new()
        } else {
            packet_in.data.clone()
        };
        switch.send_packet_out(PacketOut {
            buffer_id: packet_in.buffer_id,
            in_port: packet_in.in_port,
            actions: rules::forward_actions(&server, packet_in.in_port),
            data,
        })?;

        tracing::debug!(
            client = %client.ip,
            server = %server.name,
            in_port = client.port,
            protocol = summary.protocol,
            rules_installed,
            "Forwarded first packet"
        );

        Ok(Outcome::FirstPacketForwarded {
            client: client.ip,
            server: server.ip,
            rules_installed,
        })
    }

    /// Send both NAT rules unless the pair is already recorded.
    fn install_pair(
        &self,
        switch: &dyn Switch,
        client: &ClientEndpoint,
        server: &ServerEndpoint,
        now: Instant,
    ) -> Result<bool, SwitchError> {
        let key = InstalledFlowKey {
            in_port: client.port,
            server: server.ip,
        };
        if let Some(installed) = &self.installed {
            if !installed.claim(key, client.ip, now) {
                return Ok(false);
            }
        }

        let result = switch
            .install_flow(client_to_server(self.vip, client, server, self.rule_settings))
            .and_then(|()| {
                metrics::record_flow_install("client_to_server");
                switch.install_flow(server_to_client(
                    self.vip,
                    self.advertised_mac(server),
                    client,
                    server,
                    self.rule_settings,
                ))
            });

        match result {
            Ok(()) => {
                metrics::record_flow_install("server_to_client");
                Ok(true)
            }
            Err(e) => {
                if let Some(installed) = &self.installed {
                    installed.release(&key);
                }
                Err(e)
            }
        }
    }

    fn dropped(&self, reason: DropReason, in_port: u16) -> Outcome {
        metrics::record_drop(reason.as_str());
        tracing::debug!(in_port, reason = %reason, "Dropping packet");
        Outcome::Dropped(reason)
    }

    /// MAC the VIP resolves to when `server` is chosen.
    pub fn advertised_mac(&self, server: &ServerEndpoint) -> EthernetAddress {
        self.virtual_mac.unwrap_or(server.mac)
    }

    pub fn vip(&self) -> Ipv4Addr {
        self.vip
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    pub fn pool(&self) -> &ServerPool {
        &self.pool
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn installed_flows(&self) -> Option<&InstalledFlows> {
        self.installed.as_ref()
    }

    pub fn connected_switches(&self) -> usize {
        self.switches.load(Ordering::Relaxed)
    }
}

/// Installed-key lifetime mirrors the rule timeout the switch enforces.
fn installed_ttl(flows: &FlowConfig) -> Option<Duration> {
    match (flows.hard_timeout_secs, flows.idle_timeout_secs) {
        (0, 0) => None,
        (0, idle) => Some(Duration::from_secs(u64::from(idle))),
        (hard, _) => Some(Duration::from_secs(u64::from(hard))),
    }
}

/// Unicast a forged frame back out the port the request came in on.
fn reply_out(in_port: u16, frame: Vec<u8>) -> PacketOut {
    PacketOut {
        buffer_id: None,
        in_port,
        actions: vec![rules::output_to(in_port, in_port)],
        data: frame,
    }
}

/// Discard the request the switch buffered; the reply above replaces it.
fn release_buffer(switch: &dyn Switch, packet_in: &PacketIn) -> Result<(), SwitchError> {
    if let Some(buffer_id) = packet_in.buffer_id {
        switch.send_packet_out(PacketOut {
            buffer_id: Some(buffer_id),
            in_port: packet_in.in_port,
            actions: Vec::new(),
            data: Vec::new(),
        })?;
    }
    Ok(())
}

/// Shared handle used by sessions, the sweeper and the admin API.
pub type SharedController = Arc<FlowController>;
