//! Flow rule derivation.
//!
//! A client/server pairing is implemented by two independent, stateless rules:
//!
//! ```text
//! client → VIP     in_port=client, dl_type=ip, nw_dst=VIP
//!                  → dl_dst:=server.mac, nw_dst:=server.ip, output:server.port
//! server → client  in_port=server.port, dl_type=ip, nw_src=server.ip, nw_dst=client.ip
//!                  → nw_src:=VIP, dl_src:=advertised, dl_dst:=client.mac, output:client
//! ```

use smoltcp::wire::EthernetAddress;
use std::net::Ipv4Addr;

use crate::config::FlowConfig;
use crate::load_balancer::ServerEndpoint;
use crate::openflow::wire::{OFPFF_SEND_FLOW_REM, OFPP_CONTROLLER, OFPP_FLOOD, OFPP_IN_PORT};
use crate::openflow::{Action, FlowMod, Match};
use crate::packet::{ETHERTYPE_ARP, ETHERTYPE_IPV4, IP_PROTO_ICMP};

/// A client as seen on the switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientEndpoint {
    pub ip: Ipv4Addr,
    pub mac: EthernetAddress,
    pub port: u16,
}

/// Priority and timeouts applied to NAT rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleSettings {
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
}

impl From<&FlowConfig> for RuleSettings {
    fn from(config: &FlowConfig) -> Self {
        Self {
            priority: config.priority,
            idle_timeout: config.idle_timeout_secs,
            hard_timeout: config.hard_timeout_secs,
        }
    }
}

/// Identifies the client→server rule in FLOW_REMOVED notifications.
///
/// Layout: client ip (32 bits) | server index (16 bits) | client port (16 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowCookie {
    pub client_ip: Ipv4Addr,
    pub server_index: u16,
    pub client_port: u16,
}

impl FlowCookie {
    pub fn encode(&self) -> u64 {
        (u64::from(u32::from(self.client_ip)) << 32)
            | (u64::from(self.server_index) << 16)
            | u64::from(self.client_port)
    }

    pub fn decode(cookie: u64) -> Self {
        Self {
            client_ip: Ipv4Addr::from((cookie >> 32) as u32),
            server_index: (cookie >> 16) as u16,
            client_port: cookie as u16,
        }
    }
}

/// Output action; a frame leaving through its ingress port needs IN_PORT.
pub fn output_to(port: u16, in_port: u16) -> Action {
    if port == in_port {
        Action::output(OFPP_IN_PORT)
    } else {
        Action::output(port)
    }
}

/// Rewrites applied to client traffic headed for the VIP.
pub fn forward_actions(server: &ServerEndpoint, client_port: u16) -> Vec<Action> {
    vec![
        Action::SetDlDst(server.mac),
        Action::SetNwDst(server.ip),
        output_to(server.port, client_port),
    ]
}

/// Rewrites applied to server replies headed back to the client.
pub fn return_actions(
    vip: Ipv4Addr,
    advertised_mac: EthernetAddress,
    client: &ClientEndpoint,
    server: &ServerEndpoint,
) -> Vec<Action> {
    vec![
        Action::SetNwSrc(vip),
        Action::SetDlSrc(advertised_mac),
        Action::SetDlDst(client.mac),
        output_to(client.port, server.port),
    ]
}

fn with_settings(mut flow_mod: FlowMod, settings: RuleSettings) -> FlowMod {
    flow_mod.idle_timeout = settings.idle_timeout;
    flow_mod.hard_timeout = settings.hard_timeout;
    flow_mod
}

/// Client→server rule. Flagged so the switch reports its removal.
pub fn client_to_server(
    vip: Ipv4Addr,
    client: &ClientEndpoint,
    server: &ServerEndpoint,
    settings: RuleSettings,
) -> FlowMod {
    let flow_match = Match {
        in_port: Some(client.port),
        dl_type: Some(ETHERTYPE_IPV4),
        nw_dst: Some(vip),
        ..Match::default()
    };
    let mut fm = with_settings(
        FlowMod::add(flow_match, settings.priority, forward_actions(server, client.port)),
        settings,
    );
    fm.cookie = FlowCookie {
        client_ip: client.ip,
        // ServerPool caps the pool at MAX_SERVERS, so the index fits.
        server_index: server.index as u16,
        client_port: client.port,
    }
    .encode();
    fm.flags = OFPFF_SEND_FLOW_REM;
    fm
}

/// Server→client rule.
pub fn server_to_client(
    vip: Ipv4Addr,
    advertised_mac: EthernetAddress,
    client: &ClientEndpoint,
    server: &ServerEndpoint,
    settings: RuleSettings,
) -> FlowMod {
    let flow_match = Match {
        in_port: Some(server.port),
        dl_type: Some(ETHERTYPE_IPV4),
        nw_src: Some(server.ip),
        nw_dst: Some(client.ip),
        ..Match::default()
    };
    with_settings(
        FlowMod::add(
            flow_match,
            settings.priority,
            return_actions(vip, advertised_mac, client, server),
        ),
        settings,
    )
}

/// Rules pushed when a switch connects, in send order.
pub fn connect_rules(vip: Ipv4Addr, config: &FlowConfig) -> Vec<FlowMod> {
    let mut rules = Vec::new();
    let flood_priority = config.default_priority.saturating_sub(1);

    if config.clear_on_connect {
        rules.push(FlowMod::delete(Match::all()));
    }

    rules.push(FlowMod::add(
        Match {
            dl_type: Some(ETHERTYPE_ARP),
            nw_dst: Some(vip),
            ..Match::default()
        },
        config.default_priority,
        vec![Action::output(OFPP_CONTROLLER)],
    ));

    if config.flood_arp {
        rules.push(FlowMod::add(
            Match {
                dl_type: Some(ETHERTYPE_ARP),
                ..Match::default()
            },
            flood_priority,
            vec![Action::output(OFPP_FLOOD)],
        ));
    }

    if config.flood_icmp {
        rules.push(FlowMod::add(
            Match {
                dl_type: Some(ETHERTYPE_IPV4),
                nw_proto: Some(IP_PROTO_ICMP),
                ..Match::default()
            },
            flood_priority,
            vec![Action::output(OFPP_FLOOD)],
        ));
    }

    rules
}
