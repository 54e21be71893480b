//! End-to-end behaviour of the flow controller against a recording switch.

use std::net::Ipv4Addr;

use ofp_balancer::config::{ControllerConfig, SessionPolicy};
use ofp_balancer::controller::{ControllerError, DropReason, FlowController, HandleError, Outcome};
use ofp_balancer::load_balancer::PoolError;
use ofp_balancer::openflow::wire::{OFPP_CONTROLLER, OFPP_IN_PORT};
use ofp_balancer::openflow::{
    Action, FlowMod, FlowModCommand, FlowRemoved, FlowRemovedReason, Match,
};
use ofp_balancer::packet::PacketError;
use smoltcp::wire::{ArpOperation, EthernetAddress, IpProtocol};

mod common;

use common::*;

fn client_ip(n: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, n)
}

fn client_mac(n: u8) -> EthernetAddress {
    EthernetAddress([0x02, 0, 0, 0, 0, n])
}

/// Admit client `n` on switch port `n` and return the server address it got.
fn admit(controller: &FlowController, switch: &RecordingSwitch, n: u8) -> Ipv4Addr {
    let frame = arp_request(client_mac(n), client_ip(n), VIP);
    match controller.on_packet_in(switch, &packet_in(n as u16, frame)).unwrap() {
        Outcome::Admitted { server, .. } => server,
        other => panic!("expected admission, got {:?}", other),
    }
}

fn forward_rules(flow_mods: &[FlowMod]) -> Vec<&FlowMod> {
    flow_mods
        .iter()
        .filter(|fm| fm.flow_match.nw_dst == Some(VIP))
        .collect()
}

#[test]
fn test_round_robin_fairness() {
    let mut config = two_server_config(SessionPolicy::Pinned);
    config.servers.push(server_config("s3", 7));
    let controller = FlowController::new(&config).unwrap();
    let switch = RecordingSwitch::new();

    let picked: Vec<_> = (1..=6).map(|n| admit(&controller, &switch, n)).collect();
    assert_eq!(picked, vec![ip(5), ip(6), ip(7), ip(5), ip(6), ip(7)]);
    assert!(controller.pool().servers().iter().all(|s| s.selections() == 2));
}

#[test]
fn test_arp_reply_correctness() {
    let controller = FlowController::new(&two_server_config(SessionPolicy::Pinned)).unwrap();
    let switch = RecordingSwitch::new();

    let requester = client_mac(1);
    controller
        .on_packet_in(&switch, &packet_in(1, arp_request(requester, client_ip(1), VIP)))
        .unwrap();

    let outs = switch.packet_outs();
    assert_eq!(outs.len(), 1);
    assert_eq!(outs[0].in_port, 1);
    assert_eq!(outs[0].buffer_id, None);
    assert_eq!(outs[0].actions, vec![Action::output(OFPP_IN_PORT)]);

    let arp = decode_arp(&outs[0].data);
    assert_eq!(arp.operation, ArpOperation::Reply);
    assert_eq!(arp.sender_ip, VIP);
    assert_eq!(arp.sender_mac, mac(5));
    assert_eq!(arp.target_ip, client_ip(1));
    assert_eq!(arp.target_mac, requester);
    assert_eq!(arp.eth_src, mac(5));
    assert_eq!(arp.eth_dst, requester);
}

#[test]
fn test_rule_pair_symmetry() {
    let controller = FlowController::new(&two_server_config(SessionPolicy::Pinned)).unwrap();
    let switch = RecordingSwitch::new();
    for n in 1..=4 {
        admit(&controller, &switch, n);
    }

    let flow_mods = switch.flow_mods();
    let forward = forward_rules(&flow_mods);
    assert_eq!(forward.len(), 4);

    for rule in forward {
        let client_port = rule.flow_match.in_port.unwrap();
        let server_ip = rule
            .actions
            .iter()
            .find_map(|a| match a {
                Action::SetNwDst(ip) => Some(*ip),
                _ => None,
            })
            .unwrap();
        let server_port = server_ip.octets()[3] as u16;

        let reverse = flow_mods
            .iter()
            .find(|fm| {
                fm.flow_match.in_port == Some(server_port)
                    && fm.flow_match.nw_src == Some(server_ip)
                    && fm.flow_match.nw_dst == Some(client_ip(client_port as u8))
            })
            .expect("matching return rule");
        assert!(reverse.actions.contains(&Action::SetNwSrc(VIP)));
        assert!(reverse.actions.contains(&Action::SetDlDst(client_mac(client_port as u8))));
        assert_eq!(reverse.actions.last(), Some(&Action::output(client_port)));
        assert_eq!(reverse.priority, rule.priority);
    }
}

#[test]
fn test_two_server_scenario_pinned() {
    let controller = FlowController::new(&two_server_config(SessionPolicy::Pinned)).unwrap();
    let switch = RecordingSwitch::new();

    assert_eq!(admit(&controller, &switch, 1), ip(5));
    let flow_mods = switch.flow_mods();
    assert_eq!(flow_mods.len(), 2);
    assert_eq!(flow_mods[0].flow_match.in_port, Some(1));
    assert_eq!(flow_mods[0].actions.last(), Some(&Action::output(5)));
    assert_eq!(flow_mods[1].flow_match.in_port, Some(5));
    assert_eq!(flow_mods[1].flow_match.nw_dst, Some(client_ip(1)));

    assert_eq!(admit(&controller, &switch, 2), ip(6));
    assert_eq!(decode_arp(&switch.packet_outs()[1].data).sender_mac, mac(6));

    // Pinned: C1 keeps S1 and no rules are re-sent.
    switch.clear();
    let outcome = controller
        .on_packet_in(&switch, &packet_in(1, arp_request(client_mac(1), client_ip(1), VIP)))
        .unwrap();
    assert_eq!(
        outcome,
        Outcome::Admitted {
            client: client_ip(1),
            server: ip(5),
            new_binding: false,
            rules_installed: false,
        }
    );
    assert_eq!(decode_arp(&switch.packet_outs()[0].data).sender_mac, mac(5));
    assert!(switch.flow_mods().is_empty());
}

#[test]
fn test_rotate_policy_reselects() {
    let controller = FlowController::new(&two_server_config(SessionPolicy::Rotate)).unwrap();
    let switch = RecordingSwitch::new();

    assert_eq!(admit(&controller, &switch, 1), ip(5));
    assert_eq!(admit(&controller, &switch, 1), ip(6));
    assert_eq!(controller.bindings().get(client_ip(1)).map(|b| b.server.ip), Some(ip(6)));

    // Both pairs went out: the port now points at S2.
    let forward = forward_rules(&switch.flow_mods())
        .into_iter()
        .map(|fm| fm.actions.last().cloned())
        .collect::<Vec<_>>();
    assert_eq!(forward, vec![Some(Action::output(5)), Some(Action::output(6))]);
}

#[test]
fn test_ipv6_and_unknown_ethertypes_are_ignored() {
    let controller = FlowController::new(&two_server_config(SessionPolicy::Pinned)).unwrap();
    let switch = RecordingSwitch::new();

    let outcome = controller
        .on_packet_in(&switch, &packet_in(1, ipv6_frame(client_mac(1))))
        .unwrap();
    assert_eq!(outcome, Outcome::Dropped(DropReason::EtherType(0x86dd)));

    let mut lldp = ipv6_frame(client_mac(1));
    lldp[12..14].copy_from_slice(&0x88ccu16.to_be_bytes());
    let outcome = controller.on_packet_in(&switch, &packet_in(1, lldp)).unwrap();
    assert_eq!(outcome, Outcome::Dropped(DropReason::EtherType(0x88cc)));

    assert!(switch.packet_outs().is_empty());
    assert!(switch.flow_mods().is_empty());
    assert_eq!(controller.pool().servers()[0].selections(), 0);
}

#[test]
fn test_empty_pool_fails_fast() {
    let config = ControllerConfig::default();
    assert_eq!(
        FlowController::new(&config).unwrap_err(),
        ControllerError::Pool(PoolError::Empty)
    );
}

#[test]
fn test_reverse_arp_answers_with_client_mac() {
    let controller = FlowController::new(&two_server_config(SessionPolicy::Pinned)).unwrap();
    let switch = RecordingSwitch::new();
    admit(&controller, &switch, 1);
    switch.clear();

    let outcome = controller
        .on_packet_in(&switch, &packet_in(5, arp_request(mac(5), ip(5), client_ip(1))))
        .unwrap();
    assert_eq!(
        outcome,
        Outcome::ReverseArpAnswered {
            server: ip(5),
            client: client_ip(1),
        }
    );

    let outs = switch.packet_outs();
    assert_eq!(outs[0].in_port, 5);
    let arp = decode_arp(&outs[0].data);
    assert_eq!(arp.sender_ip, client_ip(1));
    assert_eq!(arp.sender_mac, client_mac(1));
    assert_eq!(arp.target_ip, ip(5));
    assert_eq!(arp.target_mac, mac(5));
    assert!(switch.flow_mods().is_empty());
}

#[test]
fn test_reverse_arp_for_unbound_client() {
    let controller = FlowController::new(&two_server_config(SessionPolicy::Pinned)).unwrap();
    let switch = RecordingSwitch::new();

    let err = controller
        .on_packet_in(&switch, &packet_in(5, arp_request(mac(5), ip(5), client_ip(99))))
        .unwrap_err();
    assert_eq!(err, HandleError::UnknownBinding { client: client_ip(99) });
    assert!(switch.packet_outs().is_empty());
}

#[test]
fn test_backend_arp_for_vip_is_dropped() {
    let controller = FlowController::new(&two_server_config(SessionPolicy::Pinned)).unwrap();
    let switch = RecordingSwitch::new();
    let outcome = controller
        .on_packet_in(&switch, &packet_in(6, arp_request(mac(6), ip(6), VIP)))
        .unwrap();
    assert_eq!(outcome, Outcome::Dropped(DropReason::BackendRequestedVip));
    assert!(controller.bindings().is_empty());
}

#[test]
fn test_non_request_and_foreign_arp_dropped() {
    let controller = FlowController::new(&two_server_config(SessionPolicy::Pinned)).unwrap();
    let switch = RecordingSwitch::new();

    let outcome = controller
        .on_packet_in(&switch, &packet_in(1, arp_reply(client_mac(1), client_ip(1), VIP)))
        .unwrap();
    assert_eq!(outcome, Outcome::Dropped(DropReason::ArpNotRequest));

    let outcome = controller
        .on_packet_in(&switch, &packet_in(1, arp_request(client_mac(1), client_ip(1), client_ip(2))))
        .unwrap();
    assert_eq!(outcome, Outcome::Dropped(DropReason::ArpNotHandled));
    assert!(switch.packet_outs().is_empty());
}

#[test]
fn test_malformed_packet_does_not_disturb_state() {
    let controller = FlowController::new(&two_server_config(SessionPolicy::Pinned)).unwrap();
    let switch = RecordingSwitch::new();

    let mut truncated = arp_request(client_mac(1), client_ip(1), VIP);
    truncated.truncate(20);
    let err = controller.on_packet_in(&switch, &packet_in(1, truncated)).unwrap_err();
    assert_eq!(err, HandleError::Malformed(PacketError::MalformedArp));

    let err = controller.on_packet_in(&switch, &packet_in(1, Vec::new())).unwrap_err();
    assert_eq!(err, HandleError::Malformed(PacketError::Empty));

    assert!(switch.packet_outs().is_empty());
    assert_eq!(admit(&controller, &switch, 1), ip(5));
}

#[test]
fn test_first_packet_is_forwarded_with_rewrites() {
    let controller = FlowController::new(&two_server_config(SessionPolicy::Pinned)).unwrap();
    let switch = RecordingSwitch::new();

    let frame = ipv4_frame(client_mac(3), mac(5), client_ip(3), VIP, IpProtocol::Icmp);
    let outcome = controller.on_packet_in(&switch, &packet_in(3, frame.clone())).unwrap();
    assert_eq!(
        outcome,
        Outcome::FirstPacketForwarded {
            client: client_ip(3),
            server: ip(5),
            rules_installed: true,
        }
    );

    let outs = switch.packet_outs();
    assert_eq!(outs.len(), 1);
    assert_eq!(outs[0].data, frame);
    assert_eq!(outs[0].in_port, 3);
    assert_eq!(
        outs[0].actions,
        vec![
            Action::SetDlDst(mac(5)),
            Action::SetNwDst(ip(5)),
            Action::output(5),
        ]
    );
    // The injected packet carries exactly the rewrites of the installed rule.
    assert_eq!(forward_rules(&switch.flow_mods())[0].actions, outs[0].actions);
}

#[test]
fn test_first_packet_after_admission_uses_binding() {
    let controller = FlowController::new(&two_server_config(SessionPolicy::Pinned)).unwrap();
    let switch = RecordingSwitch::new();
    admit(&controller, &switch, 1);
    admit(&controller, &switch, 2);
    switch.clear();

    let frame = ipv4_frame(client_mac(2), mac(6), client_ip(2), VIP, IpProtocol::Tcp);
    let outcome = controller.on_packet_in(&switch, &packet_in(2, frame)).unwrap();
    assert_eq!(
        outcome,
        Outcome::FirstPacketForwarded {
            client: client_ip(2),
            server: ip(6),
            rules_installed: false,
        }
    );
    assert!(switch.flow_mods().is_empty());
}

#[test]
fn test_buffered_first_packet_omits_data() {
    let controller = FlowController::new(&two_server_config(SessionPolicy::Pinned)).unwrap();
    let switch = RecordingSwitch::new();

    let mut pi = packet_in(1, ipv4_frame(client_mac(1), mac(5), client_ip(1), VIP, IpProtocol::Udp));
    pi.buffer_id = Some(42);
    controller.on_packet_in(&switch, &pi).unwrap();

    let outs = switch.packet_outs();
    assert_eq!(outs[0].buffer_id, Some(42));
    assert!(outs[0].data.is_empty());
}

#[test]
fn test_truncated_buffered_first_packet_is_forwarded() {
    let controller = FlowController::new(&two_server_config(SessionPolicy::Pinned)).unwrap();
    let switch = RecordingSwitch::new();

    // A 600-byte datagram arrives cut to the switch's default miss_send_len.
    let mut frame = ipv4_frame_with_payload(
        client_mac(1),
        mac(5),
        client_ip(1),
        VIP,
        IpProtocol::Udp,
        &[0xab; 600],
    );
    let total_len = frame.len() as u16;
    frame.truncate(128);
    let mut pi = packet_in(1, frame);
    pi.total_len = total_len;
    pi.buffer_id = Some(7);

    let outcome = controller.on_packet_in(&switch, &pi).unwrap();
    assert_eq!(
        outcome,
        Outcome::FirstPacketForwarded {
            client: client_ip(1),
            server: ip(5),
            rules_installed: true,
        }
    );
    let outs = switch.packet_outs();
    assert_eq!(outs[0].buffer_id, Some(7));
    assert!(outs[0].data.is_empty());
    assert_eq!(switch.flow_mods().len(), 2);
}

fn removal_of(rule: &FlowMod, reason: FlowRemovedReason) -> FlowRemoved {
    FlowRemoved {
        flow_match: Match::default(),
        cookie: rule.cookie,
        priority: rule.priority,
        reason,
        duration_sec: 600,
        idle_timeout: rule.idle_timeout,
        packet_count: 42,
        byte_count: 4200,
    }
}

#[test]
fn test_hard_timeout_keeps_client_on_its_server() {
    let controller = FlowController::new(&two_server_config(SessionPolicy::Pinned)).unwrap();
    let switch = RecordingSwitch::new();
    assert_eq!(admit(&controller, &switch, 1), ip(5));

    let forward = switch.flow_mods()[0].clone();
    controller.on_flow_removed(&removal_of(&forward, FlowRemovedReason::HardTimeout));

    // The rules are gone, so the next segment comes up as a first packet.
    switch.clear();
    let frame = ipv4_frame(client_mac(1), mac(5), client_ip(1), VIP, IpProtocol::Tcp);
    let outcome = controller.on_packet_in(&switch, &packet_in(1, frame)).unwrap();
    assert_eq!(
        outcome,
        Outcome::FirstPacketForwarded {
            client: client_ip(1),
            server: ip(5),
            rules_installed: true,
        }
    );
    assert_eq!(switch.flow_mods().len(), 2);
}

#[test]
fn test_idle_timeout_releases_client() {
    let controller = FlowController::new(&two_server_config(SessionPolicy::Pinned)).unwrap();
    let switch = RecordingSwitch::new();
    assert_eq!(admit(&controller, &switch, 1), ip(5));

    let forward = switch.flow_mods()[0].clone();
    controller.on_flow_removed(&removal_of(&forward, FlowRemovedReason::IdleTimeout));
    assert!(controller.bindings().get(client_ip(1)).is_none());

    // A fresh session takes the next server in rotation.
    assert_eq!(admit(&controller, &switch, 1), ip(6));
}

#[test]
fn test_buffered_arp_request_is_discarded_after_reply() {
    let controller = FlowController::new(&two_server_config(SessionPolicy::Pinned)).unwrap();
    let switch = RecordingSwitch::new();

    let mut pi = packet_in(1, arp_request(client_mac(1), client_ip(1), VIP));
    pi.buffer_id = Some(3);
    controller.on_packet_in(&switch, &pi).unwrap();

    let outs = switch.packet_outs();
    assert_eq!(outs.len(), 2);
    assert_eq!(decode_arp(&outs[0].data).sender_ip, VIP);
    assert_eq!(outs[1].buffer_id, Some(3));
    assert_eq!(outs[1].in_port, 1);
    assert!(outs[1].actions.is_empty());
}

#[test]
fn test_ipv4_not_for_vip_is_dropped() {
    let controller = FlowController::new(&two_server_config(SessionPolicy::Pinned)).unwrap();
    let switch = RecordingSwitch::new();
    let frame = ipv4_frame(client_mac(1), mac(5), client_ip(1), ip(5), IpProtocol::Tcp);
    let outcome = controller.on_packet_in(&switch, &packet_in(1, frame)).unwrap();
    assert_eq!(outcome, Outcome::Dropped(DropReason::NotForVip));
    assert!(switch.packet_outs().is_empty());
    assert!(switch.flow_mods().is_empty());
}

#[test]
fn test_virtual_mac_is_advertised_and_restored() {
    let mut config = two_server_config(SessionPolicy::Pinned);
    config.service.virtual_mac = Some("02:00:00:00:00:aa".into());
    let vmac = EthernetAddress([2, 0, 0, 0, 0, 0xaa]);
    let controller = FlowController::new(&config).unwrap();
    let switch = RecordingSwitch::new();

    admit(&controller, &switch, 1);

    let arp = decode_arp(&switch.packet_outs()[0].data);
    assert_eq!(arp.sender_mac, vmac);
    assert_eq!(arp.eth_src, vmac);

    let flow_mods = switch.flow_mods();
    assert!(flow_mods[1].actions.contains(&Action::SetDlSrc(vmac)));
    // Client traffic is still steered to the real server MAC.
    assert!(flow_mods[0].actions.contains(&Action::SetDlDst(mac(5))));
}

#[test]
fn test_duplicate_suppression_can_be_disabled() {
    let mut config = two_server_config(SessionPolicy::Pinned);
    config.flows.suppress_duplicates = false;
    let controller = FlowController::new(&config).unwrap();
    let switch = RecordingSwitch::new();

    admit(&controller, &switch, 1);
    admit(&controller, &switch, 1);
    assert_eq!(switch.flow_mods().len(), 4);
    assert!(controller.installed_flows().is_none());
}

#[test]
fn test_switch_connect_installs_defaults() {
    let mut config = two_server_config(SessionPolicy::Pinned);
    config.flows.flood_arp = true;
    let controller = FlowController::new(&config).unwrap();
    let switch = RecordingSwitch::new();

    admit(&controller, &switch, 1);
    switch.clear();
    controller.on_switch_connected(&switch).unwrap();

    let flow_mods = switch.flow_mods();
    assert_eq!(flow_mods.len(), 3);
    assert_eq!(flow_mods[0].command, FlowModCommand::Delete);
    assert_eq!(flow_mods[1].actions, vec![Action::output(OFPP_CONTROLLER)]);
    assert_eq!(controller.connected_switches(), 1);

    // A reconnect wipes the table, so the pair must be installed again.
    switch.clear();
    let outcome = controller
        .on_packet_in(&switch, &packet_in(1, arp_request(client_mac(1), client_ip(1), VIP)))
        .unwrap();
    assert!(matches!(outcome, Outcome::Admitted { rules_installed: true, new_binding: false, .. }));
}
