//! Shared utilities for integration tests: frame builders and a recording switch.

#![allow(dead_code)]

use std::net::Ipv4Addr;
use std::sync::Mutex;

use ofp_balancer::config::{ControllerConfig, ServerConfig, SessionPolicy};
use ofp_balancer::controller::{Switch, SwitchError};
use ofp_balancer::openflow::{FlowMod, PacketIn, PacketOut};
use smoltcp::phy::ChecksumCapabilities;
use smoltcp::wire::{
    ArpOperation, ArpPacket, ArpRepr, EthernetAddress, EthernetFrame, EthernetProtocol,
    EthernetRepr, IpProtocol, Ipv4Address, Ipv4Packet, Ipv4Repr,
};

pub const VIP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 10);

pub fn mac(last: u8) -> EthernetAddress {
    EthernetAddress([0, 0, 0, 0, 0, last])
}

pub fn ip(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, last)
}

fn wire(addr: Ipv4Addr) -> Ipv4Address {
    Ipv4Address(addr.octets())
}

/// Pool S1(10.0.0.5, :05, port 5), S2(10.0.0.6, :06, port 6) behind 10.0.0.10.
pub fn two_server_config(policy: SessionPolicy) -> ControllerConfig {
    let mut config = ControllerConfig::default();
    config.service.virtual_ip = VIP;
    config.session.policy = policy;
    config.servers = vec![server_config("s1", 5), server_config("s2", 6)];
    config
}

pub fn server_config(name: &str, last: u8) -> ServerConfig {
    ServerConfig {
        name: name.into(),
        ip: ip(last),
        mac: format!("00:00:00:00:00:{:02x}", last),
        port: last as u16,
    }
}

fn arp_frame(
    operation: ArpOperation,
    eth_dst: EthernetAddress,
    sender_mac: EthernetAddress,
    sender_ip: Ipv4Addr,
    target_mac: EthernetAddress,
    target_ip: Ipv4Addr,
) -> Vec<u8> {
    let arp = ArpRepr::EthernetIpv4 {
        operation,
        source_hardware_addr: sender_mac,
        source_protocol_addr: wire(sender_ip),
        target_hardware_addr: target_mac,
        target_protocol_addr: wire(target_ip),
    };
    let eth = EthernetRepr {
        src_addr: sender_mac,
        dst_addr: eth_dst,
        ethertype: EthernetProtocol::Arp,
    };

    let mut buffer = vec![0u8; eth.buffer_len() + arp.buffer_len()];
    let mut frame = EthernetFrame::new_unchecked(&mut buffer);
    eth.emit(&mut frame);
    arp.emit(&mut ArpPacket::new_unchecked(frame.payload_mut()));
    buffer
}

/// Broadcast "who has `target_ip`? tell `sender_ip`".
pub fn arp_request(sender_mac: EthernetAddress, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Vec<u8> {
    arp_frame(
        ArpOperation::Request,
        EthernetAddress::BROADCAST,
        sender_mac,
        sender_ip,
        EthernetAddress([0; 6]),
        target_ip,
    )
}

/// Unsolicited ARP reply, which the controller must ignore.
pub fn arp_reply(sender_mac: EthernetAddress, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Vec<u8> {
    arp_frame(
        ArpOperation::Reply,
        EthernetAddress::BROADCAST,
        sender_mac,
        sender_ip,
        EthernetAddress::BROADCAST,
        target_ip,
    )
}

/// Ethernet + IPv4 header with a short payload.
pub fn ipv4_frame(
    src_mac: EthernetAddress,
    dst_mac: EthernetAddress,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    protocol: IpProtocol,
) -> Vec<u8> {
    ipv4_frame_with_payload(src_mac, dst_mac, src_ip, dst_ip, protocol, b"hello")
}

pub fn ipv4_frame_with_payload(
    src_mac: EthernetAddress,
    dst_mac: EthernetAddress,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    protocol: IpProtocol,
    payload: &[u8],
) -> Vec<u8> {
    let ip = Ipv4Repr {
        src_addr: wire(src_ip),
        dst_addr: wire(dst_ip),
        next_header: protocol,
        payload_len: payload.len(),
        hop_limit: 64,
    };
    let eth = EthernetRepr {
        src_addr: src_mac,
        dst_addr: dst_mac,
        ethertype: EthernetProtocol::Ipv4,
    };

    let mut buffer = vec![0u8; eth.buffer_len() + ip.buffer_len() + payload.len()];
    let mut frame = EthernetFrame::new_unchecked(&mut buffer);
    eth.emit(&mut frame);
    let mut packet = Ipv4Packet::new_unchecked(frame.payload_mut());
    ip.emit(&mut packet, &ChecksumCapabilities::default());
    packet.payload_mut()[..payload.len()].copy_from_slice(payload);
    buffer
}

/// Frame with the IPv6 ether-type and an arbitrary body.
pub fn ipv6_frame(src_mac: EthernetAddress) -> Vec<u8> {
    let mut frame = vec![0u8; 74];
    frame[0..6].copy_from_slice(&[0x33, 0x33, 0, 0, 0, 1]);
    frame[6..12].copy_from_slice(&src_mac.0);
    frame[12..14].copy_from_slice(&0x86ddu16.to_be_bytes());
    frame[14] = 0x60;
    frame
}

pub fn packet_in(in_port: u16, data: Vec<u8>) -> PacketIn {
    PacketIn {
        buffer_id: None,
        total_len: data.len() as u16,
        in_port,
        reason: 0,
        data,
    }
}

/// Decoded ARP fields of a forged reply.
#[derive(Debug, PartialEq, Eq)]
pub struct ArpFields {
    pub eth_src: EthernetAddress,
    pub eth_dst: EthernetAddress,
    pub operation: ArpOperation,
    pub sender_mac: EthernetAddress,
    pub sender_ip: Ipv4Addr,
    pub target_mac: EthernetAddress,
    pub target_ip: Ipv4Addr,
}

pub fn decode_arp(data: &[u8]) -> ArpFields {
    let frame = EthernetFrame::new_checked(data).expect("ethernet frame");
    assert_eq!(frame.ethertype(), EthernetProtocol::Arp);
    let packet = ArpPacket::new_checked(frame.payload()).expect("arp packet");
    match ArpRepr::parse(&packet).expect("arp repr") {
        ArpRepr::EthernetIpv4 {
            operation,
            source_hardware_addr,
            source_protocol_addr,
            target_hardware_addr,
            target_protocol_addr,
        } => ArpFields {
            eth_src: frame.src_addr(),
            eth_dst: frame.dst_addr(),
            operation,
            sender_mac: source_hardware_addr,
            sender_ip: Ipv4Addr::from(source_protocol_addr.0),
            target_mac: target_hardware_addr,
            target_ip: Ipv4Addr::from(target_protocol_addr.0),
        },
        #[allow(unreachable_patterns)]
        other => panic!("unexpected ARP repr {:?}", other),
    }
}

/// Switch double that records every command.
#[derive(Default)]
pub struct RecordingSwitch {
    packet_outs: Mutex<Vec<PacketOut>>,
    flow_mods: Mutex<Vec<FlowMod>>,
}

impl RecordingSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packet_outs(&self) -> Vec<PacketOut> {
        self.packet_outs.lock().unwrap().clone()
    }

    pub fn flow_mods(&self) -> Vec<FlowMod> {
        self.flow_mods.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.packet_outs.lock().unwrap().clear();
        self.flow_mods.lock().unwrap().clear();
    }
}

impl Switch for RecordingSwitch {
    fn datapath_id(&self) -> u64 {
        0x1
    }

    fn send_packet_out(&self, packet_out: PacketOut) -> Result<(), SwitchError> {
        self.packet_outs.lock().unwrap().push(packet_out);
        Ok(())
    }

    fn install_flow(&self, flow_mod: FlowMod) -> Result<(), SwitchError> {
        self.flow_mods.lock().unwrap().push(flow_mod);
        Ok(())
    }
}
