//! Forged ARP replies.

use smoltcp::wire::{
    ArpOperation, ArpPacket, ArpRepr, EthernetAddress, EthernetFrame, EthernetProtocol,
    EthernetRepr,
};
use std::net::Ipv4Addr;

use super::frame::to_wire;

/// Build an Ethernet-framed ARP reply claiming `answer_ip` is at `answer_mac`,
/// addressed to the host that asked.
pub fn build_arp_reply(
    answer_mac: EthernetAddress,
    answer_ip: Ipv4Addr,
    requester_mac: EthernetAddress,
    requester_ip: Ipv4Addr,
) -> Vec<u8> {
    let arp_repr = ArpRepr::EthernetIpv4 {
        operation: ArpOperation::Reply,
        source_hardware_addr: answer_mac,
        source_protocol_addr: to_wire(answer_ip),
        target_hardware_addr: requester_mac,
        target_protocol_addr: to_wire(requester_ip),
    };

    let eth_repr = EthernetRepr {
        src_addr: answer_mac,
        dst_addr: requester_mac,
        ethertype: EthernetProtocol::Arp,
    };

    let mut buffer = vec![0u8; eth_repr.buffer_len() + arp_repr.buffer_len()];
    let mut frame = EthernetFrame::new_unchecked(&mut buffer);
    eth_repr.emit(&mut frame);

    let mut arp_packet = ArpPacket::new_unchecked(frame.payload_mut());
    arp_repr.emit(&mut arp_packet);

    buffer
}
