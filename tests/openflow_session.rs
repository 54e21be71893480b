//! A fake switch speaking OpenFlow 1.0 to a running controller over TCP.

use std::sync::Arc;
use std::time::Duration;

use ofp_balancer::config::SessionPolicy;
use ofp_balancer::lifecycle::Shutdown;
use ofp_balancer::net::{ControllerServer, Listener};
use ofp_balancer::openflow::wire::OFPP_IN_PORT;
use ofp_balancer::openflow::{
    read_message, write_message, Action, FlowModCommand, Message, PhyPort, SwitchFeatures,
};
use ofp_balancer::FlowController;
use smoltcp::wire::ArpOperation;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

mod common;

use common::*;

const MAX_MESSAGE: usize = 65535;

async fn expect_message(stream: &mut TcpStream) -> (u32, Message) {
    timeout(Duration::from_secs(5), read_message(stream, MAX_MESSAGE))
        .await
        .expect("controller went quiet")
        .expect("readable message")
}

fn features() -> Message {
    Message::FeaturesReply(SwitchFeatures {
        datapath_id: 0xabcd,
        n_buffers: 256,
        n_tables: 1,
        capabilities: 0,
        actions: 0,
        ports: (1..=6)
            .map(|n| PhyPort {
                port_no: n,
                hw_addr: mac(0xf0 + n as u8),
                name: format!("eth{}", n),
            })
            .collect(),
    })
}

#[tokio::test]
async fn test_switch_session_end_to_end() {
    let config = two_server_config(SessionPolicy::Pinned);
    let controller = Arc::new(FlowController::new(&config).unwrap());
    let server = ControllerServer::new(controller.clone(), Arc::new(config));
    let tracker = server.tracker();

    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener = Listener::from_tcp(tcp, 4);
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_task = tokio::spawn(server.run(listener, shutdown.clone()));

    let mut switch = TcpStream::connect(addr).await.unwrap();

    // Handshake: the controller speaks first.
    let (_, hello) = expect_message(&mut switch).await;
    assert_eq!(hello, Message::Hello);
    let (_, request) = expect_message(&mut switch).await;
    assert_eq!(request, Message::FeaturesRequest);

    write_message(&mut switch, 1, &Message::Hello).await.unwrap();
    write_message(&mut switch, 2, &features()).await.unwrap();

    // Connect rules: wipe the table, then send VIP ARP to the controller.
    let (_, wipe) = expect_message(&mut switch).await;
    match wipe {
        Message::FlowMod(fm) => assert_eq!(fm.command, FlowModCommand::Delete),
        other => panic!("expected FLOW_MOD, got {:?}", other),
    }
    let (_, arp_rule) = expect_message(&mut switch).await;
    match arp_rule {
        Message::FlowMod(fm) => {
            assert_eq!(fm.command, FlowModCommand::Add);
            assert_eq!(fm.flow_match.nw_dst, Some(VIP));
        }
        other => panic!("expected FLOW_MOD, got {:?}", other),
    }
    assert_eq!(controller.connected_switches(), 1);

    // Keepalive echoes the payload and the transaction id.
    write_message(&mut switch, 77, &Message::EchoRequest(vec![1, 2, 3]))
        .await
        .unwrap();
    let (xid, echo) = expect_message(&mut switch).await;
    assert_eq!(xid, 77);
    assert_eq!(echo, Message::EchoReply(vec![1, 2, 3]));

    // A client on port 1 asks for the VIP.
    let frame = arp_request(mac(1), ip(1), VIP);
    write_message(&mut switch, 3, &Message::PacketIn(packet_in(1, frame)))
        .await
        .unwrap();

    let (_, reply) = expect_message(&mut switch).await;
    let Message::PacketOut(out) = reply else {
        panic!("expected PACKET_OUT, got {:?}", reply);
    };
    assert_eq!(out.in_port, 1);
    assert_eq!(out.actions, vec![Action::output(OFPP_IN_PORT)]);
    let arp = decode_arp(&out.data);
    assert_eq!(arp.operation, ArpOperation::Reply);
    assert_eq!(arp.sender_ip, VIP);
    assert_eq!(arp.sender_mac, mac(5));

    let mut installed = Vec::new();
    for _ in 0..2 {
        match expect_message(&mut switch).await {
            (_, Message::FlowMod(fm)) => installed.push(fm),
            (_, other) => panic!("expected FLOW_MOD, got {:?}", other),
        }
    }
    assert_eq!(installed[0].flow_match.in_port, Some(1));
    assert_eq!(installed[0].actions.last(), Some(&Action::output(5)));
    assert_eq!(installed[1].flow_match.in_port, Some(5));
    assert_eq!(installed[1].flow_match.nw_dst, Some(ip(1)));
    assert_eq!(controller.bindings().len(), 1);

    shutdown.trigger();
    timeout(Duration::from_secs(10), server_task)
        .await
        .expect("server stopped")
        .unwrap()
        .unwrap();

    // The session closed its half of the connection.
    let closed = timeout(Duration::from_secs(5), read_message(&mut switch, MAX_MESSAGE))
        .await
        .expect("connection closed");
    assert!(closed.is_err());
    assert_eq!(tracker.active_count(), 0);
    assert_eq!(controller.connected_switches(), 0);
}

#[tokio::test]
async fn test_packet_in_before_handshake_is_ignored() {
    let config = two_server_config(SessionPolicy::Pinned);
    let controller = Arc::new(FlowController::new(&config).unwrap());
    let server = ControllerServer::new(controller.clone(), Arc::new(config));

    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener = Listener::from_tcp(tcp, 4);
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_task = tokio::spawn(server.run(listener, shutdown.clone()));

    let mut switch = TcpStream::connect(addr).await.unwrap();
    expect_message(&mut switch).await;
    expect_message(&mut switch).await;

    let frame = arp_request(mac(1), ip(1), VIP);
    write_message(&mut switch, 9, &Message::PacketIn(packet_in(1, frame)))
        .await
        .unwrap();
    write_message(&mut switch, 10, &Message::EchoRequest(Vec::new()))
        .await
        .unwrap();

    // The echo reply is the next thing on the wire; no ARP reply precedes it.
    let (xid, message) = expect_message(&mut switch).await;
    assert_eq!(xid, 10);
    assert_eq!(message, Message::EchoReply(Vec::new()));
    assert!(controller.bindings().is_empty());

    shutdown.trigger();
    timeout(Duration::from_secs(10), server_task)
        .await
        .expect("server stopped")
        .unwrap()
        .unwrap();
}
