//! OpenFlow 1.0 messages exchanged with the switch.

use smoltcp::wire::EthernetAddress;

use super::action::{encode_list, Action};
use super::flow_match::Match;
use super::wire::*;

/// Incoming frame the switch could not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    /// Switch-side buffer holding the frame, if any.
    pub buffer_id: Option<u32>,
    pub total_len: u16,
    pub in_port: u16,
    pub reason: u8,
    pub data: Vec<u8>,
}

/// One-shot injection of a frame (or a buffered frame) through an action list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOut {
    pub buffer_id: Option<u32>,
    pub in_port: u16,
    pub actions: Vec<Action>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowModCommand {
    Add,
    Modify,
    ModifyStrict,
    Delete,
    DeleteStrict,
}

impl FlowModCommand {
    fn code(self) -> u16 {
        match self {
            FlowModCommand::Add => 0,
            FlowModCommand::Modify => 1,
            FlowModCommand::ModifyStrict => 2,
            FlowModCommand::Delete => 3,
            FlowModCommand::DeleteStrict => 4,
        }
    }

    fn from_code(code: u16) -> Self {
        match code {
            1 => FlowModCommand::Modify,
            2 => FlowModCommand::ModifyStrict,
            3 => FlowModCommand::Delete,
            4 => FlowModCommand::DeleteStrict,
            _ => FlowModCommand::Add,
        }
    }
}

/// Flow table modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMod {
    pub flow_match: Match,
    pub cookie: u64,
    pub command: FlowModCommand,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub priority: u16,
    pub buffer_id: Option<u32>,
    pub out_port: u16,
    pub flags: u16,
    pub actions: Vec<Action>,
}

impl FlowMod {
    /// An ADD with no timeouts, no buffer and no flags.
    pub fn add(flow_match: Match, priority: u16, actions: Vec<Action>) -> Self {
        Self {
            flow_match,
            cookie: 0,
            command: FlowModCommand::Add,
            idle_timeout: 0,
            hard_timeout: 0,
            priority,
            buffer_id: None,
            out_port: OFPP_NONE,
            flags: 0,
            actions,
        }
    }

    /// A DELETE removing every flow covered by `flow_match`.
    pub fn delete(flow_match: Match) -> Self {
        Self {
            command: FlowModCommand::Delete,
            ..Self::add(flow_match, 0, Vec::new())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowRemovedReason {
    IdleTimeout,
    HardTimeout,
    Delete,
    Other(u8),
}

impl From<u8> for FlowRemovedReason {
    fn from(v: u8) -> Self {
        match v {
            0 => FlowRemovedReason::IdleTimeout,
            1 => FlowRemovedReason::HardTimeout,
            2 => FlowRemovedReason::Delete,
            other => FlowRemovedReason::Other(other),
        }
    }
}

impl From<FlowRemovedReason> for u8 {
    fn from(r: FlowRemovedReason) -> Self {
        match r {
            FlowRemovedReason::IdleTimeout => 0,
            FlowRemovedReason::HardTimeout => 1,
            FlowRemovedReason::Delete => 2,
            FlowRemovedReason::Other(v) => v,
        }
    }
}

/// Notification that a flow flagged with SEND_FLOW_REM left the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRemoved {
    pub flow_match: Match,
    pub cookie: u64,
    pub priority: u16,
    pub reason: FlowRemovedReason,
    pub duration_sec: u32,
    pub idle_timeout: u16,
    pub packet_count: u64,
    pub byte_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhyPort {
    pub port_no: u16,
    pub hw_addr: EthernetAddress,
    pub name: String,
}

const OFP_PHY_PORT_LEN: usize = 48;

impl PhyPort {
    fn encode(&self, out: &mut Vec<u8>) {
        put_u16(out, self.port_no);
        out.extend_from_slice(&self.hw_addr.0);
        let mut name = [0u8; 16];
        let raw = self.name.as_bytes();
        let n = raw.len().min(15);
        name[..n].copy_from_slice(&raw[..n]);
        out.extend_from_slice(&name);
        put_zeros(out, 24); // config, state, curr, advertised, supported, peer
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let port_no = r.u16()?;
        let hw_addr = EthernetAddress(r.array()?);
        let name_raw = r.bytes(16)?;
        let end = name_raw.iter().position(|&b| b == 0).unwrap_or(16);
        let name = String::from_utf8_lossy(&name_raw[..end]).into_owned();
        r.skip(24)?;
        Ok(Self {
            port_no,
            hw_addr,
            name,
        })
    }
}

/// Reply to FEATURES_REQUEST identifying the datapath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub n_buffers: u32,
    pub n_tables: u8,
    pub capabilities: u32,
    pub actions: u32,
    pub ports: Vec<PhyPort>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsg {
    pub error_type: u16,
    pub code: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello,
    Error(ErrorMsg),
    EchoRequest(Vec<u8>),
    EchoReply(Vec<u8>),
    FeaturesRequest,
    FeaturesReply(SwitchFeatures),
    PacketIn(PacketIn),
    FlowRemoved(FlowRemoved),
    PortStatus { reason: u8, port: PhyPort },
    PacketOut(PacketOut),
    FlowMod(FlowMod),
    BarrierRequest,
    BarrierReply,
    /// A message type the controller does not act on.
    Unsupported { msg_type: u8 },
}

fn buffer_id(raw: u32) -> Option<u32> {
    (raw != NO_BUFFER).then_some(raw)
}

impl Message {
    pub fn msg_type(&self) -> u8 {
        match self {
            Message::Hello => OFPT_HELLO,
            Message::Error(_) => OFPT_ERROR,
            Message::EchoRequest(_) => OFPT_ECHO_REQUEST,
            Message::EchoReply(_) => OFPT_ECHO_REPLY,
            Message::FeaturesRequest => OFPT_FEATURES_REQUEST,
            Message::FeaturesReply(_) => OFPT_FEATURES_REPLY,
            Message::PacketIn(_) => OFPT_PACKET_IN,
            Message::FlowRemoved(_) => OFPT_FLOW_REMOVED,
            Message::PortStatus { .. } => OFPT_PORT_STATUS,
            Message::PacketOut(_) => OFPT_PACKET_OUT,
            Message::FlowMod(_) => OFPT_FLOW_MOD,
            Message::BarrierRequest => OFPT_BARRIER_REQUEST,
            Message::BarrierReply => OFPT_BARRIER_REPLY,
            Message::Unsupported { msg_type } => *msg_type,
        }
    }

    /// Serialize with header; the length field is filled in last.
    pub fn encode(&self, xid: u32) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        out.push(OFP_VERSION);
        out.push(self.msg_type());
        put_u16(&mut out, 0);
        put_u32(&mut out, xid);

        match self {
            Message::Hello
            | Message::FeaturesRequest
            | Message::BarrierRequest
            | Message::BarrierReply
            | Message::Unsupported { .. } => {}
            Message::Error(e) => {
                put_u16(&mut out, e.error_type);
                put_u16(&mut out, e.code);
                out.extend_from_slice(&e.data);
            }
            Message::EchoRequest(data) | Message::EchoReply(data) => {
                out.extend_from_slice(data);
            }
            Message::FeaturesReply(f) => {
                put_u64(&mut out, f.datapath_id);
                put_u32(&mut out, f.n_buffers);
                out.push(f.n_tables);
                put_zeros(&mut out, 3);
                put_u32(&mut out, f.capabilities);
                put_u32(&mut out, f.actions);
                for port in &f.ports {
                    port.encode(&mut out);
                }
            }
            Message::PacketIn(p) => {
                put_u32(&mut out, p.buffer_id.unwrap_or(NO_BUFFER));
                put_u16(&mut out, p.total_len);
                put_u16(&mut out, p.in_port);
                out.push(p.reason);
                put_zeros(&mut out, 1);
                out.extend_from_slice(&p.data);
            }
            Message::FlowRemoved(r) => {
                r.flow_match.encode(&mut out);
                put_u64(&mut out, r.cookie);
                put_u16(&mut out, r.priority);
                out.push(r.reason.into());
                put_zeros(&mut out, 1);
                put_u32(&mut out, r.duration_sec);
                put_u32(&mut out, 0); // duration_nsec
                put_u16(&mut out, r.idle_timeout);
                put_zeros(&mut out, 2);
                put_u64(&mut out, r.packet_count);
                put_u64(&mut out, r.byte_count);
            }
            Message::PortStatus { reason, port } => {
                out.push(*reason);
                put_zeros(&mut out, 7);
                port.encode(&mut out);
            }
            Message::PacketOut(p) => {
                put_u32(&mut out, p.buffer_id.unwrap_or(NO_BUFFER));
                put_u16(&mut out, p.in_port);
                let len_at = out.len();
                put_u16(&mut out, 0);
                let actions_len = encode_list(&p.actions, &mut out);
                out[len_at..len_at + 2].copy_from_slice(&actions_len.to_be_bytes());
                // A buffered frame is referenced, not resent.
                if p.buffer_id.is_none() {
                    out.extend_from_slice(&p.data);
                }
            }
            Message::FlowMod(m) => {
                m.flow_match.encode(&mut out);
                put_u64(&mut out, m.cookie);
                put_u16(&mut out, m.command.code());
                put_u16(&mut out, m.idle_timeout);
                put_u16(&mut out, m.hard_timeout);
                put_u16(&mut out, m.priority);
                put_u32(&mut out, m.buffer_id.unwrap_or(NO_BUFFER));
                put_u16(&mut out, m.out_port);
                put_u16(&mut out, m.flags);
                encode_list(&m.actions, &mut out);
            }
        }

        let len = out.len() as u16;
        out[2..4].copy_from_slice(&len.to_be_bytes());
        out
    }

    /// Decode a message body (everything after the 8-byte header).
    pub fn decode(msg_type: u8, body: &[u8]) -> Result<Self, WireError> {
        let msg = match msg_type {
            OFPT_HELLO => Message::Hello,
            OFPT_ERROR => {
                let mut r = Reader::new(body, "error");
                Message::Error(ErrorMsg {
                    error_type: r.u16()?,
                    code: r.u16()?,
                    data: r.rest().to_vec(),
                })
            }
            OFPT_ECHO_REQUEST => Message::EchoRequest(body.to_vec()),
            OFPT_ECHO_REPLY => Message::EchoReply(body.to_vec()),
            OFPT_FEATURES_REQUEST => Message::FeaturesRequest,
            OFPT_FEATURES_REPLY => {
                let mut r = Reader::new(body, "features reply");
                let datapath_id = r.u64()?;
                let n_buffers = r.u32()?;
                let n_tables = r.u8()?;
                r.skip(3)?;
                let capabilities = r.u32()?;
                let actions = r.u32()?;
                let mut ports = Vec::with_capacity(r.remaining() / OFP_PHY_PORT_LEN);
                while r.remaining() >= OFP_PHY_PORT_LEN {
                    ports.push(PhyPort::decode(&mut r)?);
                }
                Message::FeaturesReply(SwitchFeatures {
                    datapath_id,
                    n_buffers,
                    n_tables,
                    capabilities,
                    actions,
                    ports,
                })
            }
            OFPT_PACKET_IN => {
                let mut r = Reader::new(body, "packet in");
                let buffer = r.u32()?;
                let total_len = r.u16()?;
                let in_port = r.u16()?;
                let reason = r.u8()?;
                r.skip(1)?;
                Message::PacketIn(PacketIn {
                    buffer_id: buffer_id(buffer),
                    total_len,
                    in_port,
                    reason,
                    data: r.rest().to_vec(),
                })
            }
            OFPT_FLOW_REMOVED => {
                let mut r = Reader::new(body, "flow removed");
                let flow_match = Match::decode(&mut r)?;
                let cookie = r.u64()?;
                let priority = r.u16()?;
                let reason = FlowRemovedReason::from(r.u8()?);
                r.skip(1)?;
                let duration_sec = r.u32()?;
                r.skip(4)?;
                let idle_timeout = r.u16()?;
                r.skip(2)?;
                Message::FlowRemoved(FlowRemoved {
                    flow_match,
                    cookie,
                    priority,
                    reason,
                    duration_sec,
                    idle_timeout,
                    packet_count: r.u64()?,
                    byte_count: r.u64()?,
                })
            }
            OFPT_PORT_STATUS => {
                let mut r = Reader::new(body, "port status");
                let reason = r.u8()?;
                r.skip(7)?;
                Message::PortStatus {
                    reason,
                    port: PhyPort::decode(&mut r)?,
                }
            }
            OFPT_PACKET_OUT => {
                let mut r = Reader::new(body, "packet out");
                let buffer = r.u32()?;
                let in_port = r.u16()?;
                let actions_len = r.u16()? as usize;
                let actions = Action::decode_list(r.bytes(actions_len)?)?;
                Message::PacketOut(PacketOut {
                    buffer_id: buffer_id(buffer),
                    in_port,
                    actions,
                    data: r.rest().to_vec(),
                })
            }
            OFPT_FLOW_MOD => {
                let mut r = Reader::new(body, "flow mod");
                let flow_match = Match::decode(&mut r)?;
                let cookie = r.u64()?;
                let command = FlowModCommand::from_code(r.u16()?);
                let idle_timeout = r.u16()?;
                let hard_timeout = r.u16()?;
                let priority = r.u16()?;
                let buffer = r.u32()?;
                let out_port = r.u16()?;
                let flags = r.u16()?;
                Message::FlowMod(FlowMod {
                    flow_match,
                    cookie,
                    command,
                    idle_timeout,
                    hard_timeout,
                    priority,
                    buffer_id: buffer_id(buffer),
                    out_port,
                    flags,
                    actions: Action::decode_list(r.rest())?,
                })
            }
            OFPT_BARRIER_REQUEST => Message::BarrierRequest,
            OFPT_BARRIER_REPLY => Message::BarrierReply,
            other => Message::Unsupported { msg_type: other },
        };
        Ok(msg)
    }
}
