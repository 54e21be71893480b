//! OpenFlow 1.0 actions used by the controller.

use smoltcp::wire::EthernetAddress;
use std::fmt;
use std::net::Ipv4Addr;

use super::wire::{put_u16, put_u32, put_zeros, Reader, WireError, OFPP_CONTROLLER};

const OFPAT_OUTPUT: u16 = 0;
const OFPAT_SET_DL_SRC: u16 = 4;
const OFPAT_SET_DL_DST: u16 = 5;
const OFPAT_SET_NW_SRC: u16 = 6;
const OFPAT_SET_NW_DST: u16 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Output { port: u16, max_len: u16 },
    SetDlSrc(EthernetAddress),
    SetDlDst(EthernetAddress),
    SetNwSrc(Ipv4Addr),
    SetNwDst(Ipv4Addr),
}

impl Action {
    /// Output to `port`; frames sent to the controller are not truncated.
    pub fn output(port: u16) -> Self {
        let max_len = if port == OFPP_CONTROLLER { 0xffff } else { 0 };
        Action::Output { port, max_len }
    }

    pub(crate) fn encoded_len(&self) -> usize {
        match self {
            Action::SetDlSrc(_) | Action::SetDlDst(_) => 16,
            _ => 8,
        }
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        let len = self.encoded_len() as u16;
        match *self {
            Action::Output { port, max_len } => {
                put_u16(out, OFPAT_OUTPUT);
                put_u16(out, len);
                put_u16(out, port);
                put_u16(out, max_len);
            }
            Action::SetDlSrc(mac) | Action::SetDlDst(mac) => {
                let kind = if matches!(self, Action::SetDlSrc(_)) {
                    OFPAT_SET_DL_SRC
                } else {
                    OFPAT_SET_DL_DST
                };
                put_u16(out, kind);
                put_u16(out, len);
                out.extend_from_slice(&mac.0);
                put_zeros(out, 6);
            }
            Action::SetNwSrc(ip) | Action::SetNwDst(ip) => {
                let kind = if matches!(self, Action::SetNwSrc(_)) {
                    OFPAT_SET_NW_SRC
                } else {
                    OFPAT_SET_NW_DST
                };
                put_u16(out, kind);
                put_u16(out, len);
                put_u32(out, u32::from(ip));
            }
        }
    }

    pub(crate) fn decode_list(bytes: &[u8]) -> Result<Vec<Action>, WireError> {
        let mut r = Reader::new(bytes, "action list");
        let mut actions = Vec::new();

        while r.remaining() > 0 {
            let kind = r.u16()?;
            let len = r.u16()? as usize;
            if len < 8 {
                return Err(WireError::BadLength(len as u16));
            }
            let mut body = Reader::new(r.bytes(len - 4)?, "action");

            let action = match kind {
                OFPAT_OUTPUT => Action::Output {
                    port: body.u16()?,
                    max_len: body.u16()?,
                },
                OFPAT_SET_DL_SRC => Action::SetDlSrc(EthernetAddress(body.array()?)),
                OFPAT_SET_DL_DST => Action::SetDlDst(EthernetAddress(body.array()?)),
                OFPAT_SET_NW_SRC => Action::SetNwSrc(Ipv4Addr::from(body.u32()?)),
                OFPAT_SET_NW_DST => Action::SetNwDst(Ipv4Addr::from(body.u32()?)),
                other => return Err(WireError::UnsupportedAction(other)),
            };
            actions.push(action);
        }

        Ok(actions)
    }
}

pub(crate) fn encode_list(actions: &[Action], out: &mut Vec<u8>) -> u16 {
    let start = out.len();
    for action in actions {
        action.encode(out);
    }
    (out.len() - start) as u16
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Output { port, .. } => write!(f, "output:{}", port),
            Action::SetDlSrc(mac) => write!(f, "set_dl_src:{}", mac),
            Action::SetDlDst(mac) => write!(f, "set_dl_dst:{}", mac),
            Action::SetNwSrc(ip) => write!(f, "set_nw_src:{}", ip),
            Action::SetNwDst(ip) => write!(f, "set_nw_dst:{}", ip),
        }
    }
}
