//! `ofp_match`: the 40-byte OpenFlow 1.0 match structure.
//!
//! Only the fields the controller programs are modelled; VLAN, ToS and
//! transport ports are always wildcarded.

use smoltcp::wire::EthernetAddress;
use std::fmt;
use std::net::Ipv4Addr;

use super::wire::{put_u16, put_u32, put_zeros, Reader, WireError};

pub const OFP_MATCH_LEN: usize = 40;

const OFPFW_IN_PORT: u32 = 1 << 0;
const OFPFW_DL_SRC: u32 = 1 << 2;
const OFPFW_DL_DST: u32 = 1 << 3;
const OFPFW_DL_TYPE: u32 = 1 << 4;
const OFPFW_NW_PROTO: u32 = 1 << 5;
const OFPFW_NW_SRC_SHIFT: u32 = 8;
const OFPFW_NW_SRC_MASK: u32 = 0x3f << OFPFW_NW_SRC_SHIFT;
const OFPFW_NW_DST_SHIFT: u32 = 14;
const OFPFW_NW_DST_MASK: u32 = 0x3f << OFPFW_NW_DST_SHIFT;
const OFPFW_ALL: u32 = (1 << 22) - 1;

/// Header fields a flow rule matches on. `None` means wildcarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Match {
    pub in_port: Option<u16>,
    pub dl_src: Option<EthernetAddress>,
    pub dl_dst: Option<EthernetAddress>,
    pub dl_type: Option<u16>,
    pub nw_proto: Option<u8>,
    pub nw_src: Option<Ipv4Addr>,
    pub nw_dst: Option<Ipv4Addr>,
}

impl Match {
    /// A match with every field wildcarded.
    pub fn all() -> Self {
        Self::default()
    }

    fn wildcards(&self) -> u32 {
        let mut w = OFPFW_ALL;
        if self.in_port.is_some() {
            w &= !OFPFW_IN_PORT;
        }
        if self.dl_src.is_some() {
            w &= !OFPFW_DL_SRC;
        }
        if self.dl_dst.is_some() {
            w &= !OFPFW_DL_DST;
        }
        if self.dl_type.is_some() {
            w &= !OFPFW_DL_TYPE;
        }
        if self.nw_proto.is_some() {
            w &= !OFPFW_NW_PROTO;
        }
        if self.nw_src.is_some() {
            w &= !OFPFW_NW_SRC_MASK;
        }
        if self.nw_dst.is_some() {
            w &= !OFPFW_NW_DST_MASK;
        }
        w
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        let zero_mac = [0u8; 6];
        put_u32(out, self.wildcards());
        put_u16(out, self.in_port.unwrap_or(0));
        out.extend_from_slice(self.dl_src.as_ref().map_or(&zero_mac, |m| &m.0));
        out.extend_from_slice(self.dl_dst.as_ref().map_or(&zero_mac, |m| &m.0));
        put_u16(out, 0); // dl_vlan
        out.push(0); // dl_vlan_pcp
        put_zeros(out, 1);
        put_u16(out, self.dl_type.unwrap_or(0));
        out.push(0); // nw_tos
        out.push(self.nw_proto.unwrap_or(0));
        put_zeros(out, 2);
        put_u32(out, self.nw_src.map_or(0, u32::from));
        put_u32(out, self.nw_dst.map_or(0, u32::from));
        put_u16(out, 0); // tp_src
        put_u16(out, 0); // tp_dst
    }

    pub(crate) fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let w = r.u32()?;
        let in_port = r.u16()?;
        let dl_src = r.array::<6>()?;
        let dl_dst = r.array::<6>()?;
        r.skip(4)?; // dl_vlan, dl_vlan_pcp, pad
        let dl_type = r.u16()?;
        r.skip(1)?; // nw_tos
        let nw_proto = r.u8()?;
        r.skip(2)?;
        let nw_src = r.u32()?;
        let nw_dst = r.u32()?;
        r.skip(4)?; // tp_src, tp_dst

        let exact = |bit: u32| w & bit == 0;
        Ok(Self {
            in_port: exact(OFPFW_IN_PORT).then_some(in_port),
            dl_src: exact(OFPFW_DL_SRC).then_some(EthernetAddress(dl_src)),
            dl_dst: exact(OFPFW_DL_DST).then_some(EthernetAddress(dl_dst)),
            dl_type: exact(OFPFW_DL_TYPE).then_some(dl_type),
            nw_proto: exact(OFPFW_NW_PROTO).then_some(nw_proto),
            nw_src: exact(OFPFW_NW_SRC_MASK).then(|| Ipv4Addr::from(nw_src)),
            nw_dst: exact(OFPFW_NW_DST_MASK).then(|| Ipv4Addr::from(nw_dst)),
        })
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut field = |f: &mut fmt::Formatter<'_>, name: &str, value: &dyn fmt::Display| {
            let sep = if first { "" } else { "," };
            first = false;
            write!(f, "{}{}={}", sep, name, value)
        };

        if let Some(v) = self.in_port {
            field(f, "in_port", &v)?;
        }
        if let Some(v) = self.dl_src {
            field(f, "dl_src", &v)?;
        }
        if let Some(v) = self.dl_dst {
            field(f, "dl_dst", &v)?;
        }
        if let Some(v) = self.dl_type {
            field(f, "dl_type", &format_args!("{:#06x}", v))?;
        }
        if let Some(v) = self.nw_proto {
            field(f, "nw_proto", &v)?;
        }
        if let Some(v) = self.nw_src {
            field(f, "nw_src", &v)?;
        }
        if let Some(v) = self.nw_dst {
            field(f, "nw_dst", &v)?;
        }
        if first {
            write!(f, "*")?;
        }
        Ok(())
    }
}
