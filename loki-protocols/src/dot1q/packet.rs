//! 802.1Q tag stack codec
//!
//! ```text
//! | PCP (3) | DEI (1) | VID (12) | next ethertype (16) |
//! ```
//!
//! The outer TPID is the frame's own ethertype. Each tag carries the type of
//! what follows it, so a stack continues while that type is 0x8100.

use bytes::{Buf, BufMut, BytesMut};
use loki_core::{ethertypes, Error, MacAddr, Result};
use loki_packet::{EtherType, EthernetFrame};
use std::fmt;

pub const TAG_LEN: usize = 4;
pub const VLAN_ID_MAX: u16 = 0x0FFF;

/// Tag control information of one tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VlanTag {
    /// 12 bits
    pub id: u16,
    /// 3 bits
    pub priority: u8,
    pub drop_eligible: bool,
}

impl VlanTag {
    pub fn new(id: u16, priority: u8) -> Self {
        Self {
            id: id & VLAN_ID_MAX,
            priority: priority & 0x07,
            drop_eligible: false,
        }
    }

    pub fn from_u16(tci: u16) -> Self {
        Self {
            id: tci & VLAN_ID_MAX,
            priority: (tci >> 13) as u8,
            drop_eligible: tci & 0x1000 != 0,
        }
    }

    pub fn to_u16(&self) -> u16 {
        ((self.priority as u16 & 0x07) << 13)
            | ((self.drop_eligible as u16) << 12)
            | (self.id & VLAN_ID_MAX)
    }
}

impl fmt::Display for VlanTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vlan {} prio {}", self.id, self.priority)
    }
}

/// Tags of one frame, outermost first, and the ethertype below them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagStack {
    pub tags: Vec<VlanTag>,
    pub ethertype: u16,
}

impl TagStack {
    pub fn new(tags: Vec<VlanTag>, ethertype: u16) -> Self {
        Self { tags, ethertype }
    }

    /// Decode the payload of an 802.1Q frame; returns the stack and what
    /// follows the innermost tag
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8])> {
        let mut buf = data;
        let mut tags = Vec::new();
        loop {
            if buf.len() < TAG_LEN {
                return Err(Error::truncated(
                    "802.1Q tag stack",
                    (tags.len() + 1) * TAG_LEN,
                    data.len(),
                ));
            }
            tags.push(VlanTag::from_u16(buf.get_u16()));
            let next = buf.get_u16();
            if next != ethertypes::DOT1Q {
                return Ok((Self::new(tags, next), buf));
            }
        }
    }

    pub fn ids(&self) -> Vec<u16> {
        self.tags.iter().map(|t| t.id).collect()
    }

    /// Tagged frame carrying `payload` below this stack
    pub fn to_frame(&self, dst: MacAddr, src: MacAddr, payload: &[u8]) -> Result<Vec<u8>> {
        if self.tags.is_empty() {
            return Err(Error::construction("empty 802.1Q tag stack"));
        }
        let mut body = BytesMut::with_capacity(self.tags.len() * TAG_LEN + payload.len());
        let last = self.tags.len() - 1;
        for (i, tag) in self.tags.iter().enumerate() {
            body.put_u16(tag.to_u16());
            body.put_u16(if i == last { self.ethertype } else { ethertypes::DOT1Q });
        }
        body.put_slice(payload);
        let ethertype = EtherType::Custom(ethertypes::DOT1Q);
        Ok(EthernetFrame::new(dst, src, ethertype, body.to_vec()).to_bytes())
    }
}

impl fmt::Display for TagStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.tags.iter().map(|t| t.id.to_string()).collect();
        write!(f, "[{}] 0x{:04x}", ids.join(" / "), self.ethertype)
    }
}
