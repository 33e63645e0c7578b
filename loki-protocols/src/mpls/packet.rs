//! MPLS label stack codec
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                Label                  | Exp |S|       TTL     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Entries repeat until one has the bottom-of-stack bit set.

use bytes::{Buf, BufMut, BytesMut};
use loki_core::{ethertypes, Error, MacAddr, Result};
use loki_packet::{EtherType, EthernetFrame};
use std::fmt;

pub const LABEL_MAX: u32 = 0xF_FFFF;
pub const ENTRY_LEN: usize = 4;

/// One 32-bit label stack entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelEntry {
    /// 20 bits
    pub label: u32,
    /// 3 bits
    pub exp: u8,
    pub bottom_of_stack: bool,
    pub ttl: u8,
}

impl LabelEntry {
    pub fn new(label: u32, exp: u8, bottom_of_stack: bool, ttl: u8) -> Self {
        Self {
            label: label & LABEL_MAX,
            exp: exp & 0x07,
            bottom_of_stack,
            ttl,
        }
    }

    pub fn from_u32(word: u32) -> Self {
        Self {
            label: (word & 0xFFFF_F000) >> 12,
            exp: ((word & 0x0000_0E00) >> 9) as u8,
            bottom_of_stack: word & 0x0000_0100 != 0,
            ttl: (word & 0xFF) as u8,
        }
    }

    pub fn to_u32(&self) -> u32 {
        ((self.label & LABEL_MAX) << 12)
            | (((self.exp & 0x07) as u32) << 9)
            | ((self.bottom_of_stack as u32) << 8)
            | self.ttl as u32
    }
}

impl fmt::Display for LabelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "label {} exp {} ttl {}", self.label, self.exp, self.ttl)?;
        if self.bottom_of_stack {
            write!(f, " bos")?;
        }
        Ok(())
    }
}

/// A label stack, outermost entry first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelStack {
    pub entries: Vec<LabelEntry>,
}

impl LabelStack {
    /// Build a stack from `(label, exp, ttl)` triples; the bottom-of-stack bit
    /// is set on the last entry only
    pub fn from_labels(labels: &[(u32, u8, u8)]) -> Self {
        let last = labels.len().saturating_sub(1);
        Self {
            entries: labels
                .iter()
                .enumerate()
                .map(|(i, &(label, exp, ttl))| LabelEntry::new(label, exp, i == last, ttl))
                .collect(),
        }
    }

    /// Decode entries until bottom of stack; returns the stack and the payload
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8])> {
        let mut buf = data;
        let mut entries = Vec::new();
        loop {
            if buf.len() < ENTRY_LEN {
                return Err(Error::truncated(
                    "mpls label stack",
                    (entries.len() + 1) * ENTRY_LEN,
                    data.len(),
                ));
            }
            let entry = LabelEntry::from_u32(buf.get_u32());
            entries.push(entry);
            if entry.bottom_of_stack {
                return Ok((Self { entries }, buf));
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.entries.len() * ENTRY_LEN);
        for entry in &self.entries {
            buf.put_u32(entry.to_u32());
        }
        buf.to_vec()
    }

    pub fn labels(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.label).collect()
    }

    /// Unicast MPLS frame carrying `payload` below this stack
    pub fn to_frame(&self, dst: MacAddr, src: MacAddr, payload: &[u8]) -> Result<Vec<u8>> {
        if self.entries.is_empty() {
            return Err(Error::construction("empty MPLS label stack"));
        }
        let mut body = self.to_bytes();
        body.extend_from_slice(payload);
        Ok(EthernetFrame::new(dst, src, EtherType::MPLS, body).to_bytes())
    }
}

impl fmt::Display for LabelStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.entries.iter().map(|e| e.label.to_string()).collect();
        write!(f, "[{}]", labels.join(" / "))
    }
}

/// True for the unicast and multicast MPLS ethertypes
pub fn is_mpls(ethertype: u16) -> bool {
    ethertype == ethertypes::MPLS_UNICAST || ethertype == ethertypes::MPLS_MULTICAST
}
