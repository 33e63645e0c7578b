//! Generic type-length-value codec
//!
//! Protocols differ only in the width of the type and length fields and in
//! whether the length counts the header. A [`TlvCodec`] captures those three
//! choices; parsing and rendering are otherwise identical. Values stay opaque
//! [`Bytes`], and a value that itself holds TLVs is decoded on demand with
//! [`RawTlv::children`] so nesting is preserved rather than flattened.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use loki_core::{Error, Result};

/// Width of a TLV header field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    U8,
    U16,
}

impl FieldWidth {
    fn len(self) -> usize {
        match self {
            FieldWidth::U8 => 1,
            FieldWidth::U16 => 2,
        }
    }

    fn max(self) -> usize {
        match self {
            FieldWidth::U8 => u8::MAX as usize,
            FieldWidth::U16 => u16::MAX as usize,
        }
    }

    fn get(self, buf: &mut impl Buf) -> usize {
        match self {
            FieldWidth::U8 => buf.get_u8() as usize,
            FieldWidth::U16 => buf.get_u16() as usize,
        }
    }

    fn put(self, buf: &mut impl BufMut, value: usize) {
        match self {
            FieldWidth::U8 => buf.put_u8(value as u8),
            FieldWidth::U16 => buf.put_u16(value as u16),
        }
    }
}

/// TLV framing rules of one protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvCodec {
    pub type_width: FieldWidth,
    pub length_width: FieldWidth,
    /// Length field counts the type and length bytes too
    pub length_includes_header: bool,
}

impl TlvCodec {
    /// DTP: 16-bit type, 16-bit length including the header
    pub const DTP: TlvCodec = TlvCodec {
        type_width: FieldWidth::U16,
        length_width: FieldWidth::U16,
        length_includes_header: true,
    };

    /// EIGRP: same framing as DTP
    pub const EIGRP: TlvCodec = TlvCodec {
        type_width: FieldWidth::U16,
        length_width: FieldWidth::U16,
        length_includes_header: true,
    };

    /// IS-IS: 8-bit type, 8-bit length of the value only
    pub const ISIS: TlvCodec = TlvCodec {
        type_width: FieldWidth::U8,
        length_width: FieldWidth::U8,
        length_includes_header: false,
    };

    pub fn header_len(&self) -> usize {
        self.type_width.len() + self.length_width.len()
    }

    /// Largest value this framing can carry
    pub fn max_value_len(&self) -> usize {
        if self.length_includes_header {
            self.length_width.max() - self.header_len()
        } else {
            self.length_width.max()
        }
    }

    /// Parse one TLV off the front of `data`, returning it and the remainder
    pub fn parse<'a>(&self, data: &'a [u8]) -> Result<(RawTlv, &'a [u8])> {
        let header_len = self.header_len();
        if data.len() < header_len {
            return Err(Error::truncated("tlv header", header_len, data.len()));
        }

        let mut cursor = data;
        let tlv_type = self.type_width.get(&mut cursor) as u16;
        let length = self.length_width.get(&mut cursor);

        let value_len = if self.length_includes_header {
            length.checked_sub(header_len).ok_or_else(|| {
                Error::parsing(format!(
                    "tlv type {} length {} shorter than its header",
                    tlv_type, length
                ))
            })?
        } else {
            length
        };

        if cursor.len() < value_len {
            return Err(Error::truncated("tlv value", value_len, cursor.len()));
        }

        let value = Bytes::copy_from_slice(&cursor[..value_len]);
        Ok((RawTlv { tlv_type, value }, &cursor[value_len..]))
    }

    /// Parse a complete TLV stream
    pub fn parse_all(&self, mut data: &[u8]) -> Result<Vec<RawTlv>> {
        let mut tlvs = Vec::new();
        while !data.is_empty() {
            let (tlv, rest) = self.parse(data)?;
            tlvs.push(tlv);
            data = rest;
        }
        Ok(tlvs)
    }

    /// Append one TLV to `buf`, computing its length field
    pub fn render(&self, tlv: &RawTlv, buf: &mut impl BufMut) -> Result<()> {
        if tlv.value.len() > self.max_value_len() {
            return Err(Error::construction(format!(
                "tlv type {} value of {} bytes exceeds {}",
                tlv.tlv_type,
                tlv.value.len(),
                self.max_value_len()
            )));
        }
        if tlv.tlv_type as usize > self.type_width.max() {
            return Err(Error::construction(format!(
                "tlv type {} does not fit the type field",
                tlv.tlv_type
            )));
        }

        let length = if self.length_includes_header {
            tlv.value.len() + self.header_len()
        } else {
            tlv.value.len()
        };
        self.type_width.put(buf, tlv.tlv_type as usize);
        self.length_width.put(buf, length);
        buf.put_slice(&tlv.value);
        Ok(())
    }

    /// Render a TLV stream
    pub fn render_all(&self, tlvs: &[RawTlv]) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(
            tlvs.iter().map(|t| t.value.len() + self.header_len()).sum(),
        );
        for tlv in tlvs {
            self.render(tlv, &mut buf)?;
        }
        Ok(buf.freeze())
    }
}

/// A TLV with an opaque value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTlv {
    pub tlv_type: u16,
    pub value: Bytes,
}

impl RawTlv {
    pub fn new(tlv_type: u16, value: impl Into<Bytes>) -> Self {
        Self {
            tlv_type,
            value: value.into(),
        }
    }

    /// Build a TLV whose value is itself a TLV stream
    pub fn nested(tlv_type: u16, codec: &TlvCodec, children: &[RawTlv]) -> Result<Self> {
        Ok(Self {
            tlv_type,
            value: codec.render_all(children)?,
        })
    }

    /// Decode the value as a nested TLV stream
    pub fn children(&self, codec: &TlvCodec) -> Result<Vec<RawTlv>> {
        codec.parse_all(&self.value)
    }

    /// Decode nested TLVs that follow a fixed-size prefix inside the value
    pub fn children_after(&self, codec: &TlvCodec, prefix: usize) -> Result<Vec<RawTlv>> {
        let rest = self
            .value
            .get(prefix..)
            .ok_or_else(|| Error::truncated("nested tlv prefix", prefix, self.value.len()))?;
        codec.parse_all(rest)
    }
}

/// First TLV of the given type
pub fn find(tlvs: &[RawTlv], tlv_type: u16) -> Option<&RawTlv> {
    tlvs.iter().find(|t| t.tlv_type == tlv_type)
}
