//! Matter TLV (Appendix A) encoding and a flat, container-aware reader.

use bytes::{Buf, BufMut, BytesMut};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TlvError {
    #[error("buffer ended while reading {0}")]
    Truncated(&'static str),
    #[error("unsupported element type 0x{0:02X}")]
    UnsupportedType(u8),
    #[error("length {0} exceeds the remaining buffer")]
    LengthOverflow(u64),
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementSize {
    Byte1,
    Byte2,
    Byte4,
    Byte8,
}

impl ElementSize {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Byte1,
            1 => Self::Byte2,
            2 => Self::Byte4,
            _ => Self::Byte8,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::Byte1 => 0,
            Self::Byte2 => 1,
            Self::Byte4 => 2,
            Self::Byte8 => 3,
        }
    }

    pub fn len(self) -> usize {
        match self {
            Self::Byte1 => 1,
            Self::Byte2 => 2,
            Self::Byte4 => 4,
            Self::Byte8 => 8,
        }
    }

    /// The smallest size that can hold `value`
    pub fn for_unsigned(value: u64) -> Self {
        if value <= u8::MAX as u64 {
            Self::Byte1
        } else if value <= u16::MAX as u64 {
            Self::Byte2
        } else if value <= u32::MAX as u64 {
            Self::Byte4
        } else {
            Self::Byte8
        }
    }

    pub fn for_signed(value: i64) -> Self {
        if i8::try_from(value).is_ok() {
            Self::Byte1
        } else if i16::try_from(value).is_ok() {
            Self::Byte2
        } else if i32::try_from(value).is_ok() {
            Self::Byte4
        } else {
            Self::Byte8
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlvType {
    SignedInt(ElementSize),
    UnsignedInt(ElementSize),
    Boolean(bool),
    Float,
    Double,
    /// UTF-8 string, with the width of the length field and the length
    String(ElementSize, usize),
    ByteString(ElementSize, usize),
    Null,
    Structure,
    Array,
    List,
    EndOfContainer,
}

impl TlvType {
    fn bits(&self) -> u8 {
        match self {
            Self::SignedInt(size) => size.bits(),
            Self::UnsignedInt(size) => 0x04 | size.bits(),
            Self::Boolean(false) => 0x08,
            Self::Boolean(true) => 0x09,
            Self::Float => 0x0A,
            Self::Double => 0x0B,
            Self::String(size, _) => 0x0C | size.bits(),
            Self::ByteString(size, _) => 0x10 | size.bits(),
            Self::Null => 0x14,
            Self::Structure => 0x15,
            Self::Array => 0x16,
            Self::List => 0x17,
            Self::EndOfContainer => 0x18,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Self::Structure | Self::Array | Self::List)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagControl {
    Anonymous,
    ContextSpecific(u8),
    CommonProfile(u32),
    ImplicitProfile(u32),
    FullyQualified { vendor_id: u16, profile: u16, tag: u32 },
}

impl TagControl {
    fn bits(&self) -> u8 {
        let form = match self {
            Self::Anonymous => 0,
            Self::ContextSpecific(_) => 1,
            Self::CommonProfile(tag) if *tag <= u16::MAX as u32 => 2,
            Self::CommonProfile(_) => 3,
            Self::ImplicitProfile(tag) if *tag <= u16::MAX as u32 => 4,
            Self::ImplicitProfile(_) => 5,
            Self::FullyQualified { tag, .. } if *tag <= u16::MAX as u32 => 6,
            Self::FullyQualified { .. } => 7,
        };
        form << 5
    }

    fn put(&self, buf: &mut BytesMut) {
        match *self {
            Self::Anonymous => {}
            Self::ContextSpecific(tag) => buf.put_u8(tag),
            Self::CommonProfile(tag) | Self::ImplicitProfile(tag) => {
                if tag <= u16::MAX as u32 {
                    buf.put_u16_le(tag as u16)
                } else {
                    buf.put_u32_le(tag)
                }
            }
            Self::FullyQualified {
                vendor_id,
                profile,
                tag,
            } => {
                buf.put_u16_le(vendor_id);
                buf.put_u16_le(profile);
                if tag <= u16::MAX as u32 {
                    buf.put_u16_le(tag as u16)
                } else {
                    buf.put_u32_le(tag)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TagLengthValue {
    Signed8(i8),
    Signed16(i16),
    Signed32(i32),
    Signed64(i64),
    Unsigned8(u8),
    Unsigned16(u16),
    Unsigned32(u32),
    Unsigned64(u64),
    Boolean(bool),
    Float(f32),
    Double(f64),
    String(String),
    ByteString(Vec<u8>),
    Null,
    Container,
    EndOfContainer,
}

impl TagLengthValue {
    /// Any unsigned integer width, widened
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::Unsigned8(v) => Some(v as u64),
            Self::Unsigned16(v) => Some(v as u64),
            Self::Unsigned32(v) => Some(v as u64),
            Self::Unsigned64(v) => Some(v),
            _ => None,
        }
    }

    /// Any signed integer width, widened
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Signed8(v) => Some(v as i64),
            Self::Signed16(v) => Some(v as i64),
            Self::Signed32(v) => Some(v as i64),
            Self::Signed64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Encodes TLV elements into a growable buffer
#[derive(Debug, Default)]
pub struct Encoder {
    inner: BytesMut,
}

impl Encoder {
    /// Write an element. The integer width is taken from `tlv_type`, the value is
    /// truncated to that width.
    pub fn write(&mut self, tlv_type: TlvType, tag: TagControl, value: TagLengthValue) {
        self.inner.put_u8(tag.bits() | tlv_type.bits());
        tag.put(&mut self.inner);
        match (tlv_type, value) {
            (TlvType::UnsignedInt(size), value) => {
                let v = value
                    .as_u64()
                    .or_else(|| value.as_i64().map(|v| v as u64))
                    .unwrap_or_default();
                put_sized(&mut self.inner, size, v);
            }
            (TlvType::SignedInt(size), value) => {
                let v = value
                    .as_i64()
                    .or_else(|| value.as_u64().map(|v| v as i64))
                    .unwrap_or_default();
                put_sized(&mut self.inner, size, v as u64);
            }
            (TlvType::Float, TagLengthValue::Float(v)) => self.inner.put_f32_le(v),
            (TlvType::Double, TagLengthValue::Double(v)) => self.inner.put_f64_le(v),
            (TlvType::String(size, _), TagLengthValue::String(s)) => {
                put_sized(&mut self.inner, size, s.len() as u64);
                self.inner.put_slice(s.as_bytes());
            }
            (TlvType::ByteString(size, _), TagLengthValue::ByteString(b)) => {
                put_sized(&mut self.inner, size, b.len() as u64);
                self.inner.put_slice(&b);
            }
            // Booleans, null and containers carry no value bytes
            _ => {}
        }
    }

    pub fn put_unsigned(&mut self, tag: TagControl, value: u64) {
        self.write(
            TlvType::UnsignedInt(ElementSize::for_unsigned(value)),
            tag,
            TagLengthValue::Unsigned64(value),
        );
    }

    pub fn put_signed(&mut self, tag: TagControl, value: i64) {
        self.write(
            TlvType::SignedInt(ElementSize::for_signed(value)),
            tag,
            TagLengthValue::Signed64(value),
        );
    }

    pub fn put_str(&mut self, tag: TagControl, value: &str) {
        self.write(
            TlvType::String(ElementSize::for_unsigned(value.len() as u64), value.len()),
            tag,
            TagLengthValue::String(value.to_string()),
        );
    }

    pub fn start_structure(&mut self, tag: TagControl) {
        self.write(TlvType::Structure, tag, TagLengthValue::Container);
    }

    pub fn start_array(&mut self, tag: TagControl) {
        self.write(TlvType::Array, tag, TagLengthValue::Container);
    }

    pub fn end_container(&mut self) {
        self.write(
            TlvType::EndOfContainer,
            TagControl::Anonymous,
            TagLengthValue::EndOfContainer,
        );
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn inner(self) -> Vec<u8> {
        self.inner.to_vec()
    }
}

fn put_sized(buf: &mut BytesMut, size: ElementSize, value: u64) {
    match size {
        ElementSize::Byte1 => buf.put_u8(value as u8),
        ElementSize::Byte2 => buf.put_u16_le(value as u16),
        ElementSize::Byte4 => buf.put_u32_le(value as u32),
        ElementSize::Byte8 => buf.put_u64_le(value),
    }
}

/// A single decoded element
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    control: TagControl,
    tlv_type: TlvType,
    value: TagLengthValue,
    /// Container nesting depth at which the element was read, 0 for the outermost
    depth: usize,
}

impl Element {
    pub fn get_control(&self) -> TagControl {
        self.control
    }

    pub fn get_type(&self) -> TlvType {
        self.tlv_type
    }

    pub fn get_value(&self) -> &TagLengthValue {
        &self.value
    }

    pub fn into_value(self) -> TagLengthValue {
        self.value
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Reads elements one at a time, tracking container depth
pub struct TlvReader<'a> {
    data: &'a [u8],
    depth: usize,
}

impl<'a> TlvReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, depth: 0 }
    }

    /// The number of containers currently open
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    pub fn next_element(&mut self) -> Result<Option<Element>, TlvError> {
        if !self.data.has_remaining() {
            return Ok(None);
        }
        let control_byte = self.data.get_u8();
        let control = self.read_tag(control_byte >> 5)?;
        let type_bits = control_byte & 0x1F;
        let (tlv_type, value) = match type_bits {
            0x00..=0x03 => {
                let size = ElementSize::from_bits(type_bits);
                let raw = self.read_sized(size, "signed integer")?;
                let value = match size {
                    ElementSize::Byte1 => TagLengthValue::Signed8(raw as u8 as i8),
                    ElementSize::Byte2 => TagLengthValue::Signed16(raw as u16 as i16),
                    ElementSize::Byte4 => TagLengthValue::Signed32(raw as u32 as i32),
                    ElementSize::Byte8 => TagLengthValue::Signed64(raw as i64),
                };
                (TlvType::SignedInt(size), value)
            }
            0x04..=0x07 => {
                let size = ElementSize::from_bits(type_bits);
                let raw = self.read_sized(size, "unsigned integer")?;
                let value = match size {
                    ElementSize::Byte1 => TagLengthValue::Unsigned8(raw as u8),
                    ElementSize::Byte2 => TagLengthValue::Unsigned16(raw as u16),
                    ElementSize::Byte4 => TagLengthValue::Unsigned32(raw as u32),
                    ElementSize::Byte8 => TagLengthValue::Unsigned64(raw),
                };
                (TlvType::UnsignedInt(size), value)
            }
            0x08 => (TlvType::Boolean(false), TagLengthValue::Boolean(false)),
            0x09 => (TlvType::Boolean(true), TagLengthValue::Boolean(true)),
            0x0A => {
                self.ensure(4, "float")?;
                (TlvType::Float, TagLengthValue::Float(self.data.get_f32_le()))
            }
            0x0B => {
                self.ensure(8, "double")?;
                (TlvType::Double, TagLengthValue::Double(self.data.get_f64_le()))
            }
            0x0C..=0x0F => {
                let size = ElementSize::from_bits(type_bits);
                let bytes = self.read_length_prefixed(size)?;
                let s = String::from_utf8(bytes).map_err(|_| TlvError::InvalidUtf8)?;
                (TlvType::String(size, s.len()), TagLengthValue::String(s))
            }
            0x10..=0x13 => {
                let size = ElementSize::from_bits(type_bits);
                let bytes = self.read_length_prefixed(size)?;
                (
                    TlvType::ByteString(size, bytes.len()),
                    TagLengthValue::ByteString(bytes),
                )
            }
            0x14 => (TlvType::Null, TagLengthValue::Null),
            0x15 => (TlvType::Structure, TagLengthValue::Container),
            0x16 => (TlvType::Array, TagLengthValue::Container),
            0x17 => (TlvType::List, TagLengthValue::Container),
            0x18 => (TlvType::EndOfContainer, TagLengthValue::EndOfContainer),
            t => return Err(TlvError::UnsupportedType(t)),
        };

        // An end marker sits at the depth of the container it closes
        if tlv_type == TlvType::EndOfContainer {
            self.depth = self.depth.saturating_sub(1);
        }
        let depth = self.depth;
        if tlv_type.is_container() {
            self.depth += 1;
        }

        Ok(Some(Element {
            control,
            tlv_type,
            value,
            depth,
        }))
    }

    fn ensure(&self, len: usize, what: &'static str) -> Result<(), TlvError> {
        if self.data.remaining() < len {
            Err(TlvError::Truncated(what))
        } else {
            Ok(())
        }
    }

    fn read_sized(&mut self, size: ElementSize, what: &'static str) -> Result<u64, TlvError> {
        self.ensure(size.len(), what)?;
        Ok(match size {
            ElementSize::Byte1 => self.data.get_u8() as u64,
            ElementSize::Byte2 => self.data.get_u16_le() as u64,
            ElementSize::Byte4 => self.data.get_u32_le() as u64,
            ElementSize::Byte8 => self.data.get_u64_le(),
        })
    }

    fn read_length_prefixed(&mut self, size: ElementSize) -> Result<Vec<u8>, TlvError> {
        let len = self.read_sized(size, "length")?;
        if len > self.data.remaining() as u64 {
            return Err(TlvError::LengthOverflow(len));
        }
        let len = len as usize;
        let bytes = self.data[..len].to_vec();
        self.data.advance(len);
        Ok(bytes)
    }

    fn read_tag(&mut self, form: u8) -> Result<TagControl, TlvError> {
        Ok(match form {
            0 => TagControl::Anonymous,
            1 => {
                self.ensure(1, "context tag")?;
                TagControl::ContextSpecific(self.data.get_u8())
            }
            2 => TagControl::CommonProfile(self.read_sized(ElementSize::Byte2, "tag")? as u32),
            3 => TagControl::CommonProfile(self.read_sized(ElementSize::Byte4, "tag")? as u32),
            4 => TagControl::ImplicitProfile(self.read_sized(ElementSize::Byte2, "tag")? as u32),
            5 => TagControl::ImplicitProfile(self.read_sized(ElementSize::Byte4, "tag")? as u32),
            _ => {
                let vendor_id = self.read_sized(ElementSize::Byte2, "vendor id")? as u16;
                let profile = self.read_sized(ElementSize::Byte2, "profile")? as u16;
                let tag_size = if form == 6 {
                    ElementSize::Byte2
                } else {
                    ElementSize::Byte4
                };
                let tag = self.read_sized(tag_size, "tag")? as u32;
                TagControl::FullyQualified {
                    vendor_id,
                    profile,
                    tag,
                }
            }
        })
    }
}

/// Decode every element in `data`
pub fn decode(data: &[u8]) -> Result<Vec<Element>, TlvError> {
    let mut reader = TlvReader::new(data);
    let mut elements = vec![];
    while let Some(element) = reader.next_element()? {
        elements.push(element);
    }
    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_encode_structure() {
        let mut encoder = Encoder::default();
        encoder.start_structure(TagControl::Anonymous);
        encoder.put_unsigned(TagControl::ContextSpecific(1), 42);
        encoder.put_unsigned(TagControl::ContextSpecific(2), 0x1234);
        encoder.put_str(TagControl::ContextSpecific(16), "ab");
        encoder.start_array(TagControl::ContextSpecific(3));
        encoder.end_container();
        encoder.end_container();

        assert_eq!(
            encoder.inner(),
            hex!("15 24 01 2A 25 02 34 12 2C 10 02 61 62 36 03 18 18").to_vec()
        );
    }

    #[test]
    fn test_decode_tracks_depth() {
        let elements = decode(&hex!("15 24 01 2A 36 03 24 07 05 18 18")).unwrap();
        assert_eq!(elements.len(), 6);
        assert_eq!(elements[0].get_type(), TlvType::Structure);
        assert_eq!(elements[1].get_control(), TagControl::ContextSpecific(1));
        assert_eq!(elements[1].get_value().as_u64(), Some(42));
        assert_eq!(elements[1].depth(), 1);
        assert_eq!(elements[3].depth(), 2);
        assert_eq!(elements[4].get_type(), TlvType::EndOfContainer);
        assert_eq!(elements[4].depth(), 1);
        assert_eq!(elements[5].depth(), 0);
    }

    #[test]
    fn test_signed_values() {
        let mut encoder = Encoder::default();
        encoder.put_signed(TagControl::ContextSpecific(15), -2);
        encoder.put_signed(TagControl::ContextSpecific(15), 1_700_000_000_000);
        let data = encoder.inner();
        let elements = decode(&data).unwrap();
        assert_eq!(elements[0].get_type(), TlvType::SignedInt(ElementSize::Byte1));
        assert_eq!(elements[0].get_value().as_i64(), Some(-2));
        assert_eq!(elements[1].get_value().as_i64(), Some(1_700_000_000_000));
    }

    #[test]
    fn test_truncated_input() {
        // u16 with a single value byte
        assert_eq!(
            decode(&hex!("25 01 34")),
            Err(TlvError::Truncated("unsigned integer"))
        );
        // string claiming 5 bytes
        assert_eq!(decode(&hex!("2C 10 05 61")), Err(TlvError::LengthOverflow(5)));
    }

    #[test]
    fn test_unsupported_type() {
        assert_eq!(decode(&hex!("1F")), Err(TlvError::UnsupportedType(0x1F)));
    }

    #[test]
    fn test_profile_tags() {
        let mut encoder = Encoder::default();
        encoder.write(
            TlvType::Boolean(true),
            TagControl::FullyQualified {
                vendor_id: 0xFFF1,
                profile: 0xDEED,
                tag: 1,
            },
            TagLengthValue::Boolean(true),
        );
        let data = encoder.inner();
        assert_eq!(data, hex!("C9 F1 FF ED DE 01 00").to_vec());
        let elements = decode(&data).unwrap();
        assert_eq!(elements[0].get_value(), &TagLengthValue::Boolean(true));
    }
}
