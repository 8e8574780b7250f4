//! Defines core types in the data model: the node inventory and the values reported into it

use crate::{AttributeId, ClusterId, EndpointId, NodeId};

pub mod device;
pub mod device_type;
pub mod endpoint;
pub mod node;
pub mod registry;

pub use device::{Device, DeviceChange, DeviceDelegate, DeviceHandle, DeviceState};
pub use device_type::DeviceType;
pub use endpoint::Endpoint;
pub use node::Node;
pub use registry::{Inventory, NodeRegistry};

/// The root endpoint, which carries the descriptor parts list
pub const ROOT_ENDPOINT_ID: EndpointId = 0;

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Boolean(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    Utf8(String),
}

impl AttributeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Boolean(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::U8(v) => Some(v as u64),
            Self::U16(v) => Some(v as u64),
            Self::U32(v) => Some(v as u64),
            Self::U64(v) => Some(v),
            Self::I8(v) if v >= 0 => Some(v as u64),
            Self::I16(v) if v >= 0 => Some(v as u64),
            Self::I32(v) if v >= 0 => Some(v as u64),
            Self::I64(v) if v >= 0 => Some(v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::I8(v) => Some(v as i64),
            Self::I16(v) => Some(v as i64),
            Self::I32(v) => Some(v as i64),
            Self::I64(v) => Some(v),
            Self::U8(v) => Some(v as i64),
            Self::U16(v) => Some(v as i64),
            Self::U32(v) => Some(v as i64),
            Self::U64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Self::F32(v) => Some(v),
            _ => self.as_i64().map(|v| v as f32),
        }
    }

    /// Narrowing conversions that fail instead of wrapping
    pub fn as_u8(&self) -> Option<u8> {
        self.as_u64().and_then(|v| u8::try_from(v).ok())
    }

    pub fn as_u16(&self) -> Option<u16> {
        self.as_u64().and_then(|v| u16::try_from(v).ok())
    }

    pub fn as_i16(&self) -> Option<i16> {
        self.as_i64().and_then(|v| i16::try_from(v).ok())
    }
}

/// Concrete path to an attribute on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributePath {
    pub node_id: NodeId,
    pub endpoint_id: EndpointId,
    pub cluster_id: ClusterId,
    pub attribute_id: AttributeId,
}

/// A value pushed by a subscription or returned from a read
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeReport {
    pub path: AttributePath,
    pub value: AttributeValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_value_narrowing() {
        assert_eq!(AttributeValue::U32(300).as_u8(), None);
        assert_eq!(AttributeValue::U32(200).as_u8(), Some(200));
        assert_eq!(AttributeValue::I64(-5).as_u64(), None);
        assert_eq!(AttributeValue::I64(-5).as_i16(), Some(-5));
        assert_eq!(AttributeValue::U16(415).as_f32(), Some(415.0));
        assert_eq!(AttributeValue::Boolean(true).as_u64(), None);
    }
}
