//! Bridges a Matter fabric to an MQTT broker.
//!
//! Inbound MQTT requests are routed into commands, which are executed one at a time
//! against the fabric. Attribute reports from the fabric update the node inventory,
//! and every actual change is published back to the broker.

#[macro_use]
extern crate num_derive;

pub mod cache;
/// Cluster identifiers and attribute/command enumerations
pub mod cluster;
pub mod command;
pub mod data_model;
pub mod gateway;
pub mod notifier;
pub mod outbox;
pub mod protocol;
pub mod router;
pub mod status;
pub mod tlv;
pub mod util;

pub use gateway::{Gateway, GatewayConfig};

/// Operational node identifier on a fabric
pub type NodeId = u64;
pub type EndpointId = u16;
pub type ClusterId = u32;
pub type AttributeId = u32;
pub type DeviceTypeId = u32;
pub type FabricIndex = u8;
