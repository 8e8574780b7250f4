//! Common data types used by the MQTT gateway and its clients

use serde::{Deserialize, Serialize};

pub mod topics;

pub use topics::Topics;

/// Published once the gateway is connected to the broker
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GatewayInit {
    pub power_on: bool,
    pub gw_mac: String,
}

/// Device families as announced to and addressed by clients
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Window,
    Sensors,
    DoorLock,
    Light,
    Occupancy,
    #[serde(rename = "thermoAccumulator")]
    ThermoAccumulator,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DeviceInit {
    pub power_on: bool,
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: DeviceKind,
}

// Requests

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CommissioningRequest {
    pub code: String,
}

/// Remove node and open commissioning window requests
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NodeRequest {
    pub id: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WindowControl {
    /// 0 (closed) to 100 (open)
    pub pos: u8,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ThermostatControl {
    /// Degrees Celsius
    #[serde(rename = "heatSetpoint")]
    pub heat_setpoint: Option<i16>,
}

// Responses

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CommissioningResponse {
    pub code: String,
    pub status: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RemoveNodeResponse {
    pub id: u64,
    pub status: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CommissioningOpenResponse {
    pub id: u64,
    pub status: String,
    pub manual_code: String,
    pub qr_code: String,
}

/// Acknowledges a window position request
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ControlAck {
    /// `None` when the node id could not be read from the topic
    pub id: Option<u64>,
    pub success: bool,
    pub status: String,
    pub pos: Option<u8>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LightAck {
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    pub success: u8,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SetpointResult {
    pub id: u64,
    /// Degrees Celsius
    pub setpoint: f32,
    pub error: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionResponse {
    pub id: u64,
    pub endpoint: u16,
    /// Formatted as `0x%04X`
    #[serde(rename = "deviceType")]
    pub device_type: String,
    pub status: String,
}

/// A single measurement, published whenever a device attribute changes.
///
/// Serialized flat, e.g. `{"id": 42, "pos": 70}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Measurement {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub reading: Reading,
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Reading {
    /// Percent open
    Pos(u8),
    Occupancy(u8),
    /// Milliwatts
    PowerConsumption(i64),
    /// Lux
    Brightness(u32),
    /// ppm
    Co2(f32),
    CurrentLevel(u8),
    #[serde(rename = "on-off")]
    OnOff(u8),
    /// Degrees
    Hue(u16),
    /// Percent
    Saturation(u8),
    #[serde(rename = "temperatureKelvin")]
    TemperatureKelvin(u32),
    /// Degrees Celsius
    Temperature(f32),
    /// Percent
    Humidity(f32),
    /// Degrees Celsius
    #[serde(rename = "heatSetpoint")]
    HeatSetpoint(f32),
    Door(u8),
}
