//! Topic layout. Everything except the gateway presence topics is scoped by the gateway's MAC.

use std::fmt;

pub const GATEWAY_INIT_TOPIC: &str = "home/init";
pub const GATEWAY_WILL_TOPIC: &str = "home/will";

pub const COMMISSIONING_TOPIC: &str = "matter/commissioning";
pub const REMOVE_NODE_TOPIC: &str = "matter/remove_node";
pub const COMMISSIONING_OPEN_TOPIC: &str = "matter/commissioning_open";

pub const REQUEST_SUFFIX: &str = "req";
pub const RESPONSE_SUFFIX: &str = "resp";

pub const DEVICE_SEGMENT: &str = "device";
pub const CONTROL_SEGMENT: &str = "control";
pub const WINDOW_SEGMENT: &str = "window";
pub const POSITION_CONTROL_SEGMENT: &str = "position_control";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topics {
    mac: String,
}

impl Topics {
    pub fn new(mac: impl Into<String>) -> Self {
        Self { mac: mac.into() }
    }

    pub fn mac(&self) -> &str {
        &self.mac
    }

    pub fn commissioning_request(&self) -> String {
        format!("{}/{COMMISSIONING_TOPIC}/{REQUEST_SUFFIX}", self.mac)
    }

    pub fn commissioning_response(&self) -> String {
        format!("{}/{COMMISSIONING_TOPIC}/{RESPONSE_SUFFIX}", self.mac)
    }

    pub fn remove_node_request(&self) -> String {
        format!("{}/{REMOVE_NODE_TOPIC}/{REQUEST_SUFFIX}", self.mac)
    }

    pub fn remove_node_response(&self) -> String {
        format!("{}/{REMOVE_NODE_TOPIC}/{RESPONSE_SUFFIX}", self.mac)
    }

    pub fn commissioning_open_request(&self) -> String {
        format!("{}/{COMMISSIONING_OPEN_TOPIC}/{REQUEST_SUFFIX}", self.mac)
    }

    pub fn commissioning_open_response(&self) -> String {
        format!("{}/{COMMISSIONING_OPEN_TOPIC}/{RESPONSE_SUFFIX}", self.mac)
    }

    /// `<mac>/device/+/control`
    pub fn device_control_filter(&self) -> String {
        format!("{}/{DEVICE_SEGMENT}/+/{CONTROL_SEGMENT}", self.mac)
    }

    /// `<mac>/window/+/position_control`
    pub fn window_control_filter(&self) -> String {
        format!("{}/{WINDOW_SEGMENT}/+/{POSITION_CONTROL_SEGMENT}", self.mac)
    }

    /// All topics the gateway listens on
    pub fn subscriptions(&self) -> Vec<String> {
        vec![
            self.commissioning_request(),
            self.remove_node_request(),
            self.commissioning_open_request(),
            self.device_control_filter(),
            self.window_control_filter(),
        ]
    }

    pub fn device_init(&self) -> String {
        format!("{}/{DEVICE_SEGMENT}/init", self.mac)
    }

    /// Takes the raw topic token when the node id in a request could not be read
    pub fn control_ack(&self, node: impl fmt::Display) -> String {
        format!("{}/{DEVICE_SEGMENT}/{node}/control_ack", self.mac)
    }

    pub fn device_control(&self, node_id: u64) -> String {
        format!("{}/{DEVICE_SEGMENT}/{node_id}/{CONTROL_SEGMENT}", self.mac)
    }

    pub fn measurements(&self, node_id: u64) -> String {
        format!("{}/{DEVICE_SEGMENT}/{node_id}/measurements", self.mac)
    }

    pub fn sensor_measurements(&self, node_id: u64) -> String {
        format!("{}/sensors/{node_id}/measurements", self.mac)
    }

    pub fn subscription_response(&self) -> String {
        format!("{}/matter/subscription/{RESPONSE_SUFFIX}", self.mac)
    }
}
