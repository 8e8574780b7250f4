//! Classifies inbound MQTT messages into requests for the gateway.
//!
//! Requests that arrive on a topic with a known response channel are answered
//! with `BAD_REQUEST` when they cannot be read. Anything unrecognised becomes
//! [`Request::Unknown`].

use common::{
    topics::{CONTROL_SEGMENT, DEVICE_SEGMENT, POSITION_CONTROL_SEGMENT, WINDOW_SEGMENT},
    CommissioningOpenResponse, CommissioningResponse, ControlAck, NodeRequest,
    RemoveNodeResponse, ThermostatControl, Topics, WindowControl,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    command::{LightFields, LightRequest, LightSettings, SetpointRequest, WindowRequest},
    outbox::Outbox,
    status::GeneralCode,
    NodeId,
};

/// Position in a topic of the node id token, as in `<mac>/device/<id>/control`
const NODE_ID_TOKEN: usize = 2;
const MIN_TOKENS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Commission { setup_code: String },
    RemoveNode { node_id: NodeId },
    OpenCommissioningWindow { node_id: NodeId },
    WindowPosition(WindowRequest),
    Light(LightRequest),
    HeatingSetpoint(SetpointRequest),
    Unknown,
}

pub struct MessageRouter {
    topics: Topics,
    outbox: Outbox,
    commissioning: String,
    remove_node: String,
    commissioning_open: String,
}

impl MessageRouter {
    pub fn new(topics: Topics, outbox: Outbox) -> Self {
        Self {
            commissioning: topics.commissioning_request(),
            remove_node: topics.remove_node_request(),
            commissioning_open: topics.commissioning_open_request(),
            topics,
            outbox,
        }
    }

    pub fn route(&self, topic: &str, payload: &[u8]) -> Request {
        let document = match serde_json::from_slice::<Value>(payload) {
            Ok(document) => Some(document),
            Err(e) => {
                debug!(topic, error = %e, "payload is not JSON");
                None
            }
        };

        if topic == self.commissioning {
            return self.commission(document);
        }
        if topic == self.remove_node {
            return self.remove_node(document);
        }
        if topic == self.commissioning_open {
            return self.commissioning_open(document);
        }

        let tokens: Vec<&str> = topic.split('/').collect();
        if tokens.len() >= MIN_TOKENS && tokens[0] == self.topics.mac() {
            match (tokens[1], tokens[3]) {
                (WINDOW_SEGMENT, POSITION_CONTROL_SEGMENT) => {
                    return self.window(tokens[NODE_ID_TOKEN], document.as_ref());
                }
                (DEVICE_SEGMENT, CONTROL_SEGMENT) => {
                    return self.device_control(tokens[NODE_ID_TOKEN], document.as_ref());
                }
                _ => {}
            }
        }
        debug!(topic, "unrecognised topic");
        Request::Unknown
    }

    fn commission(&self, document: Option<Value>) -> Request {
        let code = document
            .as_ref()
            .and_then(|d| d.get("code"))
            .and_then(Value::as_str)
            .filter(|code| !code.is_empty());
        match code {
            Some(code) => Request::Commission {
                setup_code: code.to_string(),
            },
            None => {
                warn!("commissioning request without a setup code");
                self.outbox.publish_json(
                    self.topics.commissioning_response(),
                    &CommissioningResponse {
                        code: String::new(),
                        status: GeneralCode::BadRequest.to_string(),
                    },
                );
                Request::Unknown
            }
        }
    }

    fn remove_node(&self, document: Option<Value>) -> Request {
        match document.and_then(parse::<NodeRequest>) {
            Some(NodeRequest { id }) => Request::RemoveNode { node_id: id },
            None => {
                warn!("malformed remove node request");
                self.outbox.publish_json(
                    self.topics.remove_node_response(),
                    &RemoveNodeResponse {
                        id: 0,
                        status: GeneralCode::BadRequest.to_string(),
                    },
                );
                Request::Unknown
            }
        }
    }

    fn commissioning_open(&self, document: Option<Value>) -> Request {
        match document.and_then(parse::<NodeRequest>) {
            Some(NodeRequest { id }) => Request::OpenCommissioningWindow { node_id: id },
            None => {
                warn!("malformed commissioning window request");
                self.outbox.publish_json(
                    self.topics.commissioning_open_response(),
                    &CommissioningOpenResponse {
                        id: 0,
                        status: GeneralCode::BadRequest.to_string(),
                        manual_code: String::new(),
                        qr_code: String::new(),
                    },
                );
                Request::Unknown
            }
        }
    }

    fn window(&self, token: &str, document: Option<&Value>) -> Request {
        let node_id = node_id(token);
        let position = document
            .cloned()
            .and_then(parse::<WindowControl>)
            .map(|control| control.pos)
            .filter(|&pos| pos <= 100);
        match (node_id, position) {
            (Some(node_id), Some(pos)) => Request::WindowPosition(WindowRequest {
                node_id,
                position: 100 - pos,
            }),
            _ => {
                warn!(token, "malformed window position request");
                self.window_nack(token, node_id, document);
                Request::Unknown
            }
        }
    }

    fn window_nack(&self, token: &str, node_id: Option<NodeId>, document: Option<&Value>) {
        let pos = document
            .and_then(|d| d.get("pos"))
            .and_then(Value::as_u64)
            .and_then(|pos| u8::try_from(pos).ok());
        let ack = ControlAck {
            id: node_id,
            success: false,
            status: GeneralCode::BadRequest.to_string(),
            pos,
        };
        self.outbox.publish_json(self.topics.control_ack(token), &ack);
    }

    fn device_control(&self, token: &str, document: Option<&Value>) -> Request {
        let Some(document) = document else {
            warn!(token, "device control payload is not JSON");
            return Request::Unknown;
        };
        let Some(kind) = document.get("type").and_then(Value::as_str) else {
            // Our own setpoint results share this topic
            debug!(token, "device control payload without type");
            return Request::Unknown;
        };
        if kind == "window" {
            return self.window(token, Some(document));
        }
        let Some(node_id) = node_id(token) else {
            warn!(token, "bad node id in device control topic");
            return Request::Unknown;
        };
        let request = match kind {
            "light" => Some(light_request(node_id, document)),
            "thermoAccumulator" => parse::<ThermostatControl>(document.clone())
                .and_then(|control| control.heat_setpoint)
                .and_then(|celsius| celsius.checked_mul(100))
                .map(|setpoint| Request::HeatingSetpoint(SetpointRequest { node_id, setpoint })),
            _ => None,
        };
        request.unwrap_or_else(|| {
            warn!(node_id, kind, "malformed device control request");
            Request::Unknown
        })
    }
}

/// Each part is read on its own, so a bad field only drops the part it belongs to
fn light_request(node_id: NodeId, document: &Value) -> Request {
    let mut settings = LightSettings::default();
    if let (Some(hue), Some(saturation), Some(value)) = (
        field::<u16>(document, "hue"),
        field::<u8>(document, "saturation"),
        field::<u8>(document, "value"),
    ) {
        settings.fields |= LightFields::COLOR;
        settings.hue = hue;
        settings.saturation = saturation;
        settings.value = value;
    }
    if let Some(kelvin) = field::<u16>(document, "temperatureKelvin") {
        settings.fields |= LightFields::COLOR_TEMPERATURE;
        settings.temperature_kelvin = kelvin;
    }
    if let Some(action) = document.get("action").and_then(Value::as_str) {
        settings.fields |= LightFields::ACTION;
        settings.on = action == "on";
    }
    Request::Light(LightRequest { node_id, settings })
}

fn field<T: TryFrom<u64>>(document: &Value, key: &str) -> Option<T> {
    document
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|v| T::try_from(v).ok())
}

fn parse<T: DeserializeOwned>(document: Value) -> Option<T> {
    serde_json::from_value(document).ok()
}

/// A node id token must be all decimal digits and fit a `u64`
fn node_id(token: &str) -> Option<NodeId> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}
