//! Publishes device state changes as measurements.
//!
//! [`StateNotifier`] is registered as the delegate of every device. It only
//! queues the change; [`NotifierTask`] later finds the owning node and posts
//! one message per change. Changes of devices that are gone by then are dropped.

use std::sync::Arc;

use common::{Measurement, Reading, Topics};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{
    cluster::{color_control, measurement, rescale, window_covering},
    data_model::{DeviceChange, DeviceDelegate, DeviceHandle, DeviceType, Inventory},
    outbox::Outbox,
    NodeId,
};

type Notification = (DeviceHandle, DeviceType, DeviceChange);

pub struct StateNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl StateNotifier {
    pub fn new(inventory: Inventory, topics: Topics, outbox: Outbox) -> (Arc<Self>, NotifierTask) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = NotifierTask {
            rx,
            inventory,
            topics,
            outbox,
        };
        (Arc::new(Self { tx }), task)
    }
}

impl DeviceDelegate for StateNotifier {
    fn on_change(&self, device: DeviceHandle, device_type: DeviceType, change: DeviceChange) {
        // Fails only once the task has stopped
        let _ = self.tx.send((device, device_type, change));
    }
}

pub struct NotifierTask {
    rx: mpsc::UnboundedReceiver<Notification>,
    inventory: Inventory,
    topics: Topics,
    outbox: Outbox,
}

impl NotifierTask {
    /// Runs until every [`StateNotifier`] handle is dropped
    pub async fn run(mut self) {
        while let Some((handle, device_type, change)) = self.rx.recv().await {
            self.notify(handle, device_type, change).await;
        }
        debug!("notifier stopped");
    }

    async fn notify(&self, handle: DeviceHandle, device_type: DeviceType, change: DeviceChange) {
        let owner = self
            .inventory
            .read()
            .await
            .find_owner(handle)
            .map(|(node, _, _)| node.node_id);
        let Some(node_id) = owner else {
            debug!(?handle, ?device_type, "owner gone, dropping change");
            return;
        };
        let (topic, measurement) = format(&self.topics, node_id, change);
        trace!(node_id, %topic, reading = ?measurement.reading, "measurement");
        self.outbox.publish_json(topic, &measurement);
    }
}

/// The topic and payload for one change on `node_id`
pub fn format(topics: &Topics, node_id: NodeId, change: DeviceChange) -> (String, Measurement) {
    let reading = match change {
        DeviceChange::LiftPercent100ths(lift) => {
            Reading::Pos((lift.min(window_covering::CLOSED_PERCENT_100THS) / 100) as u8)
        }
        DeviceChange::OnOff(on) => Reading::OnOff(on as u8),
        DeviceChange::CurrentLevel(level) => Reading::CurrentLevel(level),
        DeviceChange::CurrentHue(hue) => {
            Reading::Hue(rescale(hue as u32, color_control::MAX_HUE as u32, 360) as u16)
        }
        DeviceChange::CurrentSaturation(saturation) => Reading::Saturation(rescale(
            saturation as u32,
            color_control::MAX_SATURATION as u32,
            100,
        ) as u8),
        DeviceChange::ColorTemperatureMireds(mireds) => {
            Reading::TemperatureKelvin(color_control::mireds_to_kelvin(mireds))
        }
        DeviceChange::LocalTemperature(t) | DeviceChange::Temperature(t) => {
            Reading::Temperature(t as f32 / 100.0)
        }
        DeviceChange::OccupiedHeatingSetpoint(setpoint) => {
            return (
                topics.measurements(node_id),
                Measurement {
                    id: Some(node_id),
                    reading: Reading::HeatSetpoint(setpoint as f32 / 100.0),
                },
            );
        }
        DeviceChange::Humidity(h) => Reading::Humidity(h as f32 / 100.0),
        DeviceChange::Co2(ppm) => Reading::Co2(ppm),
        DeviceChange::ActivePower(mw) => Reading::PowerConsumption(mw),
        DeviceChange::Illuminance(value) => {
            Reading::Brightness(measurement::illuminance_to_lux(value))
        }
        DeviceChange::Occupied(occupied) => Reading::Occupancy(occupied as u8),
        DeviceChange::DoorState(state) => return door(topics, node_id, state.is_open()),
        // Contact means closed
        DeviceChange::Contact(contact) => return door(topics, node_id, !contact),
    };
    (
        topics.measurements(node_id),
        Measurement { id: None, reading },
    )
}

fn door(topics: &Topics, node_id: NodeId, open: bool) -> (String, Measurement) {
    (
        topics.sensor_measurements(node_id),
        Measurement {
            id: None,
            reading: Reading::Door(open as u8),
        },
    )
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        cluster::door_lock::DoorState,
        data_model::{AttributePath, AttributeReport, AttributeValue, Node, NodeRegistry},
    };

    fn payload(topics: &Topics, change: DeviceChange) -> (String, Value) {
        let (topic, measurement) = format(topics, 42, change);
        (topic, serde_json::to_value(&measurement).unwrap())
    }

    #[test]
    fn test_format() {
        let topics = Topics::new("aa:bb");
        let measurements = "aa:bb/device/42/measurements".to_string();
        assert_eq!(
            payload(&topics, DeviceChange::LiftPercent100ths(7000)),
            (measurements.clone(), json!({"pos": 70}))
        );
        assert_eq!(
            payload(&topics, DeviceChange::OnOff(true)),
            (measurements.clone(), json!({"on-off": 1}))
        );
        assert_eq!(
            payload(&topics, DeviceChange::CurrentHue(254)),
            (measurements.clone(), json!({"hue": 360}))
        );
        assert_eq!(
            payload(&topics, DeviceChange::ColorTemperatureMireds(250)),
            (measurements.clone(), json!({"temperatureKelvin": 4000}))
        );
        assert_eq!(
            payload(&topics, DeviceChange::Temperature(2150)),
            (measurements.clone(), json!({"temperature": 21.5}))
        );
        assert_eq!(
            payload(&topics, DeviceChange::OccupiedHeatingSetpoint(2000)),
            (measurements.clone(), json!({"id": 42, "heatSetpoint": 20.0}))
        );
        assert_eq!(
            payload(&topics, DeviceChange::Occupied(true)),
            (measurements, json!({"occupancy": 1}))
        );

        let sensors = "aa:bb/sensors/42/measurements".to_string();
        assert_eq!(
            payload(&topics, DeviceChange::DoorState(DoorState::Closed)),
            (sensors.clone(), json!({"door": 0}))
        );
        assert_eq!(
            payload(&topics, DeviceChange::DoorState(DoorState::ForcedOpen)),
            (sensors.clone(), json!({"door": 1}))
        );
        assert_eq!(
            payload(&topics, DeviceChange::Contact(false)),
            (sensors, json!({"door": 1}))
        );
    }

    fn report(node_id: NodeId, value: u16) -> AttributeReport {
        AttributeReport {
            path: AttributePath {
                node_id,
                endpoint_id: 1,
                cluster_id: 0x0102,
                attribute_id: 0x000E,
            },
            value: AttributeValue::U16(value),
        }
    }

    #[tokio::test]
    async fn test_one_message_per_change() {
        let inventory = NodeRegistry::new().into_inventory();
        let (outbox, mut rx) = Outbox::channel();
        let (notifier, task) = StateNotifier::new(inventory.clone(), Topics::new("aa"), outbox);

        for node_id in [1, 2] {
            let mut node = Node::new(node_id, 1);
            node.get_or_add_endpoint(1)
                .add_device_type(DeviceType::WindowCovering.id());
            for device in node.devices_mut() {
                device.set_delegate(notifier.clone());
            }
            inventory.write().await.merge(node);
        }
        {
            let mut inventory = inventory.write().await;
            assert_eq!(inventory.apply_report(&report(2, 2500)), 1);
            // same value again
            assert_eq!(inventory.apply_report(&report(2, 2500)), 0);
            assert_eq!(inventory.apply_report(&report(1, 0)), 1);
        }
        tokio::spawn(task.run());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.topic, "aa/device/2/measurements");
        assert_eq!(first.payload, br#"{"pos":25}"#);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.topic, "aa/device/1/measurements");
        assert_eq!(second.payload, br#"{"pos":0}"#);
    }

    #[tokio::test]
    async fn test_change_for_removed_node_is_dropped() {
        let inventory = NodeRegistry::new().into_inventory();
        let (outbox, mut rx) = Outbox::channel();
        let (notifier, task) = StateNotifier::new(inventory.clone(), Topics::new("aa"), outbox);

        let mut node = Node::new(5, 1);
        node.get_or_add_endpoint(1)
            .add_device_type(DeviceType::ContactSensor.id());
        let (_, device) = node.devices().next().unwrap();
        notifier.on_change(
            device.handle(),
            DeviceType::ContactSensor,
            DeviceChange::Contact(true),
        );
        drop(notifier);
        task.run().await;
        assert!(rx.try_recv().is_err());
    }
}
