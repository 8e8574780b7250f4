//! Device types (7.15) the gateway models

use common::DeviceKind;
use num::FromPrimitive;

use crate::{
    cluster::{
        boolean_state, color_control, door_lock, level, measurement, occupancy_sensing, on_off,
        thermostat, window_covering,
    },
    AttributeId, ClusterId, DeviceTypeId,
};

/// Present on endpoint 0 of every node, never modelled as a device
pub const DEVICE_TYPE_ROOT_NODE: DeviceTypeId = 0x0016;

#[repr(u32)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    DoorLock = 0x000A,
    ContactSensor = 0x0015,
    AirQualitySensor = 0x002C,
    LightSensor = 0x0106,
    OccupancySensor = 0x0107,
    ExtendedColorLight = 0x010D,
    WindowCovering = 0x0202,
    Thermostat = 0x0301,
    TemperatureSensor = 0x0302,
    HumiditySensor = 0x0307,
    ElectricalSensor = 0x0510,
}

const MEASURED_VALUE: AttributeId = measurement::Attributes::MeasuredValue as _;

impl DeviceType {
    pub fn from_id(id: DeviceTypeId) -> Option<Self> {
        Self::from_u32(id)
    }

    pub fn id(self) -> DeviceTypeId {
        self as _
    }

    /// How clients know this device
    pub fn kind(self) -> DeviceKind {
        match self {
            Self::WindowCovering => DeviceKind::Window,
            Self::ExtendedColorLight => DeviceKind::Light,
            Self::DoorLock => DeviceKind::DoorLock,
            Self::OccupancySensor => DeviceKind::Occupancy,
            Self::Thermostat => DeviceKind::ThermoAccumulator,
            Self::ContactSensor
            | Self::AirQualitySensor
            | Self::LightSensor
            | Self::TemperatureSensor
            | Self::HumiditySensor
            | Self::ElectricalSensor => DeviceKind::Sensors,
        }
    }

    /// Minimum floor and maximum ceiling, in seconds, for reports
    pub fn subscription_intervals(self) -> (u16, u16) {
        match self {
            Self::OccupancySensor | Self::DoorLock | Self::ContactSensor => (1, 5),
            Self::ExtendedColorLight => (0, 5),
            Self::WindowCovering
            | Self::Thermostat
            | Self::AirQualitySensor
            | Self::LightSensor
            | Self::TemperatureSensor
            | Self::HumiditySensor
            | Self::ElectricalSensor => (5, 30),
        }
    }

    /// The attributes a device of this type subscribes to and tracks
    pub fn tracked_attributes(self) -> &'static [(ClusterId, AttributeId)] {
        match self {
            Self::WindowCovering => &[(
                window_covering::CLUSTER_ID,
                window_covering::Attributes::CurrentPositionLiftPercent100ths as _,
            )],
            Self::ExtendedColorLight => &[
                (on_off::CLUSTER_ID, on_off::Attributes::OnOff as _),
                (level::CLUSTER_ID, level::Attributes::CurrentLevel as _),
                (
                    color_control::CLUSTER_ID,
                    color_control::Attributes::CurrentHue as _,
                ),
                (
                    color_control::CLUSTER_ID,
                    color_control::Attributes::CurrentSaturation as _,
                ),
                (
                    color_control::CLUSTER_ID,
                    color_control::Attributes::ColorTemperatureMireds as _,
                ),
            ],
            Self::Thermostat => &[
                (
                    thermostat::CLUSTER_ID,
                    thermostat::Attributes::LocalTemperature as _,
                ),
                (
                    thermostat::CLUSTER_ID,
                    thermostat::Attributes::OccupiedHeatingSetpoint as _,
                ),
            ],
            Self::AirQualitySensor => &[
                (measurement::TEMPERATURE_CLUSTER_ID, MEASURED_VALUE),
                (measurement::RELATIVE_HUMIDITY_CLUSTER_ID, MEASURED_VALUE),
                (measurement::CARBON_DIOXIDE_CLUSTER_ID, MEASURED_VALUE),
            ],
            Self::ElectricalSensor => &[(
                measurement::ELECTRICAL_POWER_CLUSTER_ID,
                measurement::PowerAttributes::ActivePower as _,
            )],
            Self::DoorLock => &[(door_lock::CLUSTER_ID, door_lock::Attributes::DoorState as _)],
            Self::ContactSensor => &[(
                boolean_state::CLUSTER_ID,
                boolean_state::Attributes::StateValue as _,
            )],
            Self::OccupancySensor => &[(
                occupancy_sensing::CLUSTER_ID,
                occupancy_sensing::Attributes::Occupancy as _,
            )],
            Self::LightSensor => &[(measurement::ILLUMINANCE_CLUSTER_ID, MEASURED_VALUE)],
            Self::TemperatureSensor => &[(measurement::TEMPERATURE_CLUSTER_ID, MEASURED_VALUE)],
            Self::HumiditySensor => &[(measurement::RELATIVE_HUMIDITY_CLUSTER_ID, MEASURED_VALUE)],
        }
    }

    pub fn tracks(self, cluster_id: ClusterId, attribute_id: AttributeId) -> bool {
        self.tracked_attributes()
            .iter()
            .any(|&(c, a)| c == cluster_id && a == attribute_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_ids() {
        assert_eq!(DeviceType::from_id(0x0202), Some(DeviceType::WindowCovering));
        assert_eq!(DeviceType::from_id(0x010D), Some(DeviceType::ExtendedColorLight));
        assert_eq!(DeviceType::from_id(DEVICE_TYPE_ROOT_NODE), None);
        assert_eq!(DeviceType::Thermostat.id(), 0x0301);
    }

    #[test]
    fn test_tracking() {
        assert!(DeviceType::ExtendedColorLight.tracks(0x0300, 0x0007));
        assert!(!DeviceType::ExtendedColorLight.tracks(0x0300, 0x0008));
        assert!(DeviceType::AirQualitySensor.tracks(0x040D, 0));
        assert_eq!(DeviceType::DoorLock.subscription_intervals(), (1, 5));
        assert_eq!(DeviceType::ExtendedColorLight.subscription_intervals(), (0, 5));
    }
}
