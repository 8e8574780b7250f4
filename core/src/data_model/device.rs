use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use num::FromPrimitive;

use crate::{
    cluster::{
        boolean_state, color_control,
        door_lock::{self, DoorState},
        level, measurement, occupancy_sensing, on_off, thermostat, window_covering,
    },
    AttributeId, ClusterId,
};

use super::{device_type::DeviceType, AttributeValue};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Identity of a device instance. Two devices of the same type never share a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(u64);

impl DeviceHandle {
    fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

/// A tracked attribute that took a new value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceChange {
    LiftPercent100ths(u16),
    OnOff(bool),
    CurrentLevel(u8),
    CurrentHue(u8),
    CurrentSaturation(u8),
    ColorTemperatureMireds(u16),
    LocalTemperature(i16),
    OccupiedHeatingSetpoint(i16),
    /// 100ths of a degree Celsius
    Temperature(i16),
    /// 100ths of a percent
    Humidity(u16),
    /// ppm
    Co2(f32),
    /// Milliwatts
    ActivePower(i64),
    DoorState(DoorState),
    Contact(bool),
    Occupied(bool),
    /// 10000 * log10(lux) + 1
    Illuminance(u16),
}

impl DeviceChange {
    /// Decode a report on a tracked attribute. Values of the wrong shape are ignored.
    pub fn from_report(
        device_type: DeviceType,
        cluster_id: ClusterId,
        attribute_id: AttributeId,
        value: &AttributeValue,
    ) -> Option<Self> {
        if !device_type.tracks(cluster_id, attribute_id) {
            return None;
        }
        match cluster_id {
            window_covering::CLUSTER_ID => value.as_u16().map(Self::LiftPercent100ths),
            on_off::CLUSTER_ID => value.as_bool().map(Self::OnOff),
            level::CLUSTER_ID => value.as_u8().map(Self::CurrentLevel),
            color_control::CLUSTER_ID => match color_control::Attributes::from_u32(attribute_id)? {
                color_control::Attributes::CurrentHue => value.as_u8().map(Self::CurrentHue),
                color_control::Attributes::CurrentSaturation => {
                    value.as_u8().map(Self::CurrentSaturation)
                }
                color_control::Attributes::ColorTemperatureMireds => {
                    value.as_u16().map(Self::ColorTemperatureMireds)
                }
                _ => None,
            },
            thermostat::CLUSTER_ID => match thermostat::Attributes::from_u32(attribute_id)? {
                thermostat::Attributes::LocalTemperature => {
                    value.as_i16().map(Self::LocalTemperature)
                }
                thermostat::Attributes::OccupiedHeatingSetpoint => {
                    value.as_i16().map(Self::OccupiedHeatingSetpoint)
                }
                _ => None,
            },
            measurement::TEMPERATURE_CLUSTER_ID => value.as_i16().map(Self::Temperature),
            measurement::RELATIVE_HUMIDITY_CLUSTER_ID => value.as_u16().map(Self::Humidity),
            measurement::CARBON_DIOXIDE_CLUSTER_ID => value.as_f32().map(Self::Co2),
            measurement::ELECTRICAL_POWER_CLUSTER_ID => value.as_i64().map(Self::ActivePower),
            measurement::ILLUMINANCE_CLUSTER_ID => value.as_u16().map(Self::Illuminance),
            door_lock::CLUSTER_ID => value
                .as_u64()
                .and_then(DoorState::from_u64)
                .map(Self::DoorState),
            boolean_state::CLUSTER_ID => value.as_bool().map(Self::Contact),
            occupancy_sensing::CLUSTER_ID => value.as_u64().map(|v| Self::Occupied(v & 0x01 != 0)),
            _ => None,
        }
    }
}

/// Invoked synchronously, once per actual change, while the inventory is locked.
/// Implementations must not block or touch the inventory.
pub trait DeviceDelegate: Send + Sync {
    fn on_change(&self, device: DeviceHandle, device_type: DeviceType, change: DeviceChange);
}

fn update<T: Copy + PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    if *slot == Some(value) {
        return false;
    }
    *slot = Some(value);
    true
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct WindowCovering {
    pub lift_percent_100ths: Option<u16>,
}

impl WindowCovering {
    pub fn set_lift_percent_100ths(&mut self, value: u16) -> bool {
        update(&mut self.lift_percent_100ths, value)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExtendedColorLight {
    pub on: Option<bool>,
    pub current_level: Option<u8>,
    pub hue: Option<u8>,
    pub saturation: Option<u8>,
    pub color_temperature_mireds: Option<u16>,
}

impl ExtendedColorLight {
    pub fn set_on(&mut self, on: bool) -> bool {
        update(&mut self.on, on)
    }

    pub fn set_current_level(&mut self, level: u8) -> bool {
        update(&mut self.current_level, level)
    }

    pub fn set_hue(&mut self, hue: u8) -> bool {
        update(&mut self.hue, hue)
    }

    pub fn set_saturation(&mut self, saturation: u8) -> bool {
        update(&mut self.saturation, saturation)
    }

    pub fn set_color_temperature_mireds(&mut self, mireds: u16) -> bool {
        update(&mut self.color_temperature_mireds, mireds)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Thermostat {
    pub local_temperature: Option<i16>,
    pub occupied_heating_setpoint: Option<i16>,
}

impl Thermostat {
    pub fn set_local_temperature(&mut self, value: i16) -> bool {
        update(&mut self.local_temperature, value)
    }

    pub fn set_occupied_heating_setpoint(&mut self, value: i16) -> bool {
        update(&mut self.occupied_heating_setpoint, value)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct AirQualitySensor {
    pub temperature: Option<i16>,
    pub humidity: Option<u16>,
    pub co2: Option<f32>,
}

impl AirQualitySensor {
    pub fn set_temperature(&mut self, value: i16) -> bool {
        update(&mut self.temperature, value)
    }

    pub fn set_humidity(&mut self, value: u16) -> bool {
        update(&mut self.humidity, value)
    }

    /// Compared bitwise, so NaN to NaN is not a change
    pub fn set_co2(&mut self, value: f32) -> bool {
        if self.co2.map(f32::to_bits) == Some(value.to_bits()) {
            return false;
        }
        self.co2 = Some(value);
        true
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ElectricalSensor {
    pub active_power_mw: Option<i64>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DoorLock {
    pub door_state: Option<DoorState>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ContactSensor {
    pub contact: Option<bool>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct OccupancySensor {
    pub occupied: Option<bool>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct LightSensor {
    pub illuminance: Option<u16>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TemperatureSensor {
    pub temperature: Option<i16>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct HumiditySensor {
    pub humidity: Option<u16>,
}

/// Latest known values, one case per modelled device type
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceState {
    WindowCovering(WindowCovering),
    ExtendedColorLight(ExtendedColorLight),
    Thermostat(Thermostat),
    AirQualitySensor(AirQualitySensor),
    ElectricalSensor(ElectricalSensor),
    DoorLock(DoorLock),
    ContactSensor(ContactSensor),
    OccupancySensor(OccupancySensor),
    LightSensor(LightSensor),
    TemperatureSensor(TemperatureSensor),
    HumiditySensor(HumiditySensor),
}

impl DeviceState {
    pub fn new(device_type: DeviceType) -> Self {
        match device_type {
            DeviceType::WindowCovering => Self::WindowCovering(Default::default()),
            DeviceType::ExtendedColorLight => Self::ExtendedColorLight(Default::default()),
            DeviceType::Thermostat => Self::Thermostat(Default::default()),
            DeviceType::AirQualitySensor => Self::AirQualitySensor(Default::default()),
            DeviceType::ElectricalSensor => Self::ElectricalSensor(Default::default()),
            DeviceType::DoorLock => Self::DoorLock(Default::default()),
            DeviceType::ContactSensor => Self::ContactSensor(Default::default()),
            DeviceType::OccupancySensor => Self::OccupancySensor(Default::default()),
            DeviceType::LightSensor => Self::LightSensor(Default::default()),
            DeviceType::TemperatureSensor => Self::TemperatureSensor(Default::default()),
            DeviceType::HumiditySensor => Self::HumiditySensor(Default::default()),
        }
    }

    pub fn device_type(&self) -> DeviceType {
        match self {
            Self::WindowCovering(_) => DeviceType::WindowCovering,
            Self::ExtendedColorLight(_) => DeviceType::ExtendedColorLight,
            Self::Thermostat(_) => DeviceType::Thermostat,
            Self::AirQualitySensor(_) => DeviceType::AirQualitySensor,
            Self::ElectricalSensor(_) => DeviceType::ElectricalSensor,
            Self::DoorLock(_) => DeviceType::DoorLock,
            Self::ContactSensor(_) => DeviceType::ContactSensor,
            Self::OccupancySensor(_) => DeviceType::OccupancySensor,
            Self::LightSensor(_) => DeviceType::LightSensor,
            Self::TemperatureSensor(_) => DeviceType::TemperatureSensor,
            Self::HumiditySensor(_) => DeviceType::HumiditySensor,
        }
    }

    /// Store the change, returning whether the value differed.
    /// A change this variant does not track is ignored.
    fn apply(&mut self, change: DeviceChange) -> bool {
        use DeviceChange as C;
        match (self, change) {
            (Self::WindowCovering(w), C::LiftPercent100ths(v)) => w.set_lift_percent_100ths(v),
            (Self::ExtendedColorLight(l), C::OnOff(v)) => l.set_on(v),
            (Self::ExtendedColorLight(l), C::CurrentLevel(v)) => l.set_current_level(v),
            (Self::ExtendedColorLight(l), C::CurrentHue(v)) => l.set_hue(v),
            (Self::ExtendedColorLight(l), C::CurrentSaturation(v)) => l.set_saturation(v),
            (Self::ExtendedColorLight(l), C::ColorTemperatureMireds(v)) => {
                l.set_color_temperature_mireds(v)
            }
            (Self::Thermostat(t), C::LocalTemperature(v)) => t.set_local_temperature(v),
            (Self::Thermostat(t), C::OccupiedHeatingSetpoint(v)) => {
                t.set_occupied_heating_setpoint(v)
            }
            (Self::AirQualitySensor(s), C::Temperature(v)) => s.set_temperature(v),
            (Self::AirQualitySensor(s), C::Humidity(v)) => s.set_humidity(v),
            (Self::AirQualitySensor(s), C::Co2(v)) => s.set_co2(v),
            (Self::ElectricalSensor(s), C::ActivePower(v)) => update(&mut s.active_power_mw, v),
            (Self::DoorLock(d), C::DoorState(v)) => update(&mut d.door_state, v),
            (Self::ContactSensor(s), C::Contact(v)) => update(&mut s.contact, v),
            (Self::OccupancySensor(s), C::Occupied(v)) => update(&mut s.occupied, v),
            (Self::LightSensor(s), C::Illuminance(v)) => update(&mut s.illuminance, v),
            (Self::TemperatureSensor(s), C::Temperature(v)) => update(&mut s.temperature, v),
            (Self::HumiditySensor(s), C::Humidity(v)) => update(&mut s.humidity, v),
            _ => false,
        }
    }
}

/// A typed capability instance owned by an endpoint
pub struct Device {
    handle: DeviceHandle,
    state: DeviceState,
    delegate: Option<Arc<dyn DeviceDelegate>>,
}

impl Device {
    pub fn new(device_type: DeviceType) -> Self {
        Self {
            handle: DeviceHandle::next(),
            state: DeviceState::new(device_type),
            delegate: None,
        }
    }

    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    pub fn device_type(&self) -> DeviceType {
        self.state.device_type()
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn has_delegate(&self) -> bool {
        self.delegate.is_some()
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn DeviceDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn clear_delegate(&mut self) {
        self.delegate = None;
    }

    /// Store a new value. The delegate fires only if the value changed.
    pub fn update(&mut self, change: DeviceChange) -> bool {
        if !self.state.apply(change) {
            return false;
        }
        if let Some(delegate) = &self.delegate {
            delegate.on_change(self.handle, self.device_type(), change);
        }
        true
    }

    /// Apply a reported attribute value, if this device tracks it
    pub fn apply_report(
        &mut self,
        cluster_id: ClusterId,
        attribute_id: AttributeId,
        value: &AttributeValue,
    ) -> bool {
        match DeviceChange::from_report(self.device_type(), cluster_id, attribute_id, value) {
            Some(change) => self.update(change),
            None => false,
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("handle", &self.handle)
            .field("state", &self.state)
            .field("delegate", &self.delegate.is_some())
            .finish()
    }
}
