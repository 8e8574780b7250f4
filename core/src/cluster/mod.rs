use crate::ClusterId;

pub mod admin_commissioning;
pub mod boolean_state;
pub mod color_control;
pub mod descriptor;
pub mod door_lock;
pub mod level;
pub mod measurement;
pub mod occupancy_sensing;
pub mod on_off;
pub mod thermostat;
pub mod window_covering;

/// A cluster command the gateway sends, with its request fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCommand {
    On,
    Off,
    MoveToLevel {
        level: u8,
        transition_time: Option<u16>,
    },
    MoveToHueAndSaturation {
        hue: u8,
        saturation: u8,
        transition_time: u16,
    },
    MoveToColorTemperature {
        mireds: u16,
        transition_time: u16,
    },
    GoToLiftPercentage {
        percent_100ths: u16,
    },
}

impl ClusterCommand {
    pub fn cluster_id(&self) -> ClusterId {
        match self {
            Self::On | Self::Off => on_off::CLUSTER_ID,
            Self::MoveToLevel { .. } => level::CLUSTER_ID,
            Self::MoveToHueAndSaturation { .. } | Self::MoveToColorTemperature { .. } => {
                color_control::CLUSTER_ID
            }
            Self::GoToLiftPercentage { .. } => window_covering::CLUSTER_ID,
        }
    }

    pub fn command_id(&self) -> u32 {
        match self {
            Self::On => on_off::Commands::On as _,
            Self::Off => on_off::Commands::Off as _,
            Self::MoveToLevel { .. } => level::Commands::MoveToLevel as _,
            Self::MoveToHueAndSaturation { .. } => {
                color_control::Commands::MoveToHueAndSaturation as _
            }
            Self::MoveToColorTemperature { .. } => {
                color_control::Commands::MoveToColorTemperature as _
            }
            Self::GoToLiftPercentage { .. } => window_covering::Commands::GoToLiftPercentage as _,
        }
    }
}

/// Scale `value` out of `from_max` into `0..=to_max`, rounding down
pub fn rescale(value: u32, from_max: u32, to_max: u32) -> u32 {
    if from_max == 0 {
        return 0;
    }
    value.min(from_max) * to_max / from_max
}
