//! Measurement clusters. Each reports a `MeasuredValue` at attribute 0.

pub const ILLUMINANCE_CLUSTER_ID: u32 = 0x0400;
pub const TEMPERATURE_CLUSTER_ID: u32 = 0x0402;
pub const RELATIVE_HUMIDITY_CLUSTER_ID: u32 = 0x0405;
pub const CARBON_DIOXIDE_CLUSTER_ID: u32 = 0x040D;
pub const ELECTRICAL_POWER_CLUSTER_ID: u32 = 0x0090;

#[repr(u32)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attributes {
    MeasuredValue = 0x0000,
    MinMeasuredValue = 0x0001,
    MaxMeasuredValue = 0x0002,
}

/// Electrical Power Measurement attributes
#[repr(u32)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAttributes {
    PowerMode = 0x0000,
    Voltage = 0x0004,
    ActiveCurrent = 0x0005,
    /// Milliwatts
    ActivePower = 0x0008,
}

/// Illuminance is reported as 10000 * log10(lux) + 1
pub fn illuminance_to_lux(measured: u16) -> u32 {
    if measured == 0 {
        return 0;
    }
    let exponent = (measured as f64 - 1.0) / 10_000.0;
    10f64.powf(exponent).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illuminance() {
        assert_eq!(illuminance_to_lux(0), 0);
        assert_eq!(illuminance_to_lux(1), 1);
        assert_eq!(illuminance_to_lux(20_001), 100);
    }
}
