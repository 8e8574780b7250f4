pub const CLUSTER_ID: u32 = 0x0300;

/// Hue and saturation are both expressed as 0-254
pub const MAX_HUE: u8 = 254;
pub const MAX_SATURATION: u8 = 254;

#[repr(u32)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attributes {
    CurrentHue = 0x0000,
    CurrentSaturation = 0x0001,
    RemainingTime = 0x0002,
    CurrentX = 0x0003,
    CurrentY = 0x0004,
    ColorTemperatureMireds = 0x0007,
    ColorMode = 0x0008,
}

#[repr(u32)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    MoveToHue = 0x00,
    MoveToSaturation = 0x03,
    MoveToHueAndSaturation = 0x06,
    MoveToColor = 0x07,
    MoveToColorTemperature = 0x0A,
}

/// Converts between mireds and kelvin, which are reciprocal (x 10^6)
pub fn mireds_to_kelvin(mireds: u16) -> u32 {
    if mireds == 0 {
        return 0;
    }
    1_000_000 / mireds as u32
}

pub fn kelvin_to_mireds(kelvin: u16) -> u16 {
    if kelvin == 0 {
        return 0;
    }
    (1_000_000 / kelvin as u32).min(u16::MAX as u32) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_temperature_conversion() {
        assert_eq!(kelvin_to_mireds(4000), 250);
        assert_eq!(mireds_to_kelvin(250), 4000);
        assert_eq!(kelvin_to_mireds(0), 0);
        // Below ~16 K the reciprocal no longer fits
        assert_eq!(kelvin_to_mireds(10), u16::MAX);
    }
}
