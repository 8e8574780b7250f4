pub const CLUSTER_ID: u32 = 0x0201;

#[repr(u32)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attributes {
    /// 100ths of a degree Celsius
    LocalTemperature = 0x0000,
    OutdoorTemperature = 0x0001,
    Occupancy = 0x0002,
    OccupiedCoolingSetpoint = 0x0011,
    /// 100ths of a degree Celsius
    OccupiedHeatingSetpoint = 0x0012,
    SystemMode = 0x001C,
}

#[repr(u32)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    SetpointRaiseLower = 0x00,
}
