pub const CLUSTER_ID: u32 = 0x0102;

/// Fully closed, in 100ths of a percent
pub const CLOSED_PERCENT_100THS: u16 = 10_000;

#[repr(u32)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attributes {
    Type = 0x0000,
    CurrentPositionLiftPercentage = 0x0008,
    OperationalStatus = 0x000A,
    TargetPositionLiftPercent100ths = 0x000B,
    EndProductType = 0x000D,
    CurrentPositionLiftPercent100ths = 0x000E,
    Mode = 0x0017,
}

#[repr(u32)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    UpOrOpen = 0x00,
    DownOrClose = 0x01,
    StopMotion = 0x02,
    GoToLiftValue = 0x04,
    GoToLiftPercentage = 0x05,
}
