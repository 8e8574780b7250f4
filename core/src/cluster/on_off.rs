pub const CLUSTER_ID: u32 = 0x0006;

#[repr(u32)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attributes {
    OnOff = 0x0000,
    GlobalSceneControl = 0x4000,
    OnTime = 0x4001,
    OffWaitTime = 0x4002,
    StartUpOnOff = 0x4003,
}

#[repr(u32)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    Off = 0x00,
    On = 0x01,
    Toggle = 0x02,
}
