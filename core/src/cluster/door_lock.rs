pub const CLUSTER_ID: u32 = 0x0101;

#[repr(u32)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attributes {
    LockState = 0x0000,
    LockType = 0x0001,
    ActuatorEnabled = 0x0002,
    DoorState = 0x0003,
}

#[repr(u8)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorState {
    Open = 0,
    Closed = 1,
    Jammed = 2,
    ForcedOpen = 3,
    Unspecified = 4,
    Ajar = 5,
}

impl DoorState {
    /// Anything that isn't shut counts as open
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Closed)
    }
}
