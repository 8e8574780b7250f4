use std::time::Duration;

pub const CLUSTER_ID: u32 = 0x003C;

/// Window length requested when a client asks to open a node for another commissioner
pub const WINDOW_TIMEOUT: Duration = Duration::from_secs(180);
/// PBKDF2 iterations for the enhanced window verifier
pub const PBKDF_ITERATIONS: u32 = 1000;

#[repr(u32)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attributes {
    WindowStatus = 0x0000,
    AdminFabricIndex = 0x0001,
    AdminVendorId = 0x0002,
}

#[repr(u32)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    OpenCommissioningWindow = 0x00,
    OpenBasicCommissioningWindow = 0x01,
    RevokeCommissioning = 0x02,
}

#[repr(u8)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommissioningWindowStatus {
    WindowNotOpen = 0,
    EnhancedWindowOpen = 1,
    BasicWindowOpen = 2,
}
