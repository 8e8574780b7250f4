//! Boolean State cluster, used by contact sensors

pub const CLUSTER_ID: u32 = 0x0045;

#[repr(u32)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attributes {
    StateValue = 0x0000,
}
