pub const CLUSTER_ID: u32 = 0x001D;

#[repr(u32)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attributes {
    DeviceTypeList = 0x0000,
    ServerList = 0x0001,
    ClientList = 0x0002,
    PartsList = 0x0003,
}
