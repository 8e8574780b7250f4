pub const CLUSTER_ID: u32 = 0x0406;

#[repr(u32)]
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attributes {
    /// Bitmap, bit 0 is occupied
    Occupancy = 0x0000,
    OccupancySensorType = 0x0001,
}
