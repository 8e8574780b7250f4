use crate::{ClusterId, DeviceTypeId, EndpointId};

use super::{
    device::{Device, DeviceHandle},
    device_type::DeviceType,
};

/// Endpoint (7.9). Cluster and device-type lists keep insertion order and hold no duplicates.
#[derive(Debug)]
pub struct Endpoint {
    endpoint_id: EndpointId,
    clusters: Vec<ClusterId>,
    device_types: Vec<DeviceTypeId>,
    devices: Vec<Device>,
}

impl Endpoint {
    pub fn new(endpoint_id: EndpointId) -> Self {
        Self {
            endpoint_id,
            clusters: Vec::with_capacity(8),
            device_types: Vec::with_capacity(2),
            devices: vec![],
        }
    }

    pub fn endpoint_id(&self) -> EndpointId {
        self.endpoint_id
    }

    pub fn clusters(&self) -> &[ClusterId] {
        &self.clusters
    }

    pub fn device_types(&self) -> &[DeviceTypeId] {
        &self.device_types
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut [Device] {
        &mut self.devices
    }

    pub fn add_cluster(&mut self, cluster_id: ClusterId) {
        if !self.has_cluster(cluster_id) {
            self.clusters.push(cluster_id);
        }
    }

    pub fn has_cluster(&self, cluster_id: ClusterId) -> bool {
        self.clusters.contains(&cluster_id)
    }

    /// Record a device type, creating its device the first time a modelled type is seen.
    /// Returns whether a device was created.
    pub fn add_device_type(&mut self, device_type_id: DeviceTypeId) -> bool {
        if !self.device_types.contains(&device_type_id) {
            self.device_types.push(device_type_id);
        }
        let Some(device_type) = DeviceType::from_id(device_type_id) else {
            return false;
        };
        if self.device(device_type).is_some() {
            return false;
        }
        self.devices.push(Device::new(device_type));
        true
    }

    pub fn has_device_type(&self, device_type_id: DeviceTypeId) -> bool {
        self.device_types.contains(&device_type_id)
    }

    pub fn device(&self, device_type: DeviceType) -> Option<&Device> {
        self.devices
            .iter()
            .find(|d| d.device_type() == device_type)
    }

    pub fn device_mut(&mut self, device_type: DeviceType) -> Option<&mut Device> {
        self.devices
            .iter_mut()
            .find(|d| d.device_type() == device_type)
    }

    pub fn device_by_handle(&self, handle: DeviceHandle) -> Option<&Device> {
        self.devices.iter().find(|d| d.handle() == handle)
    }

    /// Union another endpoint's clusters and device types into this one
    pub fn merge(&mut self, other: &Endpoint) {
        for &cluster in &other.clusters {
            self.add_cluster(cluster);
        }
        for &device_type in &other.device_types {
            self.add_device_type(device_type);
        }
    }
}
