use crate::{
    util::time::current_timestamp, ClusterId, DeviceTypeId, EndpointId, FabricIndex, NodeId,
};

use super::{
    device::{Device, DeviceHandle},
    device_type::DeviceType,
    endpoint::Endpoint,
};

/// A commissioned node (7.8). Two nodes are equal when their id and fabric index match.
#[derive(Debug)]
pub struct Node {
    pub node_id: NodeId,
    pub fabric_index: FabricIndex,
    pub vendor_id: u16,
    pub product_id: u16,
    pub discriminator: u16,
    pub port: u16,
    pub setup_payload: String,
    /// Unix time in milliseconds
    pub last_discovered: i64,
    endpoints: Vec<Endpoint>,
}

impl Node {
    pub fn new(node_id: NodeId, fabric_index: FabricIndex) -> Self {
        Self {
            node_id,
            fabric_index,
            vendor_id: 0,
            product_id: 0,
            discriminator: 0,
            port: 0,
            setup_payload: String::new(),
            last_discovered: current_timestamp(),
            endpoints: Vec::with_capacity(2),
        }
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn endpoints_mut(&mut self) -> &mut [Endpoint] {
        &mut self.endpoints
    }

    pub fn endpoint(&self, endpoint_id: EndpointId) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|e| e.endpoint_id() == endpoint_id)
    }

    pub fn endpoint_mut(&mut self, endpoint_id: EndpointId) -> Option<&mut Endpoint> {
        self.endpoints
            .iter_mut()
            .find(|e| e.endpoint_id() == endpoint_id)
    }

    pub fn get_or_add_endpoint(&mut self, endpoint_id: EndpointId) -> &mut Endpoint {
        match self
            .endpoints
            .iter()
            .position(|e| e.endpoint_id() == endpoint_id)
        {
            Some(index) => &mut self.endpoints[index],
            None => {
                self.endpoints.push(Endpoint::new(endpoint_id));
                let last = self.endpoints.len() - 1;
                &mut self.endpoints[last]
            }
        }
    }

    /// The first endpoint serving `cluster_id`
    pub fn endpoint_with_cluster(&self, cluster_id: ClusterId) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.has_cluster(cluster_id))
    }

    /// The first endpoint carrying a device of `device_type`
    pub fn endpoint_with_device_type(&self, device_type: DeviceType) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|e| e.has_device_type(device_type.id()))
    }

    pub fn has_device(&self, device_type: DeviceType) -> bool {
        self.endpoints
            .iter()
            .any(|e| e.device(device_type).is_some())
    }

    /// Device types across all endpoints, in endpoint order, without duplicates
    pub fn device_types(&self) -> Vec<DeviceTypeId> {
        let mut types = vec![];
        for id in self.endpoints.iter().flat_map(|e| e.device_types()) {
            if !types.contains(id) {
                types.push(*id);
            }
        }
        types
    }

    pub fn devices(&self) -> impl Iterator<Item = (&Endpoint, &Device)> {
        self.endpoints
            .iter()
            .flat_map(|e| e.devices().iter().map(move |d| (e, d)))
    }

    pub fn devices_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.endpoints
            .iter_mut()
            .flat_map(|e| e.devices_mut().iter_mut())
    }

    pub fn find_device(&self, handle: DeviceHandle) -> Option<(&Endpoint, &Device)> {
        self.endpoints
            .iter()
            .find_map(|e| e.device_by_handle(handle).map(|d| (e, d)))
    }

    /// Take the scalars of `other` and union its endpoints into this node
    pub fn merge(&mut self, other: &Node) {
        self.fabric_index = other.fabric_index;
        self.vendor_id = other.vendor_id;
        self.product_id = other.product_id;
        self.discriminator = other.discriminator;
        self.port = other.port;
        if !other.setup_payload.is_empty() {
            self.setup_payload = other.setup_payload.clone();
        }
        self.last_discovered = self.last_discovered.max(other.last_discovered);
        for endpoint in &other.endpoints {
            self.get_or_add_endpoint(endpoint.endpoint_id())
                .merge(endpoint);
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id && self.fabric_index == other.fabric_index
    }
}
