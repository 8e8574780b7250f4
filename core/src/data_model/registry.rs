use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::{FabricIndex, NodeId};

use super::{
    device::{Device, DeviceHandle},
    endpoint::Endpoint,
    node::Node,
    AttributeReport,
};

/// The live inventory shared by the orchestrator, the report pump and the notifier
pub type Inventory = Arc<RwLock<NodeRegistry>>;

/// Nodes known to the gateway, at most one per node id
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: Vec<Node>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inventory(self) -> Inventory {
        Arc::new(RwLock::new(self))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.node_id).collect()
    }

    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.node_id == node_id)
    }

    /// Returns the node with this id, creating it if needed.
    /// A node with the same id on another fabric index is moved to `fabric_index`.
    pub fn get_or_create_node(&mut self, node_id: NodeId, fabric_index: FabricIndex) -> &mut Node {
        match self.nodes.iter().position(|n| n.node_id == node_id) {
            Some(index) => {
                let node = &mut self.nodes[index];
                if node.fabric_index != fabric_index {
                    debug!(
                        node_id,
                        from = node.fabric_index,
                        to = fabric_index,
                        "fabric index changed"
                    );
                    node.fabric_index = fabric_index;
                }
                node
            }
            None => {
                self.nodes.push(Node::new(node_id, fabric_index));
                let last = self.nodes.len() - 1;
                &mut self.nodes[last]
            }
        }
    }

    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let index = self.nodes.iter().position(|n| n.node_id == node_id)?;
        Some(self.nodes.remove(index))
    }

    /// Merge a structural copy into the live node with the same id.
    /// Devices already on the live node keep their handles and delegates.
    pub fn merge(&mut self, node: Node) -> &mut Node {
        match self.nodes.iter().position(|n| n.node_id == node.node_id) {
            Some(index) => {
                let live = &mut self.nodes[index];
                live.merge(&node);
                live
            }
            None => {
                self.nodes.push(node);
                let last = self.nodes.len() - 1;
                &mut self.nodes[last]
            }
        }
    }

    /// Locate a device by handle identity
    pub fn find_owner(&self, handle: DeviceHandle) -> Option<(&Node, &Endpoint, &Device)> {
        self.nodes.iter().find_map(|node| {
            node.find_device(handle)
                .map(|(endpoint, device)| (node, endpoint, device))
        })
    }

    /// Route a report to the devices on its endpoint, returning how many changed
    pub fn apply_report(&mut self, report: &AttributeReport) -> usize {
        let path = &report.path;
        let Some(endpoint) = self
            .node_mut(path.node_id)
            .and_then(|n| n.endpoint_mut(path.endpoint_id))
        else {
            debug!(
                node_id = path.node_id,
                endpoint = path.endpoint_id,
                "report for unknown endpoint"
            );
            return 0;
        };
        endpoint
            .devices_mut()
            .iter_mut()
            .map(|d| d.apply_report(path.cluster_id, path.attribute_id, &report.value))
            .filter(|changed| *changed)
            .count()
    }
}
