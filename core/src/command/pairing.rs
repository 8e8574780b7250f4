use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{info, warn};

use crate::{
    cluster::descriptor,
    data_model::{DeviceType, Node, ROOT_ENDPOINT_ID},
    protocol::Descriptor,
    EndpointId, NodeId,
};

use super::{
    Callback, Command, CommandContext, CommandError, CommandOutput, CommandResult, Completion,
};

const WAIT_DURATION: Duration = Duration::from_secs(120);

/// Operational node ids stop short of the reserved group and temporary ranges
pub const MAX_OPERATIONAL_NODE_ID: NodeId = 0xFFFF_FFEF_FFFF_FFFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingRequest {
    Commission { setup_code: String },
    Unpair { node_id: NodeId },
}

/// Commissions a new node from its setup code, or removes this fabric from a node
pub struct Pairing {
    request: PairingRequest,
    callback: Callback<PairingRequest>,
}

impl Pairing {
    pub fn commission<F>(setup_code: impl Into<String>, callback: F) -> Self
    where
        F: FnOnce(&PairingRequest, CommandResult) + Send + 'static,
    {
        Self {
            request: PairingRequest::Commission {
                setup_code: setup_code.into(),
            },
            callback: Box::new(callback),
        }
    }

    pub fn unpair<F>(node_id: NodeId, callback: F) -> Self
    where
        F: FnOnce(&PairingRequest, CommandResult) + Send + 'static,
    {
        Self {
            request: PairingRequest::Unpair { node_id },
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl Command for Pairing {
    fn name(&self) -> &'static str {
        match self.request {
            PairingRequest::Commission { .. } => "commission",
            PairingRequest::Unpair { .. } => "unpair",
        }
    }

    fn wait_duration(&self) -> Duration {
        WAIT_DURATION
    }

    fn target(&self) -> Option<NodeId> {
        match self.request {
            PairingRequest::Commission { .. } => None,
            PairingRequest::Unpair { node_id } => Some(node_id),
        }
    }

    async fn run(
        &mut self,
        ctx: &CommandContext,
        completion: Completion,
    ) -> Result<(), CommandError> {
        match &self.request {
            PairingRequest::Commission { setup_code } => {
                if setup_code.trim().is_empty() {
                    return Err(CommandError::InvalidArgument("empty setup code"));
                }
                let node_id = random_node_id(ctx).await;
                completion.spawn_result(commission(ctx.clone(), node_id, setup_code.clone()));
            }
            &PairingRequest::Unpair { node_id } => {
                ctx.ensure_node(node_id).await?;
                let protocol = ctx.protocol.clone();
                completion.spawn_result(async move {
                    protocol.unpair(node_id).await?;
                    info!(node_id, "unpaired");
                    Ok(CommandOutput::None)
                });
            }
        }
        Ok(())
    }

    fn finish(self: Box<Self>, result: CommandResult) {
        let this = *self;
        (this.callback)(&this.request, result)
    }
}

/// A random operational node id not already in the inventory
async fn random_node_id(ctx: &CommandContext) -> NodeId {
    let inventory = ctx.inventory.read().await;
    loop {
        let node_id = rand::thread_rng().gen_range(1..=MAX_OPERATIONAL_NODE_ID);
        if inventory.node(node_id).is_none() {
            return node_id;
        }
    }
}

async fn commission(ctx: CommandContext, node_id: NodeId, setup_code: String) -> CommandResult {
    info!(node_id, "commissioning");
    let commissioned = ctx.protocol.commission(node_id, &setup_code).await?;

    let mut node = Node::new(node_id, commissioned.fabric_index);
    node.vendor_id = commissioned.vendor_id;
    node.product_id = commissioned.product_id;
    node.discriminator = commissioned.discriminator;
    node.port = commissioned.port;
    node.setup_payload = setup_code;

    let client = ctx.clients.get_or_create(node_id, descriptor::CLUSTER_ID);
    let root = client
        .read_descriptor(ctx.protocol.as_ref(), ROOT_ENDPOINT_ID)
        .await?;
    add_descriptor(&mut node, ROOT_ENDPOINT_ID, &root);
    for &endpoint_id in root.parts_list.iter().filter(|&&e| e != ROOT_ENDPOINT_ID) {
        let part = client
            .read_descriptor(ctx.protocol.as_ref(), endpoint_id)
            .await?;
        add_descriptor(&mut node, endpoint_id, &part);
    }

    let device_types: Vec<_> = node
        .device_types()
        .into_iter()
        .filter(|&id| DeviceType::from_id(id).is_some())
        .collect();

    let mut inventory = ctx.inventory.write().await;
    let live = inventory.merge(node);
    if let Err(e) = ctx.cache.add_node(live) {
        warn!(node_id, error = %e, "could not cache commissioned node");
    }
    info!(node_id, ?device_types, "commissioned");
    Ok(CommandOutput::Commissioned {
        node_id,
        device_types,
    })
}

fn add_descriptor(node: &mut Node, endpoint_id: EndpointId, descriptor: &Descriptor) {
    let endpoint = node.get_or_add_endpoint(endpoint_id);
    for &cluster_id in &descriptor.server_list {
        endpoint.add_cluster(cluster_id);
    }
    for &device_type in &descriptor.device_type_list {
        endpoint.add_device_type(device_type);
    }
}
