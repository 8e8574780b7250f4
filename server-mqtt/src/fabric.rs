//! The device fabric used when no Matter controller stack is linked in.
//!
//! Every operation fails with [`ProtocolError::Unavailable`], which requesters
//! see as `BUSY`. Cached nodes are still restored and announced.

use async_trait::async_trait;
use matter_gateway::{
    cluster::ClusterCommand,
    data_model::AttributeValue,
    protocol::{
        CommissionedNode, CommissioningWindowParams, Descriptor, DeviceProtocol, ProtocolError,
        ReportSink, Session, SetupCodes, SubscribeRequest, SubscriptionId,
    },
    AttributeId, ClusterId, EndpointId, NodeId,
};
use tracing::debug;

#[derive(Debug, Default)]
pub struct OfflineFabric;

fn unavailable<T>(operation: &'static str, node_id: NodeId) -> Result<T, ProtocolError> {
    debug!(operation, node_id, "no fabric attached");
    Err(ProtocolError::Unavailable)
}

#[async_trait]
impl DeviceProtocol for OfflineFabric {
    async fn commission(
        &self,
        node_id: NodeId,
        _setup_code: &str,
    ) -> Result<CommissionedNode, ProtocolError> {
        unavailable("commission", node_id)
    }

    async fn unpair(&self, node_id: NodeId) -> Result<(), ProtocolError> {
        unavailable("unpair", node_id)
    }

    async fn connect(&self, node_id: NodeId) -> Result<Session, ProtocolError> {
        unavailable("connect", node_id)
    }

    async fn read_descriptor(
        &self,
        session: &Session,
        _endpoint_id: EndpointId,
    ) -> Result<Descriptor, ProtocolError> {
        unavailable("read_descriptor", session.node_id)
    }

    async fn invoke(
        &self,
        session: &Session,
        _endpoint_id: EndpointId,
        _command: &ClusterCommand,
    ) -> Result<(), ProtocolError> {
        unavailable("invoke", session.node_id)
    }

    async fn write_attribute(
        &self,
        session: &Session,
        _endpoint_id: EndpointId,
        _cluster_id: ClusterId,
        _attribute_id: AttributeId,
        _value: AttributeValue,
    ) -> Result<(), ProtocolError> {
        unavailable("write_attribute", session.node_id)
    }

    async fn subscribe(
        &self,
        session: &Session,
        _request: SubscribeRequest,
        _sink: ReportSink,
    ) -> Result<SubscriptionId, ProtocolError> {
        unavailable("subscribe", session.node_id)
    }

    async fn shutdown_subscription(
        &self,
        node_id: NodeId,
        _subscription_id: SubscriptionId,
    ) -> Result<(), ProtocolError> {
        unavailable("shutdown_subscription", node_id)
    }

    async fn open_commissioning_window(
        &self,
        session: &Session,
        _params: CommissioningWindowParams,
    ) -> Result<SetupCodes, ProtocolError> {
        unavailable("open_commissioning_window", session.node_id)
    }
}
