//! The device-control collaborator.
//!
//! The gateway never speaks the Matter wire protocol itself. A controller stack
//! implements [`DeviceProtocol`] and the gateway serializes every call through
//! the command orchestrator.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    cluster::ClusterCommand,
    data_model::{AttributeReport, AttributeValue},
    status::GeneralCode,
    AttributeId, ClusterId, DeviceTypeId, EndpointId, FabricIndex, NodeId,
};

#[cfg(test)]
pub mod mock;

pub type SubscriptionId = u32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("device fabric is not available")]
    Unavailable,
    #[error("node {0} is unreachable")]
    Unreachable(NodeId),
    #[error("invalid setup code")]
    InvalidSetupCode,
    #[error("operation timed out")]
    Timeout,
    #[error("node responded with {0}")]
    Status(GeneralCode),
}

impl ProtocolError {
    pub fn status(&self) -> GeneralCode {
        match self {
            Self::Unavailable => GeneralCode::Busy,
            Self::Unreachable(_) => GeneralCode::NotFound,
            Self::InvalidSetupCode => GeneralCode::InvalidArgument,
            Self::Timeout => GeneralCode::Timeout,
            Self::Status(code) => *code,
        }
    }
}

/// An established CASE session with a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub node_id: NodeId,
    pub session_id: u16,
}

/// What commissioning learned about a node, besides its operational id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommissionedNode {
    pub fabric_index: FabricIndex,
    pub vendor_id: u16,
    pub product_id: u16,
    pub discriminator: u16,
    pub port: u16,
}

/// Descriptor cluster contents of one endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptor {
    pub device_type_list: Vec<DeviceTypeId>,
    pub server_list: Vec<ClusterId>,
    pub parts_list: Vec<EndpointId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub node_id: NodeId,
    pub endpoint_id: EndpointId,
    pub attributes: Vec<(ClusterId, AttributeId)>,
    /// Seconds
    pub min_interval: u16,
    /// Seconds
    pub max_interval: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissioningWindowParams {
    pub timeout: Duration,
    pub iterations: u32,
    pub discriminator: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupCodes {
    pub manual_code: String,
    pub qr_code: String,
}

/// Where subscriptions deliver attribute reports
#[derive(Debug, Clone)]
pub struct ReportSink {
    tx: mpsc::UnboundedSender<AttributeReport>,
}

impl ReportSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AttributeReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false once the gateway has stopped listening
    pub fn report(&self, report: AttributeReport) -> bool {
        self.tx.send(report).is_ok()
    }
}

#[async_trait]
pub trait DeviceProtocol: Send + Sync {
    /// Commission a device onto our fabric as `node_id`
    async fn commission(
        &self,
        node_id: NodeId,
        setup_code: &str,
    ) -> Result<CommissionedNode, ProtocolError>;

    /// Remove our fabric from the node
    async fn unpair(&self, node_id: NodeId) -> Result<(), ProtocolError>;

    async fn connect(&self, node_id: NodeId) -> Result<Session, ProtocolError>;

    async fn read_descriptor(
        &self,
        session: &Session,
        endpoint_id: EndpointId,
    ) -> Result<Descriptor, ProtocolError>;

    async fn invoke(
        &self,
        session: &Session,
        endpoint_id: EndpointId,
        command: &ClusterCommand,
    ) -> Result<(), ProtocolError>;

    async fn write_attribute(
        &self,
        session: &Session,
        endpoint_id: EndpointId,
        cluster_id: ClusterId,
        attribute_id: AttributeId,
        value: AttributeValue,
    ) -> Result<(), ProtocolError>;

    /// Resolves once the subscription is established. Reports keep flowing into `sink`.
    async fn subscribe(
        &self,
        session: &Session,
        request: SubscribeRequest,
        sink: ReportSink,
    ) -> Result<SubscriptionId, ProtocolError>;

    async fn shutdown_subscription(
        &self,
        node_id: NodeId,
        subscription_id: SubscriptionId,
    ) -> Result<(), ProtocolError>;

    async fn open_commissioning_window(
        &self,
        session: &Session,
        params: CommissioningWindowParams,
    ) -> Result<SetupCodes, ProtocolError>;
}
