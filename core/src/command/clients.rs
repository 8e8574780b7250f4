use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::debug;

use crate::{
    cluster::ClusterCommand,
    data_model::AttributeValue,
    protocol::{
        CommissioningWindowParams, Descriptor, DeviceProtocol, ProtocolError, ReportSink,
        Session, SetupCodes, SubscribeRequest, SubscriptionId,
    },
    AttributeId, ClusterId, EndpointId, NodeId,
};

/// A cluster on one node, with a lazily connected session
#[derive(Debug, Clone)]
pub struct ClusterClient {
    node_id: NodeId,
    cluster_id: ClusterId,
    session: Arc<tokio::sync::Mutex<Option<Session>>>,
}

impl ClusterClient {
    fn new(node_id: NodeId, cluster_id: ClusterId) -> Self {
        Self {
            node_id,
            cluster_id,
            session: Default::default(),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn cluster_id(&self) -> ClusterId {
        self.cluster_id
    }

    /// The cached session, connecting first if there is none
    pub async fn session(&self, protocol: &dyn DeviceProtocol) -> Result<Session, ProtocolError> {
        let mut cached = self.session.lock().await;
        if let Some(session) = *cached {
            return Ok(session);
        }
        let connected = protocol.connect(self.node_id).await?;
        debug!(
            node_id = self.node_id,
            cluster = self.cluster_id,
            session = connected.session_id,
            "connected"
        );
        *cached = Some(connected);
        Ok(connected)
    }

    /// Forget the session so the next call reconnects
    pub async fn invalidate(&self) {
        self.session.lock().await.take();
    }

    /// A failed operation drops the session
    async fn settle<T>(&self, result: Result<T, ProtocolError>) -> Result<T, ProtocolError> {
        if result.is_err() {
            self.invalidate().await;
        }
        result
    }

    pub async fn invoke(
        &self,
        protocol: &dyn DeviceProtocol,
        endpoint_id: EndpointId,
        command: &ClusterCommand,
    ) -> Result<(), ProtocolError> {
        let session = self.session(protocol).await?;
        let result = protocol.invoke(&session, endpoint_id, command).await;
        self.settle(result).await
    }

    pub async fn write_attribute(
        &self,
        protocol: &dyn DeviceProtocol,
        endpoint_id: EndpointId,
        attribute_id: AttributeId,
        value: AttributeValue,
    ) -> Result<(), ProtocolError> {
        let session = self.session(protocol).await?;
        let result = protocol
            .write_attribute(&session, endpoint_id, self.cluster_id, attribute_id, value)
            .await;
        self.settle(result).await
    }

    pub async fn read_descriptor(
        &self,
        protocol: &dyn DeviceProtocol,
        endpoint_id: EndpointId,
    ) -> Result<Descriptor, ProtocolError> {
        let session = self.session(protocol).await?;
        let result = protocol.read_descriptor(&session, endpoint_id).await;
        self.settle(result).await
    }

    pub async fn subscribe(
        &self,
        protocol: &dyn DeviceProtocol,
        request: SubscribeRequest,
        sink: ReportSink,
    ) -> Result<SubscriptionId, ProtocolError> {
        let session = self.session(protocol).await?;
        let result = protocol.subscribe(&session, request, sink).await;
        self.settle(result).await
    }

    pub async fn open_commissioning_window(
        &self,
        protocol: &dyn DeviceProtocol,
        params: CommissioningWindowParams,
    ) -> Result<SetupCodes, ProtocolError> {
        let session = self.session(protocol).await?;
        let result = protocol.open_commissioning_window(&session, params).await;
        self.settle(result).await
    }
}

/// Cluster clients keyed by (node, cluster), created on first use
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<Mutex<HashMap<(NodeId, ClusterId), ClusterClient>>>,
}

impl ClientRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<(NodeId, ClusterId), ClusterClient>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_or_create(&self, node_id: NodeId, cluster_id: ClusterId) -> ClusterClient {
        self.lock()
            .entry((node_id, cluster_id))
            .or_insert_with(|| ClusterClient::new(node_id, cluster_id))
            .clone()
    }

    pub fn contains(&self, node_id: NodeId, cluster_id: ClusterId) -> bool {
        self.lock().contains_key(&(node_id, cluster_id))
    }

    /// Drop every client of `node_id`, returning how many there were
    pub fn remove_node(&self, node_id: NodeId) -> usize {
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|&(node, _), _| node != node_id);
        before - clients.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
