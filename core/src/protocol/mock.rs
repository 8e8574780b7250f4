//! A scripted [`DeviceProtocol`] for tests

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU16, AtomicU32, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use super::*;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Commission(NodeId, String),
    Unpair(NodeId),
    Connect(NodeId),
    ReadDescriptor(NodeId, EndpointId),
    Invoke(NodeId, EndpointId, ClusterCommand),
    Write(NodeId, EndpointId, ClusterId, AttributeId, AttributeValue),
    Subscribe(SubscribeRequest),
    ShutdownSubscription(NodeId, SubscriptionId),
    OpenCommissioningWindow(NodeId, CommissioningWindowParams),
}

#[derive(Default)]
pub struct MockProtocol {
    pub calls: Mutex<Vec<Call>>,
    /// Descriptor returned for each endpoint, on any node
    pub descriptors: Mutex<HashMap<EndpointId, Descriptor>>,
    pub commissioned: Mutex<CommissionedNode>,
    /// Returned by the next operation, whatever it is
    pub fail_next: Mutex<Option<ProtocolError>>,
    /// Invokes and writes never resolve while set
    pub hang: Mutex<bool>,
    /// How long an invoke or write takes
    pub latency: Mutex<Duration>,
    pub sinks: Mutex<Vec<ReportSink>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    next_session: AtomicU16,
    next_subscription: AtomicU32,
}

impl MockProtocol {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.commissioned.lock().unwrap().fabric_index = 1;
        mock
    }

    pub fn with_descriptor(self, endpoint_id: EndpointId, descriptor: Descriptor) -> Self {
        self.descriptors
            .lock()
            .unwrap()
            .insert(endpoint_id, descriptor);
        self
    }

    pub fn fail_next(&self, error: ProtocolError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    pub fn set_hang(&self, hang: bool) {
        *self.hang.lock().unwrap() = hang;
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn invokes(&self) -> Vec<ClusterCommand> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Invoke(_, _, command) => Some(command),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) -> Result<(), ProtocolError> {
        self.calls.lock().unwrap().push(call);
        match self.fail_next.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Simulates a round trip, tracking how many overlap
    async fn round_trip(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let hang = *self.hang.lock().unwrap();
        if hang {
            std::future::pending::<()>().await;
        }
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeviceProtocol for MockProtocol {
    async fn commission(
        &self,
        node_id: NodeId,
        setup_code: &str,
    ) -> Result<CommissionedNode, ProtocolError> {
        self.record(Call::Commission(node_id, setup_code.to_string()))?;
        Ok(self.commissioned.lock().unwrap().clone())
    }

    async fn unpair(&self, node_id: NodeId) -> Result<(), ProtocolError> {
        self.record(Call::Unpair(node_id))
    }

    async fn connect(&self, node_id: NodeId) -> Result<Session, ProtocolError> {
        self.record(Call::Connect(node_id))?;
        Ok(Session {
            node_id,
            session_id: self.next_session.fetch_add(1, Ordering::SeqCst) + 1,
        })
    }

    async fn read_descriptor(
        &self,
        session: &Session,
        endpoint_id: EndpointId,
    ) -> Result<Descriptor, ProtocolError> {
        self.record(Call::ReadDescriptor(session.node_id, endpoint_id))?;
        Ok(self
            .descriptors
            .lock()
            .unwrap()
            .get(&endpoint_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn invoke(
        &self,
        session: &Session,
        endpoint_id: EndpointId,
        command: &ClusterCommand,
    ) -> Result<(), ProtocolError> {
        self.record(Call::Invoke(session.node_id, endpoint_id, command.clone()))?;
        self.round_trip().await;
        Ok(())
    }

    async fn write_attribute(
        &self,
        session: &Session,
        endpoint_id: EndpointId,
        cluster_id: ClusterId,
        attribute_id: AttributeId,
        value: AttributeValue,
    ) -> Result<(), ProtocolError> {
        self.record(Call::Write(
            session.node_id,
            endpoint_id,
            cluster_id,
            attribute_id,
            value,
        ))?;
        self.round_trip().await;
        Ok(())
    }

    async fn subscribe(
        &self,
        _session: &Session,
        request: SubscribeRequest,
        sink: ReportSink,
    ) -> Result<SubscriptionId, ProtocolError> {
        self.record(Call::Subscribe(request))?;
        self.sinks.lock().unwrap().push(sink);
        Ok(self.next_subscription.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn shutdown_subscription(
        &self,
        node_id: NodeId,
        subscription_id: SubscriptionId,
    ) -> Result<(), ProtocolError> {
        self.record(Call::ShutdownSubscription(node_id, subscription_id))
    }

    async fn open_commissioning_window(
        &self,
        session: &Session,
        params: CommissioningWindowParams,
    ) -> Result<SetupCodes, ProtocolError> {
        self.record(Call::OpenCommissioningWindow(session.node_id, params))?;
        Ok(SetupCodes {
            manual_code: "34970112332".to_string(),
            qr_code: "MT:Y.K9042C00KA0648G00".to_string(),
        })
    }
}
