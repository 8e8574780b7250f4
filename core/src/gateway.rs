//! Wires the router, the command queue and the notifier around one inventory.

use std::sync::Arc;

use common::{
    topics::GATEWAY_INIT_TOPIC, CommissioningOpenResponse, CommissioningResponse, ControlAck,
    DeviceInit, DeviceKind, GatewayInit, LightAck, RemoveNodeResponse, SetpointResult,
    SubscriptionResponse, Topics,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    cache::{BlobStore, MatterCache, MAX_CACHE_SIZE},
    command::{
        status_of, ClientRegistry, Command, CommandContext, CommandOutput, CommandQueue,
        DeviceSubscription, LightSettingsCommand, OpenCommissioningWindow, Orchestrator,
        OrchestratorHandle, Pairing, PairingRequest, SetOccupiedHeatingSetpoint, SetWindowPosition,
        SubscriptionParams, SubscriptionRegistry, WindowOpenRequest,
    },
    data_model::{Inventory, NodeRegistry},
    notifier::StateNotifier,
    outbox::Outbox,
    protocol::{DeviceProtocol, ReportSink},
    router::{MessageRouter, Request},
    NodeId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Prefix of every gateway topic
    pub mac: String,
    pub max_cache_size: usize,
}

impl GatewayConfig {
    pub fn new(mac: impl Into<String>) -> Self {
        Self {
            mac: mac.into(),
            max_cache_size: MAX_CACHE_SIZE,
        }
    }
}

#[derive(Clone)]
pub struct Gateway {
    topics: Topics,
    ctx: CommandContext,
    queue: Arc<CommandQueue>,
    outbox: Outbox,
    router: Arc<MessageRouter>,
    notifier: Arc<StateNotifier>,
}

/// Background tasks of a started [`Gateway`]
pub struct GatewayHandle {
    orchestrator: OrchestratorHandle,
    report_pump: JoinHandle<()>,
    notifier: JoinHandle<()>,
}

impl GatewayHandle {
    /// Fail queued commands, then stop applying reports and publishing changes
    pub async fn shutdown(self) {
        self.orchestrator.shutdown().await;
        self.report_pump.abort();
        self.notifier.abort();
        info!("gateway stopped");
    }
}

impl Gateway {
    pub fn start(
        config: GatewayConfig,
        protocol: Arc<dyn DeviceProtocol>,
        store: Arc<dyn BlobStore>,
        outbox: Outbox,
    ) -> (Self, GatewayHandle) {
        let topics = Topics::new(config.mac);
        let inventory = NodeRegistry::new().into_inventory();
        let (reports, mut report_rx) = ReportSink::channel();
        let ctx = CommandContext {
            inventory: inventory.clone(),
            protocol,
            clients: ClientRegistry::default(),
            subscriptions: SubscriptionRegistry::default(),
            cache: Arc::new(MatterCache::with_max_size(store, config.max_cache_size)),
            reports,
        };
        let queue = Arc::new(CommandQueue::new());
        let orchestrator = Orchestrator::new(queue.clone(), ctx.clone()).start();

        let (notifier, notifier_task) =
            StateNotifier::new(inventory.clone(), topics.clone(), outbox.clone());
        let notifier_join = tokio::spawn(notifier_task.run());

        let report_pump = tokio::spawn(async move {
            while let Some(report) = report_rx.recv().await {
                let changed = inventory.write().await.apply_report(&report);
                if changed == 0 {
                    debug!(path = ?report.path, "report changed nothing");
                }
            }
        });

        let gateway = Self {
            router: Arc::new(MessageRouter::new(topics.clone(), outbox.clone())),
            topics,
            ctx,
            queue,
            outbox,
            notifier,
        };
        info!(mac = gateway.topics.mac(), "gateway started");
        let handle = GatewayHandle {
            orchestrator,
            report_pump,
            notifier: notifier_join,
        };
        (gateway, handle)
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn inventory(&self) -> &Inventory {
        &self.ctx.inventory
    }

    /// Route an inbound message and act on it
    pub fn handle_message(&self, topic: &str, payload: &[u8]) {
        let request = self.router.route(topic, payload);
        self.dispatch(request);
    }

    pub fn dispatch(&self, request: Request) {
        match request {
            Request::Commission { setup_code } => {
                let gateway = self.clone();
                self.enqueue(Pairing::commission(setup_code, move |request, result| {
                    let code = match request {
                        PairingRequest::Commission { setup_code } => setup_code.as_str(),
                        PairingRequest::Unpair { .. } => "",
                    };
                    gateway.outbox.publish_json(
                        gateway.topics.commissioning_response(),
                        &CommissioningResponse {
                            code: code.to_string(),
                            status: status_of(&result).to_string(),
                        },
                    );
                    if let Ok(CommandOutput::Commissioned { node_id, .. }) = result {
                        tokio::spawn(async move { gateway.on_node_ready(node_id).await });
                    }
                }));
            }
            Request::RemoveNode { node_id } => {
                let gateway = self.clone();
                self.enqueue(Pairing::unpair(node_id, move |_, result| {
                    let response = RemoveNodeResponse {
                        id: node_id,
                        status: status_of(&result).to_string(),
                    };
                    if result.is_err() {
                        gateway
                            .outbox
                            .publish_json(gateway.topics.remove_node_response(), &response);
                        return;
                    }
                    tokio::spawn(async move {
                        gateway.remove_node(node_id).await;
                        gateway
                            .outbox
                            .publish_json(gateway.topics.remove_node_response(), &response);
                    });
                }));
            }
            Request::OpenCommissioningWindow { node_id } => {
                let (outbox, topics) = (self.outbox.clone(), self.topics.clone());
                let request = WindowOpenRequest { node_id };
                self.enqueue(OpenCommissioningWindow::new(request, move |_, result| {
                    let codes = match &result {
                        Ok(CommandOutput::CommissioningWindow(codes)) => codes.clone(),
                        _ => Default::default(),
                    };
                    outbox.publish_json(
                        topics.commissioning_open_response(),
                        &CommissioningOpenResponse {
                            id: node_id,
                            status: status_of(&result).to_string(),
                            manual_code: codes.manual_code,
                            qr_code: codes.qr_code,
                        },
                    );
                }));
            }
            Request::WindowPosition(request) => {
                let (outbox, topics) = (self.outbox.clone(), self.topics.clone());
                self.enqueue(SetWindowPosition::new(request, move |request, result| {
                    let ack = ControlAck {
                        id: Some(request.node_id),
                        success: result.is_ok(),
                        status: status_of(&result).to_string(),
                        pos: Some(request.position),
                    };
                    outbox.publish_json(topics.control_ack(request.node_id), &ack);
                }));
            }
            Request::Light(request) => {
                let (outbox, topics) = (self.outbox.clone(), self.topics.clone());
                self.enqueue(LightSettingsCommand::new(request, move |request, result| {
                    if let Err(e) = &result {
                        warn!(node_id = request.node_id, error = %e, "light request failed");
                    }
                    let ack = LightAck {
                        kind: DeviceKind::Light,
                        success: result.is_ok() as u8,
                    };
                    outbox.publish_json(topics.control_ack(request.node_id), &ack);
                }));
            }
            Request::HeatingSetpoint(request) => {
                let (outbox, topics) = (self.outbox.clone(), self.topics.clone());
                self.enqueue(SetOccupiedHeatingSetpoint::new(
                    request,
                    move |request, result| {
                        let reply = SetpointResult {
                            id: request.node_id,
                            setpoint: request.setpoint as f32 / 100.0,
                            error: status_of(&result).to_string(),
                        };
                        outbox.publish_json(topics.device_control(request.node_id), &reply);
                    },
                ));
            }
            Request::Unknown => {}
        }
    }

    fn enqueue(&self, command: impl Command) {
        if let Err(e) = self.queue.enqueue(Box::new(command)) {
            debug!(error = %e, "command not queued");
        }
    }

    /// Hook a node's devices up to the notifier, announce them and subscribe to their state
    pub async fn on_node_ready(&self, node_id: NodeId) {
        let mut devices = vec![];
        {
            let mut inventory = self.ctx.inventory.write().await;
            let Some(node) = inventory.node_mut(node_id) else {
                debug!(node_id, "node gone before it was ready");
                return;
            };
            for endpoint in node.endpoints_mut() {
                let endpoint_id = endpoint.endpoint_id();
                for device in endpoint.devices_mut() {
                    device.set_delegate(self.notifier.clone());
                    devices.push(SubscriptionParams {
                        node_id,
                        endpoint_id,
                        device_type: device.device_type(),
                    });
                }
            }
        }

        let mut kinds: Vec<DeviceKind> = vec![];
        for params in &devices {
            let kind = params.device_type.kind();
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        for kind in kinds {
            let init = DeviceInit {
                power_on: true,
                id: node_id,
                kind,
            };
            self.outbox.publish_json(self.topics.device_init(), &init);
        }

        for params in devices {
            let (outbox, topics) = (self.outbox.clone(), self.topics.clone());
            self.enqueue(DeviceSubscription::new(params, move |params, result| {
                let response = SubscriptionResponse {
                    id: params.node_id,
                    endpoint: params.endpoint_id,
                    device_type: format!("0x{:04X}", params.device_type.id()),
                    status: status_of(&result).to_string(),
                };
                outbox.publish_json(topics.subscription_response(), &response);
            }));
        }
        info!(node_id, "node ready");
    }

    /// Bring back the cached nodes. Returns how many were restored.
    pub async fn restore(&self) -> usize {
        let nodes = self.ctx.cache.load();
        let node_ids: Vec<_> = nodes.iter().map(|node| node.node_id).collect();
        {
            let mut inventory = self.ctx.inventory.write().await;
            for node in nodes {
                inventory.merge(node);
            }
        }
        for &node_id in &node_ids {
            self.on_node_ready(node_id).await;
        }
        info!(nodes = node_ids.len(), "restored from cache");
        node_ids.len()
    }

    /// Forget a node and everything held on its behalf. Returns false if it was unknown.
    pub async fn remove_node(&self, node_id: NodeId) -> bool {
        let removed = self.ctx.inventory.write().await.remove_node(node_id);
        if removed.is_none() {
            debug!(node_id, "remove of unknown node");
            return false;
        }
        if let Err(e) = self.ctx.cache.delete_node(node_id) {
            warn!(node_id, error = %e, "could not delete node from cache");
        }
        let clients = self.ctx.clients.remove_node(node_id);
        let subscriptions = self
            .ctx
            .subscriptions
            .shutdown_node(self.ctx.protocol.as_ref(), node_id)
            .await;
        let failed = self.queue.fail_target(node_id);
        info!(node_id, clients, subscriptions, failed, "node removed");
        true
    }

    /// Announce the gateway on its presence topic
    pub fn publish_init(&self) -> bool {
        let init = GatewayInit {
            power_on: true,
            gw_mac: self.topics.mac().to_string(),
        };
        self.outbox.publish_json(GATEWAY_INIT_TOPIC, &init)
    }
}
