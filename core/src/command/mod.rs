//! Commands and the single-flight orchestrator that runs them.
//!
//! A command's `run` starts the work, usually by spawning it through its
//! [`Completion`], and returns. The orchestrator then waits for the completion
//! or for the command's wait duration to elapse, whichever comes first, and
//! hands the outcome to the command's callback exactly once.

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{sync::oneshot, task::AbortHandle};

use crate::{
    cache::MatterCache,
    data_model::{DeviceType, Endpoint, Inventory},
    protocol::{DeviceProtocol, ProtocolError, ReportSink, SetupCodes},
    status::GeneralCode,
    ClusterId, DeviceTypeId, EndpointId, NodeId,
};

pub mod clients;
mod commissioning_window;
mod dummy;
mod light;
mod orchestrator;
mod pairing;
mod queue;
mod subscription;
pub mod subscriptions;
mod thermostat;
mod window;

pub use clients::{ClientRegistry, ClusterClient};
pub use commissioning_window::{OpenCommissioningWindow, WindowOpenRequest};
pub use dummy::Dummy;
pub use light::{LightFields, LightRequest, LightSettings, LightSettingsCommand};
pub use orchestrator::{Orchestrator, OrchestratorHandle};
pub use pairing::{Pairing, PairingRequest};
pub use queue::{CommandQueue, QueueError};
pub use subscription::{DeviceSubscription, SubscriptionParams};
pub use subscriptions::SubscriptionRegistry;
pub use thermostat::{SetOccupiedHeatingSetpoint, SetpointRequest};
pub use window::{SetWindowPosition, WindowRequest};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("command timed out")]
    Timeout,
    #[error("node {0} is gone")]
    TargetGone(NodeId),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("gateway is shutting down")]
    ShuttingDown,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("cache: {0}")]
    Cache(String),
}

impl CommandError {
    /// The status reported back to the requester
    pub fn status(&self) -> GeneralCode {
        match self {
            Self::Timeout => GeneralCode::Timeout,
            Self::TargetGone(_) => GeneralCode::NotFound,
            Self::InvalidArgument(_) => GeneralCode::InvalidArgument,
            Self::ShuttingDown => GeneralCode::Aborted,
            Self::Protocol(e) => e.status(),
            Self::Cache(_) => GeneralCode::Failure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    None,
    Commissioned {
        node_id: NodeId,
        device_types: Vec<DeviceTypeId>,
    },
    CommissioningWindow(SetupCodes),
}

pub type CommandResult = Result<CommandOutput, CommandError>;

/// Invoked once with the command's parameters and outcome
pub type Callback<T> = Box<dyn FnOnce(&T, CommandResult) + Send>;

/// Status string for an outcome, as sent in acknowledgments
pub fn status_of(result: &CommandResult) -> GeneralCode {
    match result {
        Ok(_) => GeneralCode::Success,
        Err(e) => e.status(),
    }
}

/// Everything a command may touch while it runs
#[derive(Clone)]
pub struct CommandContext {
    pub inventory: Inventory,
    pub protocol: Arc<dyn DeviceProtocol>,
    pub clients: ClientRegistry,
    pub subscriptions: SubscriptionRegistry,
    pub cache: Arc<MatterCache>,
    pub reports: ReportSink,
}

impl CommandContext {
    /// Fails with [`CommandError::TargetGone`] if the node is not in the inventory
    pub async fn ensure_node(&self, node_id: NodeId) -> Result<(), CommandError> {
        match self.inventory.read().await.node(node_id) {
            Some(_) => Ok(()),
            None => Err(CommandError::TargetGone(node_id)),
        }
    }

    /// The first endpoint of the node serving `cluster_id`
    pub async fn endpoint_with_cluster(
        &self,
        node_id: NodeId,
        cluster_id: ClusterId,
    ) -> Result<EndpointId, CommandError> {
        let inventory = self.inventory.read().await;
        let node = inventory
            .node(node_id)
            .ok_or(CommandError::TargetGone(node_id))?;
        node.endpoint_with_cluster(cluster_id)
            .map(Endpoint::endpoint_id)
            .ok_or(CommandError::InvalidArgument("node does not serve the cluster"))
    }

    /// The first endpoint of the node carrying `device_type`
    pub async fn endpoint_with_device_type(
        &self,
        node_id: NodeId,
        device_type: DeviceType,
    ) -> Result<EndpointId, CommandError> {
        let inventory = self.inventory.read().await;
        let node = inventory
            .node(node_id)
            .ok_or(CommandError::TargetGone(node_id))?;
        node.endpoint_with_device_type(device_type)
            .map(Endpoint::endpoint_id)
            .ok_or(CommandError::InvalidArgument("node has no such device"))
    }
}

#[async_trait]
pub trait Command: Send + 'static {
    fn name(&self) -> &'static str;

    /// How long the orchestrator waits for completion before timing out
    fn wait_duration(&self) -> Duration;

    /// The node the command operates on, if any
    fn target(&self) -> Option<NodeId> {
        None
    }

    /// Start the command. Completion is signalled through `completion`;
    /// an error returned here completes the command with that error.
    async fn run(
        &mut self,
        ctx: &CommandContext,
        completion: Completion,
    ) -> Result<(), CommandError>;

    /// Consume the command, handing `result` to its callback
    fn finish(self: Box<Self>, result: CommandResult);
}

struct CompletionState {
    sender: Option<oneshot::Sender<CommandResult>>,
    tasks: Vec<AbortHandle>,
}

/// Completes a command at most once. Clones share the same state.
#[derive(Clone)]
pub struct Completion {
    state: Arc<Mutex<CompletionState>>,
}

impl Completion {
    pub(crate) fn new() -> (Self, oneshot::Receiver<CommandResult>) {
        let (tx, rx) = oneshot::channel();
        let completion = Self {
            state: Arc::new(Mutex::new(CompletionState {
                sender: Some(tx),
                tasks: vec![],
            })),
        };
        (completion, rx)
    }

    fn lock(&self) -> MutexGuard<'_, CompletionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns false if the command was already complete
    pub fn complete(&self, result: CommandResult) -> bool {
        match self.lock().sender.take() {
            Some(sender) => {
                // The receiver is only gone once the orchestrator moved on
                let _ = sender.send(result);
                true
            }
            None => false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.lock().sender.is_none()
    }

    /// Run `future` on the runtime. It is aborted if the command times out.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let mut state = self.lock();
        if state.sender.is_none() {
            handle.abort();
            return;
        }
        state.tasks.push(handle.abort_handle());
    }

    /// Spawn `future` and complete the command with its output
    pub fn spawn_result<F>(&self, future: F)
    where
        F: Future<Output = CommandResult> + Send + 'static,
    {
        let completion = self.clone();
        self.spawn(async move {
            completion.complete(future.await);
        });
    }

    pub(crate) fn abort_tasks(&self) {
        for task in self.lock().tasks.drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        cache::MemoryStore,
        data_model::{AttributeReport, NodeRegistry},
        protocol::mock::MockProtocol,
    };

    pub(crate) struct Harness {
        pub ctx: CommandContext,
        pub protocol: Arc<MockProtocol>,
        pub reports: mpsc::UnboundedReceiver<AttributeReport>,
    }

    pub(crate) fn harness(protocol: MockProtocol) -> Harness {
        let protocol = Arc::new(protocol);
        let (sink, reports) = ReportSink::channel();
        let ctx = CommandContext {
            inventory: NodeRegistry::new().into_inventory(),
            protocol: protocol.clone(),
            clients: ClientRegistry::default(),
            subscriptions: SubscriptionRegistry::default(),
            cache: Arc::new(MatterCache::new(Arc::new(MemoryStore::new()))),
            reports: sink,
        };
        Harness {
            ctx,
            protocol,
            reports,
        }
    }

    /// Run a command to completion outside an orchestrator
    pub(crate) async fn run_to_completion<C: Command>(
        mut command: C,
        ctx: &CommandContext,
    ) -> CommandResult {
        let (completion, rx) = Completion::new();
        if let Err(e) = command.run(ctx, completion.clone()).await {
            completion.complete(Err(e));
        }
        rx.await.unwrap_or(Err(CommandError::ShuttingDown))
    }

    #[tokio::test]
    async fn test_completion_is_idempotent() {
        let (completion, rx) = Completion::new();
        assert!(completion.complete(Ok(CommandOutput::None)));
        assert!(!completion.complete(Err(CommandError::Timeout)));
        assert!(completion.is_complete());
        assert_eq!(rx.await.unwrap(), Ok(CommandOutput::None));
    }

    #[tokio::test]
    async fn test_spawn_after_completion_is_aborted() {
        let (completion, _rx) = Completion::new();
        completion.complete(Err(CommandError::Timeout));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        completion.spawn(async move {
            tokio::task::yield_now().await;
            let _ = tx.send(());
        });
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_error_status() {
        assert_eq!(CommandError::Timeout.status().as_str(), "TIMEOUT");
        assert_eq!(CommandError::TargetGone(3).status().as_str(), "NOT_FOUND");
        assert_eq!(CommandError::ShuttingDown.status().as_str(), "ABORTED");
        assert_eq!(
            CommandError::Protocol(ProtocolError::Unavailable).status().as_str(),
            "BUSY"
        );
        assert_eq!(status_of(&Ok(CommandOutput::None)), GeneralCode::Success);
    }
}
