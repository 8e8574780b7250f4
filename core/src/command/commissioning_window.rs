use std::time::Duration;

use async_trait::async_trait;

use crate::{
    cluster::admin_commissioning::{self, PBKDF_ITERATIONS, WINDOW_TIMEOUT},
    protocol::CommissioningWindowParams,
    NodeId,
};

use super::{
    Callback, Command, CommandContext, CommandError, CommandOutput, CommandResult, Completion,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOpenRequest {
    pub node_id: NodeId,
}

/// Opens an enhanced commissioning window so another controller can pair the node.
/// Completes with the setup codes the new controller needs.
pub struct OpenCommissioningWindow {
    request: WindowOpenRequest,
    callback: Callback<WindowOpenRequest>,
}

impl OpenCommissioningWindow {
    pub fn new<F>(request: WindowOpenRequest, callback: F) -> Self
    where
        F: FnOnce(&WindowOpenRequest, CommandResult) + Send + 'static,
    {
        Self {
            request,
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl Command for OpenCommissioningWindow {
    fn name(&self) -> &'static str {
        "open_commissioning_window"
    }

    fn wait_duration(&self) -> Duration {
        WINDOW_TIMEOUT
    }

    fn target(&self) -> Option<NodeId> {
        Some(self.request.node_id)
    }

    async fn run(
        &mut self,
        ctx: &CommandContext,
        completion: Completion,
    ) -> Result<(), CommandError> {
        let node_id = self.request.node_id;
        let discriminator = ctx
            .inventory
            .read()
            .await
            .node(node_id)
            .map(|node| node.discriminator)
            .ok_or(CommandError::TargetGone(node_id))?;
        let params = CommissioningWindowParams {
            timeout: WINDOW_TIMEOUT,
            iterations: PBKDF_ITERATIONS,
            discriminator,
        };
        let client = ctx
            .clients
            .get_or_create(node_id, admin_commissioning::CLUSTER_ID);
        let protocol = ctx.protocol.clone();
        completion.spawn_result(async move {
            let codes = client
                .open_commissioning_window(protocol.as_ref(), params)
                .await?;
            Ok(CommandOutput::CommissioningWindow(codes))
        });
        Ok(())
    }

    fn finish(self: Box<Self>, result: CommandResult) {
        let this = *self;
        (this.callback)(&this.request, result)
    }
}
