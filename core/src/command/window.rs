use std::time::Duration;

use async_trait::async_trait;

use crate::{
    cluster::{window_covering, ClusterCommand},
    NodeId,
};

use super::{
    Callback, Command, CommandContext, CommandError, CommandOutput, CommandResult, Completion,
};

const WAIT_DURATION: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRequest {
    pub node_id: NodeId,
    /// Lift percentage as the device counts it, 0 open and 100 closed
    pub position: u8,
}

/// Moves a window covering to a lift percentage
pub struct SetWindowPosition {
    request: WindowRequest,
    callback: Callback<WindowRequest>,
}

impl SetWindowPosition {
    pub fn new<F>(request: WindowRequest, callback: F) -> Self
    where
        F: FnOnce(&WindowRequest, CommandResult) + Send + 'static,
    {
        Self {
            request,
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl Command for SetWindowPosition {
    fn name(&self) -> &'static str {
        "set_window_position"
    }

    fn wait_duration(&self) -> Duration {
        WAIT_DURATION
    }

    fn target(&self) -> Option<NodeId> {
        Some(self.request.node_id)
    }

    async fn run(
        &mut self,
        ctx: &CommandContext,
        completion: Completion,
    ) -> Result<(), CommandError> {
        let WindowRequest { node_id, position } = self.request;
        if position > 100 {
            return Err(CommandError::InvalidArgument("position out of range"));
        }
        let endpoint_id = ctx
            .endpoint_with_cluster(node_id, window_covering::CLUSTER_ID)
            .await?;
        let client = ctx.clients.get_or_create(node_id, window_covering::CLUSTER_ID);
        let protocol = ctx.protocol.clone();
        let command = ClusterCommand::GoToLiftPercentage {
            percent_100ths: position as u16 * 100,
        };
        completion.spawn_result(async move {
            client.invoke(protocol.as_ref(), endpoint_id, &command).await?;
            Ok(CommandOutput::None)
        });
        Ok(())
    }

    fn finish(self: Box<Self>, result: CommandResult) {
        let this = *self;
        (this.callback)(&this.request, result)
    }
}
