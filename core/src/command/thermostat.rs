use std::time::Duration;

use async_trait::async_trait;

use crate::{cluster::thermostat, data_model::AttributeValue, NodeId};

use super::{
    Callback, Command, CommandContext, CommandError, CommandOutput, CommandResult, Completion,
};

const WAIT_DURATION: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetpointRequest {
    pub node_id: NodeId,
    /// 100ths of a degree Celsius
    pub setpoint: i16,
}

/// Writes the occupied heating setpoint of a thermostat
pub struct SetOccupiedHeatingSetpoint {
    request: SetpointRequest,
    callback: Callback<SetpointRequest>,
}

impl SetOccupiedHeatingSetpoint {
    pub fn new<F>(request: SetpointRequest, callback: F) -> Self
    where
        F: FnOnce(&SetpointRequest, CommandResult) + Send + 'static,
    {
        Self {
            request,
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl Command for SetOccupiedHeatingSetpoint {
    fn name(&self) -> &'static str {
        "set_occupied_heating_setpoint"
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
        let SetpointRequest { node_id, setpoint } = self.request;
        let endpoint_id = ctx
            .endpoint_with_cluster(node_id, thermostat::CLUSTER_ID)
            .await?;
        let client = ctx.clients.get_or_create(node_id, thermostat::CLUSTER_ID);
        let protocol = ctx.protocol.clone();
        completion.spawn_result(async move {
            client
                .write_attribute(
                    protocol.as_ref(),
                    endpoint_id,
                    thermostat::Attributes::OccupiedHeatingSetpoint as _,
                    AttributeValue::I16(setpoint),
                )
                .await?;
            Ok(CommandOutput::None)
        });
        Ok(())
    }

    fn finish(self: Box<Self>, result: CommandResult) {
        let this = *self;
        (this.callback)(&this.request, result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        command::tests::{harness, run_to_completion},
        data_model::Node,
        protocol::mock::{Call, MockProtocol},
    };

    #[tokio::test]
    async fn test_writes_setpoint() {
        let h = harness(MockProtocol::new());
        let mut node = Node::new(3, 1);
        node.get_or_add_endpoint(2).add_cluster(thermostat::CLUSTER_ID);
        h.ctx.inventory.write().await.merge(node);

        let request = SetpointRequest {
            node_id: 3,
            setpoint: 2150,
        };
        let command = SetOccupiedHeatingSetpoint::new(request, |_, _| {});
        let result = run_to_completion(command, &h.ctx).await;
        assert_eq!(result, Ok(CommandOutput::None));
        assert!(h.protocol.calls().contains(&Call::Write(
            3,
            2,
            0x0201,
            0x0012,
            AttributeValue::I16(2150)
        )));
    }

    #[tokio::test]
    async fn test_callback_gets_request() {
        let request = SetpointRequest {
            node_id: 3,
            setpoint: -500,
        };
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let command: Box<dyn Command> =
            Box::new(SetOccupiedHeatingSetpoint::new(request, move |r, result| {
                *sink.lock().unwrap() = Some((*r, result))
            }));
        command.finish(Err(CommandError::Timeout));
        assert_eq!(
            seen.lock().unwrap().take(),
            Some((request, Err(CommandError::Timeout)))
        );
    }
}
