use std::time::Duration;

use async_trait::async_trait;
use bitflags::bitflags;

use crate::{
    cluster::{color_control, level, rescale, ClusterCommand},
    data_model::DeviceType,
    NodeId,
};

use super::{
    Callback, Command, CommandContext, CommandError, CommandOutput, CommandResult, Completion,
};

const WAIT_DURATION: Duration = Duration::from_secs(600);

bitflags! {
    /// Which parts of [`LightSettings`] to apply
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LightFields: u8 {
        /// Hue, saturation and brightness
        const COLOR = 0b001;
        const COLOR_TEMPERATURE = 0b010;
        /// On or off
        const ACTION = 0b100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LightSettings {
    pub fields: LightFields,
    /// Degrees, 0-360
    pub hue: u16,
    /// Percent
    pub saturation: u8,
    /// Brightness in percent
    pub value: u8,
    pub temperature_kelvin: u16,
    pub on: bool,
}

impl LightSettings {
    /// The cluster commands that apply these settings, in the order they are sent
    pub fn commands(&self) -> Vec<ClusterCommand> {
        let mut commands = vec![];
        if self.fields.contains(LightFields::COLOR) {
            commands.push(ClusterCommand::MoveToHueAndSaturation {
                hue: rescale(self.hue as u32, 360, color_control::MAX_HUE as u32) as u8,
                saturation: rescale(
                    self.saturation as u32,
                    100,
                    color_control::MAX_SATURATION as u32,
                ) as u8,
                transition_time: 0,
            });
            commands.push(ClusterCommand::MoveToLevel {
                level: rescale(self.value as u32, 100, level::MAX_LEVEL as u32) as u8,
                transition_time: None,
            });
        }
        if self.fields.contains(LightFields::COLOR_TEMPERATURE) {
            commands.push(ClusterCommand::MoveToColorTemperature {
                mireds: color_control::kelvin_to_mireds(self.temperature_kelvin),
                transition_time: 0,
            });
        }
        if self.fields.contains(LightFields::ACTION) {
            commands.push(if self.on {
                ClusterCommand::On
            } else {
                ClusterCommand::Off
            });
        }
        commands
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightRequest {
    pub node_id: NodeId,
    pub settings: LightSettings,
}

/// Applies color, color temperature and on/off to an extended color light.
/// Commands are sent one after another and the first failure ends the run.
pub struct LightSettingsCommand {
    request: LightRequest,
    callback: Callback<LightRequest>,
}

impl LightSettingsCommand {
    pub fn new<F>(request: LightRequest, callback: F) -> Self
    where
        F: FnOnce(&LightRequest, CommandResult) + Send + 'static,
    {
        Self {
            request,
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl Command for LightSettingsCommand {
    fn name(&self) -> &'static str {
        "light_settings"
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
        let LightRequest { node_id, settings } = self.request;
        let commands = settings.commands();
        if commands.is_empty() {
            return Err(CommandError::InvalidArgument("no light settings given"));
        }
        let endpoint_id = ctx
            .endpoint_with_device_type(node_id, DeviceType::ExtendedColorLight)
            .await?;
        let clients = ctx.clients.clone();
        let protocol = ctx.protocol.clone();
        completion.spawn_result(async move {
            for command in &commands {
                clients
                    .get_or_create(node_id, command.cluster_id())
                    .invoke(protocol.as_ref(), endpoint_id, command)
                    .await?;
            }
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
    use super::*;
    use crate::{
        command::tests::{harness, run_to_completion, Harness},
        data_model::Node,
        protocol::{mock::MockProtocol, ProtocolError},
    };

    fn settings(fields: LightFields) -> LightSettings {
        LightSettings {
            fields,
            hue: 180,
            saturation: 50,
            value: 100,
            temperature_kelvin: 4000,
            on: true,
        }
    }

    #[test]
    fn test_commands_in_order() {
        assert_eq!(
            settings(LightFields::all()).commands(),
            vec![
                ClusterCommand::MoveToHueAndSaturation {
                    hue: 127,
                    saturation: 127,
                    transition_time: 0
                },
                ClusterCommand::MoveToLevel {
                    level: 254,
                    transition_time: None
                },
                ClusterCommand::MoveToColorTemperature {
                    mireds: 250,
                    transition_time: 0
                },
                ClusterCommand::On,
            ]
        );
        let off = LightSettings {
            on: false,
            ..settings(LightFields::ACTION)
        };
        assert_eq!(off.commands(), vec![ClusterCommand::Off]);
        assert!(settings(LightFields::empty()).commands().is_empty());
    }

    async fn add_light(h: &Harness) {
        let mut node = Node::new(8, 1);
        node.get_or_add_endpoint(1)
            .add_device_type(DeviceType::ExtendedColorLight.id());
        h.ctx.inventory.write().await.merge(node);
    }

    fn command(fields: LightFields) -> LightSettingsCommand {
        LightSettingsCommand::new(
            LightRequest {
                node_id: 8,
                settings: settings(fields),
            },
            |_, _| {},
        )
    }

    #[tokio::test]
    async fn test_sends_each_command() {
        let h = harness(MockProtocol::new());
        add_light(&h).await;
        let result = run_to_completion(
            command(LightFields::COLOR_TEMPERATURE | LightFields::ACTION),
            &h.ctx,
        )
        .await;
        assert_eq!(result, Ok(CommandOutput::None));
        assert_eq!(
            h.protocol.invokes(),
            vec![
                ClusterCommand::MoveToColorTemperature {
                    mireds: 250,
                    transition_time: 0
                },
                ClusterCommand::On
            ]
        );
        // one client per cluster
        assert_eq!(h.ctx.clients.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_fields_rejected() {
        let h = harness(MockProtocol::new());
        add_light(&h).await;
        let result = run_to_completion(command(LightFields::empty()), &h.ctx).await;
        assert!(matches!(result, Err(CommandError::InvalidArgument(_))));
        assert!(h.protocol.calls().is_empty());
    }

    #[tokio::test]
    async fn test_first_failure_stops() {
        let h = harness(MockProtocol::new());
        add_light(&h).await;
        h.protocol.fail_next(ProtocolError::Timeout);
        let result = run_to_completion(command(LightFields::all()), &h.ctx).await;
        assert_eq!(result, Err(CommandError::Protocol(ProtocolError::Timeout)));
        assert!(h.protocol.invokes().is_empty());
    }
}
