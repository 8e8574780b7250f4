use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    data_model::DeviceType,
    protocol::SubscribeRequest,
    EndpointId, NodeId,
};

use super::{
    Callback, Command, CommandContext, CommandError, CommandOutput, CommandResult, Completion,
};

const WAIT_DURATION: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionParams {
    pub node_id: NodeId,
    pub endpoint_id: EndpointId,
    pub device_type: DeviceType,
}

impl SubscriptionParams {
    pub fn request(&self) -> SubscribeRequest {
        let (min_interval, max_interval) = self.device_type.subscription_intervals();
        SubscribeRequest {
            node_id: self.node_id,
            endpoint_id: self.endpoint_id,
            attributes: self.device_type.tracked_attributes().to_vec(),
            min_interval,
            max_interval,
        }
    }
}

/// Subscribes to the attributes a device tracks. Reports flow into the
/// context's report sink for as long as the subscription lives.
pub struct DeviceSubscription {
    params: SubscriptionParams,
    callback: Callback<SubscriptionParams>,
}

impl DeviceSubscription {
    pub fn new<F>(params: SubscriptionParams, callback: F) -> Self
    where
        F: FnOnce(&SubscriptionParams, CommandResult) + Send + 'static,
    {
        Self {
            params,
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl Command for DeviceSubscription {
    fn name(&self) -> &'static str {
        "device_subscription"
    }

    fn wait_duration(&self) -> Duration {
        WAIT_DURATION
    }

    fn target(&self) -> Option<NodeId> {
        Some(self.params.node_id)
    }

    async fn run(
        &mut self,
        ctx: &CommandContext,
        completion: Completion,
    ) -> Result<(), CommandError> {
        let params = self.params;
        {
            let inventory = ctx.inventory.read().await;
            let node = inventory
                .node(params.node_id)
                .ok_or(CommandError::TargetGone(params.node_id))?;
            let present = node
                .endpoint(params.endpoint_id)
                .and_then(|e| e.device(params.device_type))
                .is_some();
            if !present {
                return Err(CommandError::InvalidArgument("no such device on the endpoint"));
            }
        }
        let request = params.request();
        let Some(&(cluster_id, _)) = request.attributes.first() else {
            return Err(CommandError::InvalidArgument("device tracks no attributes"));
        };
        let client = ctx.clients.get_or_create(params.node_id, cluster_id);
        let ctx = ctx.clone();
        completion.spawn_result(async move {
            let id = client
                .subscribe(ctx.protocol.as_ref(), request, ctx.reports.clone())
                .await?;
            // The node may have been removed while the subscribe was in flight
            let inventory = ctx.inventory.read().await;
            if inventory.node(params.node_id).is_none() {
                drop(inventory);
                let shutdown = ctx.protocol.shutdown_subscription(params.node_id, id);
                if let Err(e) = shutdown.await {
                    warn!(
                        node_id = params.node_id,
                        error = %e,
                        "could not drop orphan subscription"
                    );
                }
                return Err(CommandError::TargetGone(params.node_id));
            }
            // Registered under the read guard so a removal either sees this id or waits for it
            ctx.subscriptions.add(params.node_id, id);
            drop(inventory);
            debug!(
                node_id = params.node_id,
                endpoint = params.endpoint_id,
                device_type = ?params.device_type,
                subscription = id,
                "subscribed"
            );
            Ok(CommandOutput::None)
        });
        Ok(())
    }

    fn finish(self: Box<Self>, result: CommandResult) {
        let this = *self;
        (this.callback)(&this.params, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        command::tests::{harness, run_to_completion},
        data_model::{AttributePath, AttributeReport, AttributeValue, Node},
        protocol::mock::{Call, MockProtocol},
    };

    fn params() -> SubscriptionParams {
        SubscriptionParams {
            node_id: 21,
            endpoint_id: 1,
            device_type: DeviceType::WindowCovering,
        }
    }

    #[test]
    fn test_request_from_device_type() {
        let request = params().request();
        assert_eq!(request.attributes, vec![(0x0102, 0x000E)]);
        assert_eq!((request.min_interval, request.max_interval), (5, 30));
    }

    #[tokio::test]
    async fn test_subscribes_and_registers() {
        let mut h = harness(MockProtocol::new());
        let mut node = Node::new(21, 1);
        node.get_or_add_endpoint(1)
            .add_device_type(DeviceType::WindowCovering.id());
        h.ctx.inventory.write().await.merge(node);

        let command = DeviceSubscription::new(params(), |_, _| {});
        let result = run_to_completion(command, &h.ctx).await;
        assert_eq!(result, Ok(CommandOutput::None));
        assert_eq!(h.ctx.subscriptions.get(21), vec![1]);

        // reports pushed by the device reach the context's sink
        let report = AttributeReport {
            path: AttributePath {
                node_id: 21,
                endpoint_id: 1,
                cluster_id: 0x0102,
                attribute_id: 0x000E,
            },
            value: AttributeValue::U16(2500),
        };
        let sink = h.protocol.sinks.lock().unwrap()[0].clone();
        assert!(sink.report(report.clone()));
        assert_eq!(h.reports.recv().await, Some(report));

        let shut = h
            .ctx
            .subscriptions
            .shutdown_node(h.ctx.protocol.as_ref(), 21)
            .await;
        assert_eq!(shut, 1);
        assert!(h.ctx.subscriptions.get(21).is_empty());
        assert!(h.protocol.calls().contains(&Call::ShutdownSubscription(21, 1)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_removal_leaves_no_subscription() {
        for _ in 0..100 {
            let h = harness(MockProtocol::new());
            let mut node = Node::new(21, 1);
            node.get_or_add_endpoint(1)
                .add_device_type(DeviceType::WindowCovering.id());
            h.ctx.inventory.write().await.merge(node);

            let ctx = h.ctx.clone();
            let subscribe = tokio::spawn(async move {
                let command = DeviceSubscription::new(params(), |_, _| {});
                run_to_completion(command, &ctx).await
            });
            let ctx = h.ctx.clone();
            let remove = tokio::spawn(async move {
                let removed = ctx.inventory.write().await.remove_node(21);
                assert!(removed.is_some());
                ctx.subscriptions
                    .shutdown_node(ctx.protocol.as_ref(), 21)
                    .await;
            });

            let result = subscribe.await.unwrap();
            remove.await.unwrap();
            assert!(
                matches!(
                    result,
                    Ok(CommandOutput::None) | Err(CommandError::TargetGone(21))
                ),
                "unexpected result {result:?}"
            );
            assert!(h.ctx.subscriptions.get(21).is_empty());
        }
    }

    #[tokio::test]
    async fn test_missing_device() {
        let h = harness(MockProtocol::new());
        h.ctx.inventory.write().await.merge(Node::new(21, 1));
        let command = DeviceSubscription::new(params(), |_, _| {});
        let result = run_to_completion(command, &h.ctx).await;
        assert!(matches!(result, Err(CommandError::InvalidArgument(_))));
    }
}
