use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::warn;

use crate::{
    protocol::{DeviceProtocol, SubscriptionId},
    NodeId,
};

/// Live subscriptions per node, kept so they can be shut down when the node goes
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<Mutex<HashMap<NodeId, Vec<SubscriptionId>>>>,
}

impl SubscriptionRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<NodeId, Vec<SubscriptionId>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, node_id: NodeId, subscription_id: SubscriptionId) {
        let mut inner = self.lock();
        let ids = inner.entry(node_id).or_default();
        if !ids.contains(&subscription_id) {
            ids.push(subscription_id);
        }
    }

    pub fn get(&self, node_id: NodeId) -> Vec<SubscriptionId> {
        self.lock().get(&node_id).cloned().unwrap_or_default()
    }

    /// Forget and return the node's subscriptions
    pub fn take_node(&self, node_id: NodeId) -> Vec<SubscriptionId> {
        self.lock().remove(&node_id).unwrap_or_default()
    }

    /// Forget the node's subscriptions and shut each down on the fabric.
    /// Returns how many shut down cleanly.
    pub async fn shutdown_node(&self, protocol: &dyn DeviceProtocol, node_id: NodeId) -> usize {
        let mut count = 0;
        for id in self.take_node(node_id) {
            match protocol.shutdown_subscription(node_id, id).await {
                Ok(()) => count += 1,
                Err(e) => warn!(node_id, subscription = id, error = %e, "shutdown failed"),
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_node() {
        let registry = SubscriptionRegistry::default();
        registry.add(1, 10);
        registry.add(1, 11);
        registry.add(1, 10);
        registry.add(2, 12);
        assert_eq!(registry.get(1), vec![10, 11]);
        assert_eq!(registry.take_node(1), vec![10, 11]);
        assert!(registry.take_node(1).is_empty());
        assert_eq!(registry.get(2), vec![12]);
    }
}
