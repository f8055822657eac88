use {
    dashmap::DashMap,
    relay_rpc::domain::{SubscriptionId, Topic},
    std::sync::Arc,
};

/// Topics this client is currently subscribed to. Shared between the relay
/// client, which maintains it, and the connection handlers, which use it for
/// admission control.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionsTracker {
    subscriptions: Arc<DashMap<Topic, SubscriptionId>>,
}

impl SubscriptionsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, topic: Topic, id: SubscriptionId) {
        self.subscriptions.insert(topic, id);
    }

    pub fn remove(&self, topic: &Topic) -> Option<SubscriptionId> {
        self.subscriptions.remove(topic).map(|(_, id)| id)
    }

    pub fn get(&self, topic: &Topic) -> Option<SubscriptionId> {
        self.subscriptions.get(topic).map(|id| id.value().clone())
    }

    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        self.subscriptions.contains_key(topic)
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}
