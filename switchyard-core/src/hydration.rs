//! Hydration of new subscribers
//!
//! A subscriber that asks for `hydrate` gets a one-time snapshot from the
//! type's hydrate capability, relayed to that subscriber alone with the
//! same predicate-then-batch logic as live traffic. The subscription is
//! recorded before hydration starts and is never rolled back by it.

use crate::actor::Hydrator;
use crate::document::Subscription;
use crate::registry::SubscriptionRegistry;
use crate::relay::Relay;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How a hydration attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationOutcome {
    /// The snapshot was relayed; holds the number of documents sent
    Delivered(usize),
    /// The capability produced nothing
    Empty,
    /// The capability failed or panicked
    Failed,
    /// The webhook re-subscribed while the snapshot was being produced
    Superseded,
}

#[derive(Clone)]
pub struct HydrationCoordinator {
    subscriptions: Arc<SubscriptionRegistry>,
    relay: Relay,
}

impl HydrationCoordinator {
    pub fn new(subscriptions: Arc<SubscriptionRegistry>, relay: Relay) -> Self {
        Self {
            subscriptions,
            relay,
        }
    }

    /// Run the capability and relay its result to `subscription`
    pub async fn hydrate(
        &self,
        hydrator: &dyn Hydrator,
        subscription: &Subscription,
    ) -> HydrationOutcome {
        let webhook = subscription.webhook();
        let result = AssertUnwindSafe(hydrator.hydrate(subscription))
            .catch_unwind()
            .await;

        let documents = match result {
            Ok(Ok(documents)) => documents,
            Ok(Err(err)) => {
                warn!(%webhook, error = %err, "hydration failed");
                return HydrationOutcome::Failed;
            }
            Err(_) => {
                warn!(%webhook, "hydration panicked");
                return HydrationOutcome::Failed;
            }
        };

        if documents.is_empty() {
            debug!(%webhook, "nothing to hydrate");
            return HydrationOutcome::Empty;
        }

        if self.subscriptions.get(webhook).as_ref() != Some(subscription) {
            debug!(%webhook, "subscription replaced during hydration, dropping snapshot");
            return HydrationOutcome::Superseded;
        }

        let sent = self.relay.relay_to_subscription(&documents, subscription);
        debug!(%webhook, available = documents.len(), sent, "hydrated subscriber");
        HydrationOutcome::Delivered(sent)
    }

    /// Hydrate on the current tokio runtime
    ///
    /// Returns `None` when called outside a runtime; the subscription itself
    /// is unaffected.
    pub fn spawn(
        &self,
        hydrator: Arc<dyn Hydrator>,
        subscription: Subscription,
    ) -> Option<JoinHandle<HydrationOutcome>> {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(
                    webhook = subscription.webhook(),
                    "no async runtime available, skipping hydration"
                );
                return None;
            }
        };

        let coordinator = self.clone();
        Some(handle.spawn(async move {
            coordinator.hydrate(hydrator.as_ref(), &subscription).await
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::hydrate_fn;
    use crate::delivery::RecordingChannel;
    use crate::document::{Document, SubscribeParams};
    use crate::error::HandlerError;
    use crate::query::{DocumentQuery, Query};
    use serde_json::json;

    fn setup() -> (HydrationCoordinator, Arc<SubscriptionRegistry>, Arc<RecordingChannel>) {
        let registry = Arc::new(SubscriptionRegistry::new());
        let channel = Arc::new(RecordingChannel::new());
        let relay = Relay::new(registry.clone(), Arc::new(DocumentQuery), channel.clone());
        (HydrationCoordinator::new(registry.clone(), relay), registry, channel)
    }

    fn snapshot() -> Vec<Document> {
        vec![
            Document::new("form").with("id", 1).with("status", "open"),
            Document::new("form").with("id", 2).with("status", "closed"),
        ]
    }

    fn subscription(webhook: &str) -> Subscription {
        Subscription::new(
            SubscribeParams::new(webhook, "form")
                .with_query(Query::new(json!({"status": "closed"})))
                .with_hydrate(true),
            "t",
        )
    }

    #[tokio::test]
    async fn test_hydration_uses_subscriber_query() {
        let (coordinator, registry, channel) = setup();
        let sub = subscription("http://new");
        registry.upsert(sub.clone());
        registry.upsert(Subscription::new(SubscribeParams::new("http://old", "form"), "t"));

        let hydrator = hydrate_fn(|_| async { Ok(snapshot()) });
        let outcome = coordinator.hydrate(&hydrator, &sub).await;

        assert_eq!(outcome, HydrationOutcome::Delivered(1));
        let deliveries = channel.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].url, "http://new");
        assert_eq!(deliveries[0].documents, vec![snapshot()[1].clone()]);
    }

    #[tokio::test]
    async fn test_failure_keeps_subscription() {
        let (coordinator, registry, channel) = setup();
        let sub = subscription("http://w");
        registry.upsert(sub.clone());

        let failing = hydrate_fn(|_| async { Err(HandlerError::msg("store offline")) });
        assert_eq!(coordinator.hydrate(&failing, &sub).await, HydrationOutcome::Failed);

        let empty = hydrate_fn(|_| async { Ok(Vec::new()) });
        assert_eq!(coordinator.hydrate(&empty, &sub).await, HydrationOutcome::Empty);

        assert!(channel.is_empty());
        assert_eq!(registry.get("http://w"), Some(sub));
    }

    #[tokio::test]
    async fn test_panicking_capability_is_contained() {
        let (coordinator, registry, _) = setup();
        let sub = subscription("http://w");
        registry.upsert(sub.clone());

        async fn explode(_: Subscription) -> Result<Vec<Document>, HandlerError> {
            panic!("hydrate exploded")
        }

        let exploding = hydrate_fn(explode);
        assert_eq!(coordinator.hydrate(&exploding, &sub).await, HydrationOutcome::Failed);
        assert!(registry.get("http://w").is_some());
    }

    #[tokio::test]
    async fn test_superseded_subscription_gets_nothing() {
        let (coordinator, registry, channel) = setup();
        let sub = subscription("http://w");
        registry.upsert(Subscription::new(SubscribeParams::new("http://w", "order"), "t"));

        let hydrator = hydrate_fn(|_| async { Ok(snapshot()) });
        assert_eq!(coordinator.hydrate(&hydrator, &sub).await, HydrationOutcome::Superseded);
        assert!(channel.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_runs_on_runtime() {
        let (coordinator, registry, channel) = setup();
        let sub = subscription("http://w");
        registry.upsert(sub.clone());

        let hydrator: Arc<dyn Hydrator> = Arc::new(hydrate_fn(|_| async { Ok(snapshot()) }));
        let task = coordinator.spawn(hydrator, sub).unwrap();

        assert_eq!(task.await.unwrap(), HydrationOutcome::Delivered(1));
        assert_eq!(channel.len(), 1);
    }

    #[test]
    fn test_spawn_without_runtime() {
        let (coordinator, _, _) = setup();
        let hydrator: Arc<dyn Hydrator> = Arc::new(hydrate_fn(|_| async { Ok(snapshot()) }));
        assert!(coordinator.spawn(hydrator, subscription("http://w")).is_none());
    }
}
