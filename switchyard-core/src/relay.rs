//! Relay engine
//!
//! Pushes documents to subscribers. For each subscription the engine keeps
//! the ordered subsequence of the batch that matches the subscription's
//! query and, when that subsequence is non-empty, hands it to the delivery
//! channel as one batch. Subscriptions are handled independently.

use crate::delivery::DeliveryChannel;
use crate::document::{Document, Subscription};
use crate::query::QueryPredicate;
use crate::registry::SubscriptionRegistry;
use std::sync::Arc;
use tracing::{debug, trace};

/// Totals for one relay pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    /// Subscriptions considered
    pub subscriptions: usize,
    /// Batches handed to the delivery channel
    pub deliveries: usize,
    /// Documents across all batches
    pub documents: usize,
}

/// Matches documents against subscriptions and hands batches to a channel
#[derive(Clone)]
pub struct Relay {
    subscriptions: Arc<SubscriptionRegistry>,
    predicate: Arc<dyn QueryPredicate>,
    channel: Arc<dyn DeliveryChannel>,
}

impl Relay {
    pub fn new(
        subscriptions: Arc<SubscriptionRegistry>,
        predicate: Arc<dyn QueryPredicate>,
        channel: Arc<dyn DeliveryChannel>,
    ) -> Self {
        Self {
            subscriptions,
            predicate,
            channel,
        }
    }

    /// The documents of `documents` that `subscription` wants, in order
    ///
    /// A document qualifies when its own type is the subscribed type and it
    /// satisfies the subscription's query. No query means match-all.
    pub fn matching(&self, documents: &[Document], subscription: &Subscription) -> Vec<Document> {
        documents
            .iter()
            .filter(|document| document.schema_type() == subscription.schema_type())
            .filter(|document| match subscription.query() {
                None => true,
                Some(query) => self.predicate.matches(document, query),
            })
            .cloned()
            .collect()
    }

    /// Relay to one subscription; returns how many documents were sent
    pub fn relay_to_subscription(&self, documents: &[Document], subscription: &Subscription) -> usize {
        let batch = self.matching(documents, subscription);
        if batch.is_empty() {
            trace!(webhook = subscription.webhook(), "no matching documents");
            return 0;
        }

        let count = batch.len();
        debug!(webhook = subscription.webhook(), count, "relaying documents");
        self.channel.deliver(subscription.webhook(), batch);
        count
    }

    /// Relay to every current subscription of `schema_type`
    pub fn relay_to_all_subscriptions(&self, documents: &[Document], schema_type: &str) -> RelayReport {
        let mut report = RelayReport::default();
        if documents.is_empty() {
            return report;
        }

        for subscription in self.subscriptions.for_schema_type(schema_type) {
            report.subscriptions += 1;
            let sent = self.relay_to_subscription(documents, &subscription);
            if sent > 0 {
                report.deliveries += 1;
                report.documents += sent;
            }
        }
        report
    }
}
