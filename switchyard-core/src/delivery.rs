//! Outbound delivery
//!
//! The relay hands every non-empty batch to a [`DeliveryChannel`]. Delivery
//! is fire-and-forget: channels never report back to the relay, and each
//! call is independent of every other (no ordering across webhooks, no
//! retries).

use crate::document::Document;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Sends a batch of documents to a URL
///
/// Implementations must not block the caller; network transports spawn
/// their request and log failures themselves.
pub trait DeliveryChannel: Send + Sync {
    /// Send `documents` to `url` as one JSON array
    fn deliver(&self, url: &str, documents: Vec<Document>);
}

impl<T: DeliveryChannel + ?Sized> DeliveryChannel for Arc<T> {
    fn deliver(&self, url: &str, documents: Vec<Document>) {
        (**self).deliver(url, documents)
    }
}

/// One recorded delivery
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Target URL
    pub url: String,
    /// Batch as sent
    pub documents: Vec<Document>,
}

/// Channel that keeps every delivery in memory
///
/// Used by tests and by embedders that want to inspect outbound traffic.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    deliveries: Mutex<Vec<Delivery>>,
    notify: Notify,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, in call order
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    /// Deliveries made to one URL
    pub fn deliveries_to(&self, url: &str) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .iter()
            .filter(|delivery| delivery.url == url)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.deliveries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.lock().is_empty()
    }

    /// Forget recorded deliveries
    pub fn clear(&self) {
        self.deliveries.lock().clear();
    }

    /// Wait until at least `count` deliveries were recorded
    ///
    /// Returns false if the timeout elapses first.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

impl DeliveryChannel for RecordingChannel {
    fn deliver(&self, url: &str, documents: Vec<Document>) {
        self.deliveries.lock().push(Delivery {
            url: url.to_string(),
            documents,
        });
        self.notify.notify_waiters();
    }
}

/// Channel that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullChannel;

impl DeliveryChannel for NullChannel {
    fn deliver(&self, url: &str, documents: Vec<Document>) {
        tracing::trace!(%url, count = documents.len(), "dropping delivery");
    }
}
