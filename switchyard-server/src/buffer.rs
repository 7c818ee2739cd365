//! Bounded in-memory history for persisted schema types.
//!
//! Serves as both the inbound handler (remembers what arrived) and the
//! hydrate capability (replays it to new subscribers). Lives as long as the
//! process; nothing is written to disk.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use switchyard_core::{Actor, Document, HandlerError, Hydrator, IncomingHandler, Subscription};
use tracing::debug;

pub struct RecentDocuments {
    schema_type: String,
    capacity: usize,
    documents: Mutex<VecDeque<Document>>,
}

impl RecentDocuments {
    pub fn new(schema_type: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            schema_type: schema_type.into(),
            capacity,
            documents: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Append documents, evicting the oldest past capacity.
    /// Documents of other types are ignored.
    pub fn extend(&self, documents: &[Document]) -> usize {
        let mut buffer = self.documents.lock();
        let mut kept = 0;
        for document in documents {
            if document.schema_type() != self.schema_type {
                continue;
            }
            if buffer.len() == self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(document.clone());
            kept += 1;
        }
        kept
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<Document> {
        self.documents.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.lock().is_empty()
    }
}

#[async_trait]
impl IncomingHandler for RecentDocuments {
    async fn on_incoming(
        &self,
        documents: Vec<Document>,
        _actor: Actor,
    ) -> Result<Value, HandlerError> {
        let accepted = self.extend(&documents);
        debug!(schema_type = %self.schema_type, accepted, retained = self.len(), "stored documents");
        Ok(json!({ "accepted": accepted }))
    }
}

#[async_trait]
impl Hydrator for RecentDocuments {
    async fn hydrate(&self, _subscription: &Subscription) -> Result<Vec<Document>, HandlerError> {
        Ok(self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(id: i64) -> Document {
        Document::new("form").with("id", id)
    }

    #[test]
    fn test_evicts_oldest() {
        let buffer = RecentDocuments::new("form", 2);
        assert_eq!(buffer.extend(&[form(1), form(2), form(3)]), 3);

        assert_eq!(buffer.snapshot(), vec![form(2), form(3)]);
    }

    #[test]
    fn test_ignores_other_types() {
        let buffer = RecentDocuments::new("form", 10);
        assert_eq!(buffer.extend(&[form(1), Document::new("order")]), 1);
        assert_eq!(buffer.len(), 1);
    }

    #[tokio::test]
    async fn test_handler_and_hydrator_share_history() {
        let buffer = RecentDocuments::new("form", 10);
        let actor = Actor::builder("test").build();

        let result = buffer.on_incoming(vec![form(1), form(2)], actor).await.unwrap();
        assert_eq!(result, json!({"accepted": 2}));

        let subscription = Subscription::new(switchyard_core::SubscribeParams::new("W", "form"), "t");
        assert_eq!(buffer.hydrate(&subscription).await.unwrap(), vec![form(1), form(2)]);
    }
}
