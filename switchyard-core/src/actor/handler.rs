//! Application callbacks attached to schema types

use super::Actor;
use crate::document::{Command, Document, Subscription};
use crate::error::HandlerError;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// Reacts to an inbound batch of one schema type
///
/// The returned value becomes the response of the inbound call. Errors are
/// logged by the dispatcher and answered with `null`.
#[async_trait]
pub trait IncomingHandler: Send + Sync {
    async fn on_incoming(&self, documents: Vec<Document>, actor: Actor)
        -> Result<Value, HandlerError>;
}

/// Produces the snapshot a new subscriber receives when it asks to hydrate
#[async_trait]
pub trait Hydrator: Send + Sync {
    async fn hydrate(&self, subscription: &Subscription) -> Result<Vec<Document>, HandlerError>;
}

#[async_trait]
impl<T: IncomingHandler + ?Sized> IncomingHandler for Arc<T> {
    async fn on_incoming(
        &self,
        documents: Vec<Document>,
        actor: Actor,
    ) -> Result<Value, HandlerError> {
        (**self).on_incoming(documents, actor).await
    }
}

#[async_trait]
impl<T: Hydrator + ?Sized> Hydrator for Arc<T> {
    async fn hydrate(&self, subscription: &Subscription) -> Result<Vec<Document>, HandlerError> {
        (**self).hydrate(subscription).await
    }
}

/// Closure-backed [`IncomingHandler`], see [`incoming_fn`]
pub struct IncomingFn<F, Fut> {
    f: F,
    _future: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure as an incoming handler
pub fn incoming_fn<F, Fut>(f: F) -> IncomingFn<F, Fut>
where
    F: Fn(Vec<Document>, Actor) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    IncomingFn {
        f,
        _future: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> IncomingHandler for IncomingFn<F, Fut>
where
    F: Fn(Vec<Document>, Actor) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn on_incoming(
        &self,
        documents: Vec<Document>,
        actor: Actor,
    ) -> Result<Value, HandlerError> {
        (self.f)(documents, actor).await
    }
}

/// Closure-backed [`Hydrator`], see [`hydrate_fn`]
pub struct HydrateFn<F, Fut> {
    f: F,
    _future: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure as a hydrate capability
///
/// The closure receives its own copy of the new subscription.
pub fn hydrate_fn<F, Fut>(f: F) -> HydrateFn<F, Fut>
where
    F: Fn(Subscription) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Document>, HandlerError>> + Send + 'static,
{
    HydrateFn {
        f,
        _future: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> Hydrator for HydrateFn<F, Fut>
where
    F: Fn(Subscription) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Document>, HandlerError>> + Send + 'static,
{
    async fn hydrate(&self, subscription: &Subscription) -> Result<Vec<Document>, HandlerError> {
        (self.f)(subscription.clone()).await
    }
}

/// Built-in handler of the `command` type: feeds the command bus
///
/// Emits one `"command"` event per document, in batch order. Documents that
/// do not read as commands are logged and skipped; the rest of the batch
/// still goes through.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandFeed;

#[async_trait]
impl IncomingHandler for CommandFeed {
    async fn on_incoming(
        &self,
        documents: Vec<Document>,
        actor: Actor,
    ) -> Result<Value, HandlerError> {
        for document in &documents {
            match Command::try_from(document) {
                Ok(command) => {
                    actor.bus().emit_command(&command);
                }
                Err(err) => warn!(error = %err, "skipping malformed command document"),
            }
        }
        Ok(Value::Null)
    }
}
