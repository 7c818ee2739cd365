//! The relay actor
//!
//! An [`Actor`] owns the process-lifetime state of one relay participant:
//! - a schema registry (which document types it accepts and how)
//! - a subscription registry (who wants which documents)
//! - a command bus (fan-out of received commands)
//! - a relay engine and hydration coordinator wired to one delivery channel
//!
//! Cloning an `Actor` is cheap; clones share all state.
//!
//! # Example
//!
//! ```
//! use switchyard_core::{
//!     Actor, Document, RecordingChannel, SchemaTypeConfig, SubscribeParams, Subscription,
//! };
//! use std::sync::Arc;
//!
//! let channel = Arc::new(RecordingChannel::new());
//! let actor = Actor::builder("forms")
//!     .endpoint("http://localhost:8790")
//!     .channel(channel.clone())
//!     .build();
//!
//! actor.register("form", SchemaTypeConfig::new().allow_subscribe(true));
//! actor.handle_subscription(Subscription::new(
//!     SubscribeParams::new("http://localhost:9000/form", "form"),
//!     "peer-token",
//! ));
//!
//! let report = actor.relay_to_all_subscriptions(&[Document::new("form").with("id", 1)], "form");
//! assert_eq!(report.deliveries, 1);
//! assert_eq!(channel.deliveries()[0].url, "http://localhost:9000/form");
//! ```

mod handler;

pub use handler::{
    hydrate_fn, incoming_fn, CommandFeed, HydrateFn, Hydrator, IncomingFn, IncomingHandler,
};

use crate::bus::{CommandBus, ListenerResult};
use crate::delivery::{DeliveryChannel, NullChannel};
use crate::document::{AdvertiseParams, Command, Document, SubscribeParams, Subscription};
use crate::error::{ActorError, Result};
use crate::hydration::HydrationCoordinator;
use crate::query::{DocumentQuery, QueryPredicate};
use crate::registry::{
    RetentionPolicy, SchemaCapability, SchemaRegistry, SchemaTypeConfig, SubscriptionRegistry,
};
use crate::relay::{Relay, RelayReport};
use crate::types::{
    ListenerId, ADVERTISE_COMMAND, COMMAND_SCHEMA, SCHEMA_TYPE_FIELD, SUBSCRIBE_COMMAND,
};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Builder for [`Actor`]
pub struct ActorBuilder {
    name: String,
    endpoint: Option<String>,
    token: Option<String>,
    channel: Arc<dyn DeliveryChannel>,
    predicate: Arc<dyn QueryPredicate>,
    subscriptions: SubscriptionRegistry,
    command_subscriptions: bool,
}

impl ActorBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: None,
            token: None,
            channel: Arc::new(NullChannel),
            predicate: Arc::new(DocumentQuery),
            subscriptions: SubscriptionRegistry::new(),
            command_subscriptions: false,
        }
    }

    /// Base URL other actors reach this one at
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        self.endpoint = Some(endpoint.trim_end_matches('/').to_string());
        self
    }

    /// Token stamped on outgoing commands; a random one if unset
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Where relayed and sent documents go
    pub fn channel(mut self, channel: Arc<dyn DeliveryChannel>) -> Self {
        self.channel = channel;
        self
    }

    /// Query evaluator used by the relay
    pub fn predicate(mut self, predicate: Arc<dyn QueryPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    /// How long subscriptions stay live
    pub fn retention(mut self, policy: impl RetentionPolicy + 'static) -> Self {
        self.subscriptions = SubscriptionRegistry::with_retention(policy);
        self
    }

    /// Honor `subscribe` commands whose type is `command` itself
    pub fn command_subscriptions(mut self, allow: bool) -> Self {
        self.command_subscriptions = allow;
        self
    }

    /// Build the actor and install the built-in `command` type
    pub fn build(self) -> Actor {
        let subscriptions = Arc::new(self.subscriptions);
        let relay = Relay::new(subscriptions.clone(), self.predicate, self.channel.clone());
        let hydration = HydrationCoordinator::new(subscriptions.clone(), relay.clone());

        let actor = Actor {
            inner: Arc::new(ActorInner {
                name: self.name,
                endpoint: self.endpoint,
                token: self
                    .token
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                schemas: SchemaRegistry::new(),
                subscriptions,
                bus: CommandBus::new(),
                relay,
                hydration,
                channel: self.channel,
            }),
        };

        actor.register(
            COMMAND_SCHEMA,
            SchemaTypeConfig::new()
                .on_incoming(CommandFeed)
                .webhook(true)
                .allow_subscribe(self.command_subscriptions),
        );
        actor
    }
}

struct ActorInner {
    name: String,
    endpoint: Option<String>,
    token: String,
    schemas: SchemaRegistry,
    subscriptions: Arc<SubscriptionRegistry>,
    bus: CommandBus,
    relay: Relay,
    hydration: HydrationCoordinator,
    channel: Arc<dyn DeliveryChannel>,
}

/// A relay participant
#[derive(Clone)]
pub struct Actor {
    inner: Arc<ActorInner>,
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("name", &self.inner.name)
            .field("endpoint", &self.inner.endpoint)
            .field("schemas", &self.inner.schemas)
            .field("subscriptions", &self.inner.subscriptions)
            .finish()
    }
}

impl Actor {
    pub fn builder(name: impl Into<String>) -> ActorBuilder {
        ActorBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Advertised base URL, if any
    pub fn endpoint(&self) -> Option<&str> {
        self.inner.endpoint.as_deref()
    }

    /// Default token for outgoing commands
    pub fn token(&self) -> &str {
        &self.inner.token
    }

    pub fn bus(&self) -> &CommandBus {
        &self.inner.bus
    }

    // -------------------------------------------------------------------
    // Schema registry
    // -------------------------------------------------------------------

    /// Register how this actor handles a schema type
    ///
    /// Re-registering a type overwrites its config. If `allow_subscribe` is
    /// set, a subscription handler for the type is installed on the command
    /// bus, replacing the one from any earlier registration.
    pub fn register(&self, schema_type: impl Into<String>, config: SchemaTypeConfig) {
        let schema_type = schema_type.into();
        let listener = config
            .allow_subscribe
            .then(|| self.install_subscription_listener(&schema_type, config.hydrate.clone()));

        info!(
            actor = %self.inner.name,
            schema_type = %schema_type,
            allow_subscribe = config.allow_subscribe,
            "registered schema type"
        );

        if let Some(previous) = self.inner.schemas.insert(schema_type, config, listener) {
            self.inner.bus.off(previous);
        }
    }

    /// Install a subscription handler for a type
    ///
    /// The new handler replaces the type's current one, and a registered type
    /// is marked as allowing subscriptions. A handler installed before the
    /// type is registered is replaced by that registration.
    pub fn register_subscription_handler(
        &self,
        schema_type: &str,
        hydrate: Option<Arc<dyn Hydrator>>,
    ) -> ListenerId {
        let listener = self.install_subscription_listener(schema_type, hydrate);
        if let Some(previous) = self.inner.schemas.set_listener(schema_type, listener) {
            self.inner.bus.off(previous);
        }
        listener
    }

    fn install_subscription_listener(
        &self,
        schema_type: &str,
        hydrate: Option<Arc<dyn Hydrator>>,
    ) -> ListenerId {
        let actor: Weak<ActorInner> = Arc::downgrade(&self.inner);
        let schema_type = schema_type.to_string();

        self.inner.bus.on_command(move |command| -> ListenerResult {
            if command.command != SUBSCRIBE_COMMAND || !targets(command, &schema_type) {
                return Ok(());
            }
            let Some(inner) = actor.upgrade() else {
                return Ok(());
            };

            let subscription = Subscription::from_command(command)?;
            let actor = Actor { inner };
            actor.handle_subscription(subscription.clone());

            if subscription.params.hydrate {
                match &hydrate {
                    Some(hydrator) => {
                        actor.inner.hydration.spawn(hydrator.clone(), subscription);
                    }
                    None => debug!(
                        webhook = subscription.webhook(),
                        "hydration requested but no capability for this type"
                    ),
                }
            }
            Ok(())
        })
    }

    /// Config for a type
    pub fn schema(&self, schema_type: &str) -> Option<SchemaTypeConfig> {
        self.inner.schemas.get(schema_type)
    }

    /// Registered type names
    pub fn schema_types(&self) -> Vec<String> {
        self.inner.schemas.schema_types()
    }

    /// Snapshot of the schema registry
    pub fn capabilities(&self) -> BTreeMap<String, SchemaCapability> {
        self.inner.schemas.capabilities()
    }

    // -------------------------------------------------------------------
    // Subscriptions and bus
    // -------------------------------------------------------------------

    /// Record a subscription and announce it on the bus
    ///
    /// Replaces any subscription for the same webhook. The webhook is not
    /// validated; a bad URL fails later at delivery.
    pub fn handle_subscription(&self, subscription: Subscription) -> Option<Subscription> {
        let previous = self.inner.subscriptions.upsert(subscription.clone());
        info!(
            webhook = subscription.webhook(),
            schema_type = subscription.schema_type(),
            replaced = previous.is_some(),
            "subscription recorded"
        );
        self.inner.bus.emit_subscription(&subscription);
        previous
    }

    /// Snapshot of live subscriptions keyed by webhook
    pub fn subscriptions(&self) -> BTreeMap<String, Subscription> {
        self.inner.subscriptions.snapshot()
    }

    /// Drop the subscription for a webhook
    pub fn unsubscribe(&self, webhook: &str) -> Option<Subscription> {
        let removed = self.inner.subscriptions.remove(webhook);
        if removed.is_some() {
            info!(%webhook, "subscription removed");
        }
        removed
    }

    /// Listen to every command this actor receives
    pub fn on_command<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Command) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner.bus.on_command(listener)
    }

    /// Listen to subscription creation and replacement
    pub fn on_subscription<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Subscription) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner.bus.on_subscription(listener)
    }

    /// Remove a bus listener
    pub fn off(&self, listener: ListenerId) -> bool {
        self.inner.bus.off(listener)
    }

    // -------------------------------------------------------------------
    // Relay and dispatch
    // -------------------------------------------------------------------

    /// Relay a batch to every subscriber of `schema_type`
    pub fn relay_to_all_subscriptions(&self, documents: &[Document], schema_type: &str) -> RelayReport {
        self.inner.relay.relay_to_all_subscriptions(documents, schema_type)
    }

    /// Relay a batch to one subscriber
    pub fn relay_to_subscription(&self, documents: &[Document], subscription: &Subscription) -> usize {
        self.inner.relay.relay_to_subscription(documents, subscription)
    }

    /// Handle an inbound batch of `schema_type`
    ///
    /// Relays the batch to current subscribers first, then awaits the type's
    /// `on_incoming` handler. The handler's value is returned; a missing,
    /// failing or panicking handler yields `null`.
    pub async fn dispatch(&self, schema_type: &str, documents: Vec<Document>) -> Result<Value> {
        let config = self
            .inner
            .schemas
            .get(schema_type)
            .ok_or_else(|| ActorError::UnknownSchemaType(schema_type.to_string()))?;

        let report = self.relay_to_all_subscriptions(&documents, schema_type);
        debug!(
            %schema_type,
            count = documents.len(),
            subscriptions = report.subscriptions,
            deliveries = report.deliveries,
            "dispatched batch"
        );

        let Some(handler) = config.on_incoming else {
            return Ok(Value::Null);
        };

        match AssertUnwindSafe(handler.on_incoming(documents, self.clone()))
            .catch_unwind()
            .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                warn!(%schema_type, error = %err, "incoming handler failed");
                Ok(Value::Null)
            }
            Err(_) => {
                warn!(%schema_type, "incoming handler panicked");
                Ok(Value::Null)
            }
        }
    }

    // -------------------------------------------------------------------
    // Outbound
    // -------------------------------------------------------------------

    /// Send a batch of documents to a URL
    pub fn send_documents(&self, target_url: &str, documents: Vec<Document>) {
        debug!(%target_url, count = documents.len(), "sending documents");
        self.inner.channel.deliver(target_url, documents);
    }

    /// Send one command to another actor's `/command` endpoint
    ///
    /// Uses the actor's own token unless `token` is given. Returns the
    /// command as sent.
    pub fn send_command(
        &self,
        target_url: &str,
        command: &str,
        params: Value,
        token: Option<&str>,
    ) -> Command {
        let command = Command::new(command, params, token.unwrap_or(&self.inner.token));
        let url = format!("{}/{}", target_url.trim_end_matches('/'), COMMAND_SCHEMA);
        self.send_documents(&url, vec![command.to_document()]);
        command
    }

    /// Ask another actor to relay documents of a type to us
    ///
    /// An empty `params.webhook` is filled with `{endpoint}/{schemaType}`.
    pub fn subscribe(&self, target_url: &str, mut params: SubscribeParams) -> Result<Command> {
        if params.webhook.is_empty() {
            let endpoint = self.endpoint().ok_or(ActorError::MissingEndpoint)?;
            params.webhook = format!("{}/{}", endpoint, params.schema_type);
        }

        let params = serde_json::to_value(&params)?;
        Ok(self.send_command(target_url, SUBSCRIBE_COMMAND, params, None))
    }

    /// Announce this actor's endpoint and capabilities to another actor
    pub fn advertise(&self, target_url: &str) -> Result<Command> {
        let endpoint = self.endpoint().ok_or(ActorError::MissingEndpoint)?;
        let params = AdvertiseParams {
            endpoint: endpoint.to_string(),
            capabilities: Some(serde_json::to_value(self.capabilities())?),
            extra: Map::new(),
        };

        let params = serde_json::to_value(&params)?;
        Ok(self.send_command(target_url, ADVERTISE_COMMAND, params, None))
    }
}

/// Whether a subscribe command is for `schema_type`
fn targets(command: &Command, schema_type: &str) -> bool {
    command
        .params
        .get(SCHEMA_TYPE_FIELD)
        .and_then(Value::as_str)
        .is_some_and(|wanted| wanted == schema_type)
}
