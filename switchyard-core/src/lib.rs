//! Switchyard - pub/sub document relay core
//!
//! Actors exchange JSON documents tagged with a `schemaType`. An actor
//! accepts batches per type, relays each batch to the peers subscribed to
//! that type, and reacts to control commands (most importantly `subscribe`)
//! sent to its built-in `command` type.
//!
//! # Architecture
//!
//! ```text
//!   inbound batch (schemaType T)
//!          │
//!          ▼
//! ┌──────────────────┐  (1) relay   ┌──────────────────┐   batch per   ┌─────────────────┐
//! │  Actor::dispatch │─────────────▶│   Relay engine   │──────────────▶│ DeliveryChannel │
//! └────────┬─────────┘              │ query, then batch│   webhook     └─────────────────┘
//!          │ (2) on_incoming        └────────▲─────────┘
//!          ▼                                 │ reads
//! ┌──────────────────┐  "command"   ┌────────┴─────────┐
//! │   CommandFeed    │─────────────▶│ Subscription     │◀── upsert ── subscribe listener
//! │ (type "command") │  CommandBus  │ registry         │                   │
//! └──────────────────┘              └──────────────────┘                   ▼
//!                                                               Hydration coordinator
//! ```
//!
//! # Core Concepts
//!
//! ## Schema registry
//!
//! `Actor::register` stores a [`SchemaTypeConfig`] per type. With
//! `allow_subscribe` set it also installs a listener on the command bus that
//! turns `subscribe` commands for that type into subscriptions.
//!
//! ## Subscriptions
//!
//! A subscription is the latest `subscribe` command for a webhook URL.
//! Re-subscribing the same webhook replaces the old subscription entirely,
//! including its type and query.
//!
//! ## Relay
//!
//! For each subscription the relay keeps the ordered subsequence of a batch
//! that satisfies the subscription's query and sends it as one batch. Empty
//! subsequences are not sent.
//!
//! ## Hydration
//!
//! A subscriber may ask for `hydrate`; the type's [`Hydrator`] then produces
//! a snapshot that is relayed to that subscriber alone.
//!
//! # Customization Points
//!
//! - [`QueryPredicate`]: query evaluation (default: [`DocumentQuery`])
//! - [`DeliveryChannel`]: outbound transport (the server crate ships HTTP)
//! - [`RetentionPolicy`]: subscription expiry (default: [`KeepForever`])
//! - [`IncomingHandler`] / [`Hydrator`]: per-type application callbacks

// Modules
pub mod actor;
pub mod bus;
pub mod delivery;
pub mod document;
pub mod error;
pub mod hydration;
pub mod query;
pub mod registry;
pub mod relay;
pub mod types;

// Re-exports for convenience
pub use actor::{
    hydrate_fn, incoming_fn, Actor, ActorBuilder, CommandFeed, Hydrator, IncomingHandler,
};
pub use bus::{CommandBus, EmitReport, ListenerResult};
pub use delivery::{Delivery, DeliveryChannel, NullChannel, RecordingChannel};
pub use document::{AdvertiseParams, Command, CommandKind, Document, SubscribeParams, Subscription};
pub use error::{ActorError, DeliveryError, DocumentError, HandlerError, QueryError, Result};
pub use hydration::{HydrationCoordinator, HydrationOutcome};
pub use query::{DocumentQuery, Query, QueryPredicate};
pub use registry::{
    KeepForever, MaxAge, RetentionPolicy, SchemaCapability, SchemaRegistry, SchemaTypeConfig,
    SubscriptionRegistry,
};
pub use relay::{Relay, RelayReport};
pub use types::{ListenerId, COMMAND_SCHEMA, SCHEMA_TYPE_FIELD};
