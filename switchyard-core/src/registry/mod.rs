//! Process-lifetime registries
//!
//! - `SchemaRegistry`: document type name -> handling configuration
//! - `SubscriptionRegistry`: webhook URL -> live subscription
//!
//! Both sit behind a single `parking_lot` lock each. Callers never hold a
//! guard across an `.await` or while running a listener.

mod schemas;
mod subscriptions;

pub use schemas::{SchemaCapability, SchemaRegistry, SchemaTypeConfig};
pub use subscriptions::{KeepForever, MaxAge, RetentionPolicy, SubscriptionRegistry};
