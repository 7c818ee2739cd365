//! Identity types shared across the relay core
//!
//! Field names and well-known tags of the document wire format live here
//! too, so every module spells them the same way.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Field every document carries to name its type
pub const SCHEMA_TYPE_FIELD: &str = "schemaType";

/// Schema type of command documents
pub const COMMAND_SCHEMA: &str = "command";

/// Command tag of a subscription request
pub const SUBSCRIBE_COMMAND: &str = "subscribe";

/// Command tag of an endpoint announcement
pub const ADVERTISE_COMMAND: &str = "advertise";

/// Listener identifier on the command bus
///
/// Returned when registering a listener, used to later remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

static LISTENER_COUNTER: AtomicU64 = AtomicU64::new(1);

impl ListenerId {
    /// Create a new unique listener ID
    pub fn new() -> Self {
        Self(LISTENER_COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener:{}", self.0)
    }
}
