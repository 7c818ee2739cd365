//! In-process command bus
//!
//! Two events: `"command"`, fired once per received command document, and
//! `"subscription"`, fired once per created or replaced subscription.
//! Listeners run synchronously in registration order. Each invocation is
//! isolated: an error or a panic in one listener is logged and the remaining
//! listeners still run.

use crate::document::{Command, Subscription};
use crate::error::HandlerError;
use crate::types::ListenerId;
use parking_lot::RwLock;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// What a listener returns
pub type ListenerResult = Result<(), HandlerError>;

type Callback<E> = Arc<dyn Fn(&E) -> ListenerResult + Send + Sync>;

/// Outcome of one emit
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmitReport {
    /// Listeners that returned `Ok`
    pub succeeded: usize,
    /// Listeners that returned an error or panicked
    pub failed: usize,
}

/// Ordered listener list for one event
pub struct Listeners<E> {
    event: &'static str,
    entries: RwLock<Vec<(ListenerId, Callback<E>)>>,
}

impl<E> Listeners<E> {
    /// Create an empty list for the named event
    pub fn new(event: &'static str) -> Self {
        Self {
            event,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Append a listener
    pub fn add<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&E) -> ListenerResult + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        self.entries.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener; false if it was not registered here
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Number of listeners
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if there are no listeners
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Invoke every listener with the event
    ///
    /// The list is snapshotted first, so listeners may add or remove
    /// listeners without deadlocking; changes apply from the next emit.
    pub fn emit(&self, event: &E) -> EmitReport {
        let snapshot: Vec<(ListenerId, Callback<E>)> = self.entries.read().clone();
        let mut report = EmitReport::default();

        for (id, listener) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| (*listener)(event))) {
                Ok(Ok(())) => report.succeeded += 1,
                Ok(Err(err)) => {
                    warn!(event = self.event, listener = %id, error = %err, "listener failed");
                    report.failed += 1;
                }
                Err(payload) => {
                    warn!(
                        event = self.event,
                        listener = %id,
                        panic = panic_message(payload.as_ref()),
                        "listener panicked"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// The actor's event dispatcher
pub struct CommandBus {
    commands: Listeners<Command>,
    subscriptions: Listeners<Subscription>,
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBus {
    /// Create a bus with no listeners
    pub fn new() -> Self {
        Self {
            commands: Listeners::new("command"),
            subscriptions: Listeners::new("subscription"),
        }
    }

    /// Listen to every command
    pub fn on_command<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Command) -> ListenerResult + Send + Sync + 'static,
    {
        self.commands.add(listener)
    }

    /// Listen to subscription creation and replacement
    pub fn on_subscription<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Subscription) -> ListenerResult + Send + Sync + 'static,
    {
        self.subscriptions.add(listener)
    }

    /// Remove a listener from whichever event holds it
    pub fn off(&self, id: ListenerId) -> bool {
        self.commands.remove(id) || self.subscriptions.remove(id)
    }

    /// Fire `"command"`
    pub fn emit_command(&self, command: &Command) -> EmitReport {
        self.commands.emit(command)
    }

    /// Fire `"subscription"`
    pub fn emit_subscription(&self, subscription: &Subscription) -> EmitReport {
        self.subscriptions.emit(subscription)
    }

    /// Number of command listeners
    pub fn command_listeners(&self) -> usize {
        self.commands.len()
    }
}
