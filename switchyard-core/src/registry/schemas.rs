//! Schema type registrations

use crate::actor::{Hydrator, IncomingHandler};
use crate::types::ListenerId;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// How an actor handles one document type
#[derive(Clone, Default)]
pub struct SchemaTypeConfig {
    /// Called with every inbound batch of this type
    pub on_incoming: Option<Arc<dyn IncomingHandler>>,
    /// Honor `subscribe` commands for this type
    pub allow_subscribe: bool,
    /// Advisory flag for collaborators
    pub persist: bool,
    /// Advisory flag for collaborators; the server only exposes types with it set
    pub webhook: bool,
    /// Snapshot source for subscribers that ask to hydrate
    pub hydrate: Option<Arc<dyn Hydrator>>,
}

impl SchemaTypeConfig {
    /// Config with every flag off and no callbacks
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_incoming(mut self, handler: impl IncomingHandler + 'static) -> Self {
        self.on_incoming = Some(Arc::new(handler));
        self
    }

    pub fn allow_subscribe(mut self, allow: bool) -> Self {
        self.allow_subscribe = allow;
        self
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn webhook(mut self, webhook: bool) -> Self {
        self.webhook = webhook;
        self
    }

    pub fn hydrate(mut self, hydrator: impl Hydrator + 'static) -> Self {
        self.hydrate = Some(Arc::new(hydrator));
        self
    }

    /// Serializable summary of this config
    pub fn capability(&self) -> SchemaCapability {
        SchemaCapability {
            allow_subscribe: self.allow_subscribe,
            persist: self.persist,
            webhook: self.webhook,
            on_incoming: self.on_incoming.is_some(),
            hydrate: self.hydrate.is_some(),
        }
    }
}

impl fmt::Debug for SchemaTypeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaTypeConfig")
            .field("on_incoming", &self.on_incoming.is_some())
            .field("allow_subscribe", &self.allow_subscribe)
            .field("persist", &self.persist)
            .field("webhook", &self.webhook)
            .field("hydrate", &self.hydrate.is_some())
            .finish()
    }
}

/// What a schema type supports, as shown to other actors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaCapability {
    pub allow_subscribe: bool,
    pub persist: bool,
    pub webhook: bool,
    pub on_incoming: bool,
    pub hydrate: bool,
}

struct Registration {
    config: SchemaTypeConfig,
    listener: Option<ListenerId>,
}

#[derive(Default)]
struct Entries {
    registrations: BTreeMap<String, Registration>,
    /// Subscription listeners attached before their type was registered
    pending: BTreeMap<String, ListenerId>,
}

/// Map from schema type name to its config
///
/// Also remembers which bus listener a type's subscription handler uses so a
/// re-registration can replace it. A type has at most one such listener,
/// whether it was attached before or after the type was registered.
#[derive(Default)]
pub struct SchemaRegistry {
    entries: RwLock<Entries>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a config, overwriting any previous one for the type
    ///
    /// Returns the subscription listener the new registration supersedes,
    /// either from the replaced registration or attached while the type was
    /// still unregistered.
    pub fn insert(
        &self,
        schema_type: impl Into<String>,
        config: SchemaTypeConfig,
        listener: Option<ListenerId>,
    ) -> Option<ListenerId> {
        let schema_type = schema_type.into();
        let mut guard = self.entries.write();
        let entries = &mut *guard;
        let pending = entries.pending.remove(&schema_type);
        let replaced = entries
            .registrations
            .insert(schema_type, Registration { config, listener })
            .and_then(|previous| previous.listener);
        replaced.or(pending)
    }

    /// Attach a subscription listener to a type
    ///
    /// A registered type starts allowing subscriptions. For a type not yet
    /// registered the listener is held until [`insert`](Self::insert) hands
    /// it back. Returns the listener it replaced.
    pub fn set_listener(&self, schema_type: &str, listener: ListenerId) -> Option<ListenerId> {
        let mut guard = self.entries.write();
        let entries = &mut *guard;
        match entries.registrations.get_mut(schema_type) {
            Some(registration) => {
                registration.config.allow_subscribe = true;
                registration.listener.replace(listener)
            }
            None => entries.pending.insert(schema_type.to_string(), listener),
        }
    }

    /// Config for a type
    pub fn get(&self, schema_type: &str) -> Option<SchemaTypeConfig> {
        self.entries
            .read()
            .registrations
            .get(schema_type)
            .map(|registration| registration.config.clone())
    }

    pub fn contains(&self, schema_type: &str) -> bool {
        self.entries.read().registrations.contains_key(schema_type)
    }

    /// Registered type names, sorted
    pub fn schema_types(&self) -> Vec<String> {
        self.entries.read().registrations.keys().cloned().collect()
    }

    /// Snapshot of every registration
    pub fn capabilities(&self) -> BTreeMap<String, SchemaCapability> {
        self.entries
            .read()
            .registrations
            .iter()
            .map(|(name, registration)| (name.clone(), registration.config.capability()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().registrations.is_empty()
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("schema_types", &self.schema_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::CommandFeed;
    use serde_json::json;

    #[test]
    fn test_reinsert_overwrites_without_merge() {
        let registry = SchemaRegistry::new();
        let first = ListenerId::new();
        registry.insert(
            "form",
            SchemaTypeConfig::new().allow_subscribe(true).persist(true),
            Some(first),
        );

        let replaced = registry.insert("form", SchemaTypeConfig::new().webhook(true), None);
        assert_eq!(replaced, Some(first));

        let config = registry.get("form").unwrap();
        assert!(!config.allow_subscribe);
        assert!(!config.persist);
        assert!(config.webhook);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_capabilities_snapshot() {
        let registry = SchemaRegistry::new();
        registry.insert(
            "command",
            SchemaTypeConfig::new().on_incoming(CommandFeed).webhook(true),
            None,
        );
        registry.insert("form", SchemaTypeConfig::new().allow_subscribe(true), None);

        let snapshot = serde_json::to_value(registry.capabilities()).unwrap();
        assert_eq!(
            snapshot,
            json!({
                "command": {
                    "allowSubscribe": false,
                    "persist": false,
                    "webhook": true,
                    "onIncoming": true,
                    "hydrate": false
                },
                "form": {
                    "allowSubscribe": true,
                    "persist": false,
                    "webhook": false,
                    "onIncoming": false,
                    "hydrate": false
                }
            })
        );
        assert_eq!(registry.schema_types(), vec!["command", "form"]);
    }

    #[test]
    fn test_set_listener() {
        let registry = SchemaRegistry::new();
        let a = ListenerId::new();
        let b = ListenerId::new();

        registry.insert("form", SchemaTypeConfig::new(), None);
        assert!(!registry.get("form").unwrap().allow_subscribe);
        assert_eq!(registry.set_listener("form", a), None);
        assert!(registry.get("form").unwrap().allow_subscribe);
        assert_eq!(registry.set_listener("form", b), Some(a));
    }

    #[test]
    fn test_listener_for_unregistered_type_is_handed_back() {
        let registry = SchemaRegistry::new();
        let a = ListenerId::new();
        let b = ListenerId::new();

        assert_eq!(registry.set_listener("form", a), None);
        assert_eq!(registry.set_listener("form", b), Some(a));
        assert!(!registry.contains("form"));

        assert_eq!(registry.insert("form", SchemaTypeConfig::new(), None), Some(b));
        assert_eq!(registry.insert("form", SchemaTypeConfig::new(), None), None);
    }
}
