//! Documents, commands and subscriptions
//!
//! A [`Document`] is an open JSON object tagged with a `schemaType`. Commands
//! are documents of type `"command"`; their `params` are read into a
//! [`CommandKind`] so known commands get typed access while unknown ones pass
//! through as a raw key/value bag.

use crate::error::DocumentError;
use crate::query::Query;
use crate::types::{ADVERTISE_COMMAND, COMMAND_SCHEMA, SCHEMA_TYPE_FIELD, SUBSCRIBE_COMMAND};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Number, Value};

/// A JSON document exchanged between actors
///
/// Always a JSON object with a string `schemaType`. Documents are immutable
/// once constructed; the builder-style [`Document::with`] consumes `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    /// Create an empty document of the given type
    pub fn new(schema_type: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(
            SCHEMA_TYPE_FIELD.to_string(),
            Value::String(schema_type.into()),
        );
        Self { fields }
    }

    /// Add a field. The `schemaType` field cannot be replaced this way.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != SCHEMA_TYPE_FIELD {
            self.fields.insert(key, value.into());
        }
        self
    }

    /// Read a document from an arbitrary JSON value
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        match value {
            Value::Object(fields) => Self::try_from(fields),
            _ => Err(DocumentError::NotAnObject),
        }
    }

    /// The document's type
    pub fn schema_type(&self) -> &str {
        self.fields
            .get(SCHEMA_TYPE_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Look up a top-level field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// All fields, including `schemaType`
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Convert into a plain JSON value
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl TryFrom<Map<String, Value>> for Document {
    type Error = DocumentError;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        match fields.get(SCHEMA_TYPE_FIELD) {
            Some(Value::String(_)) => Ok(Self { fields }),
            _ => Err(DocumentError::MissingSchemaType),
        }
    }
}

impl From<Document> for Map<String, Value> {
    fn from(document: Document) -> Self {
        document.fields
    }
}

impl From<Document> for Value {
    fn from(document: Document) -> Self {
        document.into_value()
    }
}

/// A control message between actors
///
/// Wire shape: `{schemaType: "command", command, params, token, timestamp}`
/// with `timestamp` in epoch milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Command tag, e.g. `"subscribe"`
    pub command: String,
    /// Command-specific parameters
    pub params: Value,
    /// Opaque sender token
    pub token: String,
    /// When the command was created
    pub timestamp: DateTime<Utc>,
}

impl Command {
    /// Create a command stamped with the current time
    pub fn new(command: impl Into<String>, params: Value, token: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            params,
            token: token.into(),
            timestamp: Utc::now(),
        }
    }

    /// Read the params according to the command tag
    pub fn kind(&self) -> Result<CommandKind, DocumentError> {
        let invalid = |source| DocumentError::InvalidParams {
            command: self.command.clone(),
            source,
        };

        match self.command.as_str() {
            SUBSCRIBE_COMMAND => serde_json::from_value(self.params.clone())
                .map(CommandKind::Subscribe)
                .map_err(invalid),
            ADVERTISE_COMMAND => serde_json::from_value(self.params.clone())
                .map(CommandKind::Advertise)
                .map_err(invalid),
            _ => Ok(CommandKind::Other {
                command: self.command.clone(),
                params: match &self.params {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                },
            }),
        }
    }

    /// Encode as a document
    pub fn to_document(&self) -> Document {
        let mut fields = Map::new();
        fields.insert(
            SCHEMA_TYPE_FIELD.to_string(),
            Value::String(COMMAND_SCHEMA.to_string()),
        );
        fields.insert("command".to_string(), Value::String(self.command.clone()));
        fields.insert("params".to_string(), self.params.clone());
        fields.insert("token".to_string(), Value::String(self.token.clone()));
        fields.insert(
            "timestamp".to_string(),
            Value::from(self.timestamp.timestamp_millis()),
        );
        Document { fields }
    }
}

impl TryFrom<&Document> for Command {
    type Error = DocumentError;

    fn try_from(document: &Document) -> Result<Self, Self::Error> {
        if document.schema_type() != COMMAND_SCHEMA {
            return Err(DocumentError::NotACommand(
                document.schema_type().to_string(),
            ));
        }

        let command = document
            .get("command")
            .and_then(Value::as_str)
            .ok_or(DocumentError::MissingCommand)?
            .to_string();
        let params = document
            .get("params")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        let token = document
            .get("token")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let timestamp = document
            .get("timestamp")
            .and_then(timestamp_from_millis)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        Ok(Self {
            command,
            params,
            token,
            timestamp,
        })
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_document().serialize(serializer)
    }
}

fn timestamp_from_millis(value: &Value) -> Option<DateTime<Utc>> {
    let millis = value
        .as_i64()
        .or_else(|| value.as_f64().map(|ms| ms as i64))?;
    DateTime::from_timestamp_millis(millis)
}

/// Typed view of a command's params
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    /// Register a webhook for a schema type
    Subscribe(SubscribeParams),
    /// Announce an endpoint and its capabilities
    Advertise(AdvertiseParams),
    /// Any command this crate does not interpret
    Other {
        /// Command tag
        command: String,
        /// Raw params (empty if they were not an object)
        params: Map<String, Value>,
    },
}

/// Params of a `subscribe` command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeParams {
    /// Where relayed documents go; also the subscription's identity
    pub webhook: String,
    /// Type of documents wanted
    pub schema_type: String,
    /// Carried for collaborators, not interpreted by the relay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle: Option<Number>,
    /// Carried for collaborators, not interpreted by the relay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<Number>,
    /// Ask for a one-time snapshot of held documents
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hydrate: bool,
    /// Filter; absent means match-all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,
    /// Unrecognised keys, kept as sent
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SubscribeParams {
    /// Params for a match-all subscription
    pub fn new(webhook: impl Into<String>, schema_type: impl Into<String>) -> Self {
        Self {
            webhook: webhook.into(),
            schema_type: schema_type.into(),
            throttle: None,
            max_size: None,
            hydrate: false,
            query: None,
            extra: Map::new(),
        }
    }

    /// Params with no webhook yet; [`crate::Actor::subscribe`] fills it in
    /// from the actor's advertised endpoint
    pub fn for_type(schema_type: impl Into<String>) -> Self {
        Self::new(String::new(), schema_type)
    }

    /// Set the webhook
    pub fn with_webhook(mut self, webhook: impl Into<String>) -> Self {
        self.webhook = webhook.into();
        self
    }

    /// Set the filter
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    /// Request hydration
    pub fn with_hydrate(mut self, hydrate: bool) -> Self {
        self.hydrate = hydrate;
        self
    }
}

/// Params of an `advertise` command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertiseParams {
    /// Base URL of the advertising actor
    pub endpoint: String,
    /// Capability snapshot of the advertising actor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Value>,
    /// Unrecognised keys, kept as sent
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A live subscription: the latest `subscribe` command for a webhook
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    /// Subscribe params
    pub params: SubscribeParams,
    /// Token of the subscribe command
    pub token: String,
    /// Timestamp of the subscribe command
    pub timestamp: DateTime<Utc>,
}

impl Subscription {
    /// Build a subscription stamped with the current time
    pub fn new(params: SubscribeParams, token: impl Into<String>) -> Self {
        Self {
            params,
            token: token.into(),
            timestamp: Utc::now(),
        }
    }

    /// Read a subscription from a `subscribe` command
    pub fn from_command(command: &Command) -> Result<Self, DocumentError> {
        match command.kind()? {
            CommandKind::Subscribe(params) => Ok(Self {
                params,
                token: command.token.clone(),
                timestamp: command.timestamp,
            }),
            _ => Err(DocumentError::InvalidParams {
                command: command.command.clone(),
                source: serde::de::Error::custom("not a subscribe command"),
            }),
        }
    }

    /// Identity of the subscription
    pub fn webhook(&self) -> &str {
        &self.params.webhook
    }

    /// Type subscribed to
    pub fn schema_type(&self) -> &str {
        &self.params.schema_type
    }

    /// The filter, if any
    pub fn query(&self) -> Option<&Query> {
        self.params.query.as_ref()
    }

    /// Convert back into the command that created it
    pub fn to_command(&self) -> Command {
        Command {
            command: SUBSCRIBE_COMMAND.to_string(),
            params: serde_json::to_value(&self.params).unwrap_or(Value::Null),
            token: self.token.clone(),
            timestamp: self.timestamp,
        }
    }
}

impl Serialize for Subscription {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_command().serialize(serializer)
    }
}
