//! Error types for the relay core

use thiserror::Error;

/// Errors raised while reading a JSON value as a document or command
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The value is not a JSON object
    #[error("document must be a JSON object")]
    NotAnObject,

    /// The object has no string `schemaType`
    #[error("document is missing a string `schemaType` field")]
    MissingSchemaType,

    /// A command document without its `command` tag
    #[error("command document is missing a string `command` field")]
    MissingCommand,

    /// Tried to read a non-command document as a command
    #[error("document has schemaType `{0}`, expected `command`")]
    NotACommand(String),

    /// The params of a known command do not have the expected shape
    #[error("invalid params for `{command}` command: {source}")]
    InvalidParams {
        /// Command tag
        command: String,
        /// Underlying decode failure
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while evaluating a subscription query
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Queries must be objects (or null for match-all)
    #[error("query must be a JSON object")]
    NotAnObject,

    /// Operator not understood by the evaluator
    #[error("unknown query operator `{0}`")]
    UnknownOperator(String),

    /// Operator argument must be an array
    #[error("operator `{0}` expects an array")]
    ExpectedArray(String),

    /// Logical operator branches must be filter objects
    #[error("operator `{0}` expects an array of filter objects")]
    ExpectedFilters(String),
}

/// Failure reported by an application callback
///
/// Covers `onIncoming` handlers, hydrate capabilities and command bus
/// listeners. These never abort a dispatch; they are logged and dropped.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Free-form failure message
    #[error("{0}")]
    Message(String),

    /// A document or command could not be read
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Any other error raised by application code
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Build a handler error from a message
    pub fn msg(message: impl Into<String>) -> Self {
        HandlerError::Message(message.into())
    }
}

/// Failure of an outbound delivery, as seen by a transport
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The request never produced a response
    #[error("transport error: {0}")]
    Transport(String),

    /// The receiver answered with a non-2xx status
    #[error("{url} answered with status {status}")]
    Status {
        /// Target URL
        url: String,
        /// HTTP status code
        status: u16,
    },
}

/// Errors surfaced by actor operations
#[derive(Debug, Error)]
pub enum ActorError {
    /// Inbound batch for a type nobody registered
    #[error("schema type `{0}` is not registered")]
    UnknownSchemaType(String),

    /// A subscribe request needs a webhook and the actor advertises none
    #[error("no webhook given and the actor has no advertised endpoint")]
    MissingEndpoint,

    /// Document errors
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    /// JSON encoding errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type using ActorError
pub type Result<T> = std::result::Result<T, ActorError>;
