use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use switchyard_core::{
    Actor, ActorError, DeliveryChannel, Document, MaxAge, SchemaTypeConfig,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{buffer::RecentDocuments, config::RelayConfig, delivery::http_channel};

/// Inbound batches larger than this are rejected.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub actor: Actor,
}

/// Errors returned by the HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Type not registered, or registered without a webhook.
    UnknownSchemaType(String),
    Actor(ActorError),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::UnknownSchemaType(name) => write!(f, "unknown schema type: {}", name),
            ApiError::Actor(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<ActorError> for ApiError {
    fn from(err: ActorError) -> Self {
        match err {
            ActorError::UnknownSchemaType(name) => ApiError::UnknownSchemaType(name),
            other => ApiError::Actor(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UnknownSchemaType(_) => StatusCode::NOT_FOUND,
            ApiError::Actor(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the actor described by `config`, delivering through `channel`.
pub fn build_actor(config: &RelayConfig, channel: Arc<dyn DeliveryChannel>) -> Actor {
    let mut builder = Actor::builder(config.name.clone())
        .channel(channel)
        .command_subscriptions(config.allow_command_subscriptions);
    if let Some(endpoint) = &config.endpoint {
        builder = builder.endpoint(endpoint.clone());
    }
    if let Some(token) = &config.token {
        builder = builder.token(token.clone());
    }
    if let Some(ttl) = config.subscription_ttl {
        builder = builder.retention(MaxAge(ttl));
    }
    let actor = builder.build();

    for (name, entry) in &config.schema_types {
        let mut schema = SchemaTypeConfig::new()
            .allow_subscribe(entry.allow_subscribe)
            .persist(entry.persist)
            .webhook(entry.webhook);
        if entry.persist {
            let buffer = Arc::new(RecentDocuments::new(name.clone(), entry.retain));
            schema = schema.on_incoming(buffer.clone()).hydrate(buffer);
        }
        actor.register(name.clone(), schema);
    }

    actor
}

/// HTTP surface of an actor.
pub fn router(actor: Actor) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/capabilities", get(capabilities))
        .route("/subscriptions", get(subscriptions))
        .route("/{schema_type}", post(ingest))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { actor })
}

pub async fn serve(config: RelayConfig) -> Result<()> {
    let channel = http_channel(config.delivery_timeout)?;
    let actor = build_actor(&config, channel);

    info!(
        name = %config.name,
        endpoint = ?config.endpoint,
        schema_types = ?actor.schema_types(),
        "actor ready"
    );

    let app = router(actor);
    info!(addr = %config.listen_addr, "switchyard listening");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn capabilities(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.actor.capabilities())
}

async fn subscriptions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.actor.subscriptions())
}

async fn ingest(
    Path(schema_type): Path<String>,
    State(state): State<AppState>,
    Json(documents): Json<Vec<Document>>,
) -> Result<impl IntoResponse, ApiError> {
    let exposed = state
        .actor
        .schema(&schema_type)
        .is_some_and(|config| config.webhook);
    if !exposed {
        return Err(ApiError::UnknownSchemaType(schema_type));
    }

    let result = state.actor.dispatch(&schema_type, documents).await?;
    Ok(Json(result))
}
