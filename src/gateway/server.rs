//! HTTP server.
//!
//! | Route           | Method | Handler                      |
//! |-----------------|--------|------------------------------|
//! | `/notify`       | POST   | Rollbar webhook              |
//! | `/command`      | POST   | `/rollbar` slash command     |
//! | `/health`       | GET    | liveness probe               |
//!
//! Anything else is a 404; other methods on `/notify` are a 405.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use tower_http::trace::TraceLayer;

use crate::command::{verify_token, CommandArgs, RollbarCommand};
use crate::error::{NotifyError, RelayError};
use crate::relay::{NotifyQuery, Relay};

/// Shared state of all handlers.
pub struct ServerState {
    pub relay: Arc<Relay>,
    pub command: RollbarCommand,
    pub version: String,
}

impl ServerState {
    pub fn new(relay: Arc<Relay>) -> Self {
        let command = RollbarCommand::new(relay.host().clone(), relay.mentions().clone());
        Self {
            relay,
            command,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Build the application router.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/notify", post(notify_handler).fallback(method_not_allowed))
        .route("/command", post(command_handler))
        .route("/health", get(health_handler))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct GatewayServer {
    state: Arc<ServerState>,
    host: String,
    port: u16,
}

impl GatewayServer {
    pub fn new(relay: Arc<Relay>, host: &str, port: u16) -> Self {
        Self {
            state: Arc::new(ServerState::new(relay)),
            host: host.to_string(),
            port,
        }
    }

    /// Serve until Ctrl-C.
    pub async fn start(&self) -> Result<(), RelayError> {
        let app = router(self.state.clone());

        let addr: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| RelayError::Server(format!("Invalid address: {}", e)))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Server(e.to_string()))?;

        tracing::info!(
            version = %self.state.version,
            "matterbar listening on {}",
            listener.local_addr().map_err(|e| RelayError::Server(e.to_string()))?
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| RelayError::Server(e.to_string()))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

/// Query pairs are taken as-is so a repeated or oddly encoded parameter
/// still reaches the auth check.
async fn notify_handler(
    State(state): State<Arc<ServerState>>,
    Query(pairs): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Result<StatusCode, NotifyError> {
    let query = NotifyQuery::from_pairs(pairs);
    state.relay.notify(&query, &body).await?;
    Ok(StatusCode::OK)
}

async fn command_handler(
    State(state): State<Arc<ServerState>>,
    Form(args): Form<CommandArgs>,
) -> Response {
    let config = state.relay.config();
    if let Err(e) = verify_token(config.settings.command_token.as_deref(), &args.token) {
        tracing::warn!(channel_id = %args.channel_id, "Rejected slash command: {}", e);
        return (StatusCode::UNAUTHORIZED, format!("{}\n", e)).into_response();
    }

    Json(state.command.execute(&args).await).into_response()
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn method_not_allowed() -> (StatusCode, &'static str) {
    (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed.\n")
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "404 page not found\n")
}
