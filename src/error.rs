//! Error types for matterbar.
//!
//! This module defines all error types used throughout the relay.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Main error type for matterbar operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Webhook handling errors
    #[error("Notify error: {0}")]
    Notify(#[from] NotifyError),

    /// Host API errors
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// Relay lifecycle errors
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for matterbar.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures of a single `/notify` request.
///
/// Every variant is terminal for the request it belongs to and maps onto
/// exactly one HTTP status.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// The body was not JSON, or lacked the `event_name`/`data` envelope.
    #[error("{0}")]
    MalformedPayload(String),

    #[error("Unauthenticated.")]
    AuthFailure,

    /// Neither a configured default nor a query parameter names the target.
    #[error("Missing '{0}' query parameter.")]
    MissingParameter(&'static str),

    #[error("{kind} '{name}' does not exist.")]
    ResolutionFailure { kind: &'static str, name: String },

    #[error("{0}")]
    DownstreamPostFailure(String),
}

impl NotifyError {
    /// HTTP status reported to the webhook sender.
    pub fn status(&self) -> StatusCode {
        match self {
            NotifyError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            NotifyError::AuthFailure => StatusCode::UNAUTHORIZED,
            NotifyError::MissingParameter(_) => StatusCode::BAD_REQUEST,
            NotifyError::ResolutionFailure { .. } => StatusCode::BAD_REQUEST,
            NotifyError::DownstreamPostFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn team_not_found(name: &str) -> Self {
        NotifyError::ResolutionFailure {
            kind: "Team",
            name: name.to_string(),
        }
    }

    pub fn channel_not_found(name: &str) -> Self {
        NotifyError::ResolutionFailure {
            kind: "Channel",
            name: name.to_string(),
        }
    }
}

impl IntoResponse for NotifyError {
    fn into_response(self) -> Response {
        (self.status(), format!("{}\n", self)).into_response()
    }
}

/// Errors raised by the chat host.
#[derive(Error, Debug)]
pub enum HostError {
    /// Transport-level failure talking to the host.
    #[error("Request failed: {0}")]
    Http(String),

    /// The host answered with an error status.
    #[error("{message} (status {status})")]
    Api { status: u16, message: String },

    /// The key-value store could not be read or written.
    #[error("Store error: {0}")]
    Store(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for HostError {
    fn from(err: reqwest::Error) -> Self {
        HostError::Http(err.to_string())
    }
}

/// Errors related to the `/rollbar` slash command.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Mention store unavailable: {0}")]
    Store(#[from] HostError),

    #[error("Corrupt mention list for channel {channel_id}: {reason}")]
    CorruptMentions { channel_id: String, reason: String },

    #[error("Invalid command token")]
    Unauthorized,
}

/// Errors raised while driving the relay lifecycle.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Failed to ensure bot account: {0}")]
    Activation(HostError),

    #[error("Server error: {0}")]
    Server(String),
}

/// Errors related to configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid config value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Missing required config: {0}")]
    MissingRequired(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    /// A configured name could not be resolved against the host.
    #[error("Configuration invalid: {0}")]
    Unresolved(String),
}
