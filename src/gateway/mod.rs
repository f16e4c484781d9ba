//! HTTP gateway.
//!
//! Exposes the relay to the outside world:
//!
//! ```text
//!  Rollbar ──POST /notify──┐
//!                          ├──► GatewayServer ──► Relay ──► HostApi
//!  Mattermost ─POST /command┘
//! ```
//!
//! The on-disk [`ServiceConfig`] also lives here.

pub mod config;
pub mod server;

pub use config::{LoggingConfig, ServerConfig, ServiceConfig, StoreConfig};
pub use server::{router, GatewayServer, ServerState};
