//! # matterbar
//!
//! Relays Rollbar webhooks into Mattermost channels.
//!
//! ## Overview
//!
//! Rollbar posts a JSON notification to `/notify`. matterbar normalizes it,
//! renders it as a colored attachment (title, exception excerpt, environment
//! fields, links back to Rollbar) and posts it as a bot user into the
//! configured or requested channel. Users opted in via `/rollbar notify`
//! are mentioned on every post in that channel.
//!
//! ## Layout
//!
//! - [`rollbar`]: wire payload and the normalized [`Event`]
//! - [`format`]: pure event-to-post rendering
//! - [`mentions`]: per-channel mention lists
//! - [`host`]: the chat server behind [`HostApi`]
//! - [`relay`]: lifecycle and the webhook pipeline
//! - [`command`]: the `/rollbar` slash command
//! - [`gateway`]: HTTP surface and service configuration
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use matterbar::{GatewayServer, MemoryHost, Relay, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::load("matterbar.json")?;
//!     let relay = Arc::new(Relay::new(Arc::new(MemoryHost::new()), config.plugin.clone(), config.links.clone()));
//!     relay.on_activate().await?;
//!     relay.on_configuration_change(config.plugin, config.links).await?;
//!     GatewayServer::new(relay, "127.0.0.1", 8080).start().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod rollbar;
pub mod format;
pub mod mentions;
pub mod host;
pub mod relay;
pub mod command;
pub mod gateway;
pub mod cli;

// Re-export commonly used types
pub use error::{Error, Result};
pub use rollbar::{Event, EventKind, WebhookPayload};
pub use format::{Formatter, LinkTemplates, Post};
pub use mentions::{MentionList, MentionStore};
pub use host::{HostApi, MattermostHost, MemoryHost};
pub use relay::{NotifyQuery, PluginSettings, Relay};
pub use gateway::{GatewayServer, ServiceConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
