//! matterbar CLI entry point.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use matterbar::cli;
use matterbar::Result;
use matterbar::gateway::{GatewayServer, LoggingConfig, ServiceConfig};
use matterbar::host::{FileKvStore, MattermostHost};
use matterbar::{Event, Formatter, LinkTemplates, MentionList, Relay};

/// Relay Rollbar webhooks into Mattermost.
#[derive(Parser)]
#[command(name = "matterbar")]
#[command(about = "Rollbar notifications, posted where your team talks.")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(short, long, env = "MATTERBAR_CONFIG", default_value = "matterbar.json")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the post a webhook payload would produce
    Render {
        /// Path to a Rollbar webhook JSON payload
        payload: PathBuf,

        /// Username to mention (repeatable)
        #[arg(short, long = "mention")]
        mentions: Vec<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current config with secrets masked
    Show,

    /// Validate config
    Validate,

    /// Write a default config file
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = cli::load_config(&cli.config);
    let logging = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_else(|_| LoggingConfig::default());
    cli::init_logging(&logging, cli.verbose);

    match cli.command {
        Commands::Serve { port } => {
            let mut config = loaded?;
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config, cli::expand_path(&cli.config))
                .await
                .context("matterbar serve failed")?;
        }

        Commands::Render { payload, mentions } => {
            let links = loaded.map(|config| config.links).unwrap_or_default();
            render(&payload, mentions, links)
                .with_context(|| format!("failed to render {}", payload.display()))?;
        }

        Commands::Config { action } => match action {
            ConfigCommands::Show => {
                let config = loaded?;
                println!("{}", serde_json::to_string_pretty(&masked(config))?);
            }
            ConfigCommands::Validate => {
                let config = loaded?;
                config.validate()?;
                println!("Configuration OK: {}", cli.config.display());
            }
            ConfigCommands::Init => {
                let path = cli::expand_path(&cli.config);
                if path.exists() {
                    bail!("{} already exists", path.display());
                }
                ServiceConfig::default().save(&path)?;
                println!("Wrote {}", path.display());
                println!(
                    "Set mattermost.url, mattermost.token and plugin.secret \
                     before running `matterbar serve`."
                );
            }
        },
    }

    Ok(())
}

async fn serve(config: ServiceConfig, config_path: PathBuf) -> Result<()> {
    config.validate()?;

    let kv = FileKvStore::open(cli::expand_path(&config.store.path)).await?;
    let host = Arc::new(MattermostHost::new(&config.mattermost, kv)?);

    let relay = Arc::new(Relay::new(host, config.plugin.clone(), config.links.clone()));
    relay.on_activate().await?;
    relay
        .on_configuration_change(config.plugin.clone(), config.links.clone())
        .await?;

    #[cfg(unix)]
    spawn_reload(relay.clone(), config_path)?;
    #[cfg(not(unix))]
    let _ = config_path;

    GatewayServer::new(relay, &config.server.host, config.server.port)
        .start()
        .await?;
    Ok(())
}

/// Re-read the config file on SIGHUP and apply the relay settings.
#[cfg(unix)]
fn spawn_reload(relay: Arc<Relay>, path: PathBuf) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            tracing::info!(path = %path.display(), "Reloading configuration");

            let config = match ServiceConfig::load(&path).and_then(|config| {
                config.validate()?;
                Ok(config)
            }) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring invalid configuration");
                    continue;
                }
            };

            // Failures are logged by the relay and leave the old settings active.
            let _ = relay.on_configuration_change(config.plugin, config.links).await;
        }
    });
    Ok(())
}

fn render(payload: &Path, mentions: Vec<String>, links: LinkTemplates) -> Result<()> {
    let body = std::fs::read(payload)?;
    let event = Event::from_slice(&body)?;

    let mentions: MentionList = mentions
        .iter()
        .map(|name| name.trim_start_matches('@'))
        .collect();

    let post = Formatter::new(links).post(&event, &mentions, "", "");
    println!("{}", serde_json::to_string_pretty(&post)?);
    Ok(())
}

fn masked(mut config: ServiceConfig) -> ServiceConfig {
    const MASK: &str = "********";
    if !config.mattermost.token.is_empty() {
        config.mattermost.token = MASK.to_string();
    }
    if !config.plugin.secret.is_empty() {
        config.plugin.secret = MASK.to_string();
    }
    if let Some(token) = config.plugin.command_token.as_mut() {
        *token = MASK.to_string();
    }
    config
}
