//! channelhub - resolved channel and release metadata for upgrade
//! clients.
//!
//! Main entry point: flag/environment parsing, logging setup, and the
//! `inspect` / `watch` subcommands over one store per tenant sub-key.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use channelhub_core::{ConfigStore, StoreOptions, UnresolvedPolicy};

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Refresh interval accepting "30s", "15m", "1h", or bare seconds.
#[derive(Debug, Clone, Copy)]
struct RefreshInterval {
    duration: Duration,
}

impl FromStr for RefreshInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, unit) = trimmed.split_at(split);

        let value: u64 = digits
            .parse()
            .map_err(|_| format!("invalid refresh interval: {s}"))?;
        let seconds = match unit {
            "" | "s" => value,
            "m" => value * 60,
            "h" => value * 60 * 60,
            other => return Err(format!("invalid refresh interval unit: {other:?}")),
        };
        if seconds == 0 {
            return Err(format!("refresh interval must be positive: {s}"));
        }

        Ok(RefreshInterval {
            duration: Duration::from_secs(seconds),
        })
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "channelhub",
    about = "Resolve and serve channel and release metadata",
    version
)]
struct Cli {
    /// Configuration document sources; the first one that answers wins
    #[clap(long, env = "URL", value_delimiter = ',', default_value = "channels.yaml")]
    url: Vec<String>,

    /// Tenant sub-keys to load, one independent store per key
    #[clap(long = "config-key", env = "SUBKEY", value_delimiter = ',')]
    config_key: Vec<String>,

    /// Server version the release catalog is filtered against
    #[clap(long, env = "CHANNEL_SERVER_VERSION", default_value = "")]
    channel_server_version: String,

    /// Application name the app-defaults view is scoped to
    #[clap(long, env = "APP_NAME", default_value = "")]
    app_name: String,

    /// Bearer token for the GitHub release feed
    #[clap(long, env = "GITHUB_TOKEN", default_value = "", hide_env_values = true)]
    gh_token: String,

    /// Treat a channel pattern that matches nothing as a reload failure
    #[clap(long)]
    strict_channels: bool,

    /// How often the configuration is refreshed in watch mode
    #[clap(long, env = "REFRESH_INTERVAL", default_value = "15m")]
    refresh_interval: RefreshInterval,

    /// Log level
    #[clap(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and resolve the configuration once and print it as JSON
    Inspect,
    /// Keep the configuration loaded and refreshed until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_filter_directive()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let keys = if cli.config_key.is_empty() {
        vec![String::new()]
    } else {
        cli.config_key.clone()
    };

    let mut stores = Vec::with_capacity(keys.len());
    for key in &keys {
        let options = StoreOptions {
            sources: cli.url.clone(),
            sub_key: key.clone(),
            server_version: cli.channel_server_version.clone(),
            app_name: cli.app_name.clone(),
            github_token: cli.gh_token.clone(),
            unresolved: if cli.strict_channels {
                UnresolvedPolicy::Fail
            } else {
                UnresolvedPolicy::LeaveEmpty
            },
        };
        let store = ConfigStore::new(options)
            .await
            .with_context(|| format!("failed to load initial config for {key:?}"))?;
        stores.push(store);
    }

    match cli.command {
        Command::Inspect => inspect(&stores).await,
        Command::Watch => watch_until_interrupted(&stores, cli.refresh_interval.duration).await,
    }
}

async fn inspect(stores: &[Arc<ConfigStore>]) -> Result<()> {
    for store in stores {
        if !store.sub_key().is_empty() {
            println!("# {}", store.sub_key());
        }
        let snapshot = store.snapshot().await;
        println!(
            "{}",
            serde_json::to_string_pretty(snapshot.as_ref())
                .context("failed to render snapshot")?
        );
    }
    Ok(())
}

async fn watch_until_interrupted(stores: &[Arc<ConfigStore>], interval: Duration) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles: Vec<_> = stores
        .iter()
        .map(|store| store.spawn_refresh(interval, shutdown_rx.clone()))
        .collect();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}
