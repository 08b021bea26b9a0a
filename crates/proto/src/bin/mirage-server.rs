//! Mirage mock SSH server
//!
//! # Usage
//!
//! ```bash
//! mirage-server --listen 127.0.0.1:2222 --channel-ids zero --unknown-messages unimplemented
//! mirage-server --config mirage.toml --log-level debug
//! ```
//!
//! Command-line flags override values from the configuration file.
//! `RUST_LOG` wins over `--log-level` when set.

use clap::Parser;
use mirage_proto::ssh::{ChannelIdPolicy, MockServer, MockServerConfig, UnknownMessagePolicy};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Mock SSH server for exercising SSH clients
#[derive(Parser, Debug)]
#[command(name = "mirage-server")]
#[command(version)]
#[command(about = "Mock SSH server for exercising SSH clients", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    listen: Option<String>,

    /// Local channel id policy
    #[arg(long, value_enum)]
    channel_ids: Option<ChannelIdPolicy>,

    /// Handling of unsupported messages
    #[arg(long, value_enum)]
    unknown_messages: Option<UnknownMessagePolicy>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> Result<MockServerConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => MockServerConfig::load(path)?,
            None => MockServerConfig::default(),
        };
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(policy) = self.channel_ids {
            config.channel_id_policy = policy;
        }
        if let Some(policy) = self.unknown_messages {
            config.unknown_message_policy = policy;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = cli.into_config()?;
    let server = MockServer::bind(config).await?;

    server
        .serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
