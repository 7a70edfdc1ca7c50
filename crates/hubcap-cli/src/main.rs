//! hubcap command line client.

mod args;
mod commands;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::args::{Cli, Command};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("HUBCAP_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match cli.config.clone().or_else(config::default_path) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    let config = config.resolve(cli.url, cli.key, |name| std::env::var(name).ok());
    let client = config
        .builder()?
        .build()
        .context("failed to configure client")?;

    match cli.command {
        Command::Publish { channel, content } => commands::publish(&client, &channel, &content).await,
        Command::Poll {
            subscription,
            channels,
            order,
        } => commands::poll(&client, &subscription, &channels, order).await,
        Command::Listen {
            subscription,
            channels,
            order,
            timeout,
        } => commands::listen(&client, &subscription, &channels, order, timeout).await,
        Command::Channels => commands::channels(&client).await,
    }
}
