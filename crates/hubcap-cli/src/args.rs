use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hubcap::Order;

/// hubcap - publish and listen on channels from a terminal
#[derive(Parser, Debug)]
#[command(name = "hubcap")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// API root URL (overrides HUBCAP_URL and the config file)
    #[arg(short = 'u', long = "url")]
    pub url: Option<String>,

    /// Account key (overrides HUBCAP_KEY and the config file)
    #[arg(short = 'k', long = "key")]
    pub key: Option<String>,

    /// Config file (default: the platform config dir, e.g. ~/.config/hubcap/config.toml)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Publish a message to a channel
    Publish {
        /// Channel name (created if missing)
        channel: String,
        /// Message content; parsed as JSON, otherwise sent as a string
        content: String,
    },
    /// Print whatever messages are waiting on a subscription
    Poll {
        /// Subscription name (created if missing)
        subscription: String,
        /// Channels the subscription aggregates
        #[arg(short = 'c', long = "channel", required = true)]
        channels: Vec<String>,
        /// Batch order: asc or desc
        #[arg(long = "order", default_value = "desc")]
        order: Order,
    },
    /// Listen on a subscription until interrupted
    Listen {
        /// Subscription name (created if missing)
        subscription: String,
        /// Channels the subscription aggregates
        #[arg(short = 'c', long = "channel", required = true)]
        channels: Vec<String>,
        /// Batch order: asc or desc
        #[arg(long = "order", default_value = "desc")]
        order: Order,
        /// Long-poll window in seconds
        #[arg(long = "timeout", default_value_t = hubcap::DEFAULT_LONG_POLL_TIMEOUT_SECS)]
        timeout: u64,
    },
    /// List channel names
    Channels,
}
