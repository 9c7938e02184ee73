//! Command-line interface definitions.

use clap::{Parser, Subcommand};

use insightvault::ApiType;

/// InsightVault feed ingestion.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to config.toml
    #[arg(short, long, env = "INSIGHTVAULT_CONFIG", default_value = "config.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a new source
    AddSource {
        /// Display name
        #[arg(long)]
        name: String,

        /// Unique slug (lowercase letters, digits, '-' and '_')
        #[arg(long)]
        slug: String,

        /// Feed URL
        #[arg(long)]
        endpoint: String,

        /// Protocol: rss, rest, youtube or twitter
        #[arg(long, default_value = "rss")]
        api_type: ApiType,

        /// Minimum seconds between scheduled fetches
        #[arg(long)]
        interval: Option<i64>,
    },

    /// List registered sources
    ListSources,

    /// Fetch one source by slug, or every enabled source
    Refresh {
        slug: Option<String>,
    },

    /// Show the newest stored items
    Items {
        /// Only items from this source
        #[arg(long)]
        source: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Refresh due sources periodically until interrupted
    Watch,
}
