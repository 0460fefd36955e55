use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands;
use walletbridge::config::Config;
use walletbridge::Result;

/// walletbridge - wallet extension session bridge for dApp end-to-end tests
#[derive(Parser)]
#[command(name = "walletbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Attach to a running browser (CDP HTTP or WebSocket URL) instead of launching one
    #[arg(long, global = true)]
    pub remote_debugging_url: Option<String>,

    /// Run the launched browser headless
    #[arg(long, global = true)]
    pub headless: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download and unpack the pinned wallet extension
    Install {
        /// Extension version (defaults to wallet.version)
        #[arg(long)]
        version: Option<String>,
    },

    /// Print the wallet setup fingerprint and whether its profile is pre-baked
    Fingerprint,

    /// Onboard the wallet in a fresh profile and store it in the cache
    Prebake {
        /// Replace an existing pre-baked profile
        #[arg(long)]
        force: bool,
    },

    /// Find the wallet extension id in a launched or attached browser
    Locate {
        /// Open this page before locating
        #[arg(long)]
        url: Option<String>,
    },

    /// Open a dApp, connect the wallet and reconcile the network
    Connect {
        /// dApp URL
        url: String,

        /// Test id used to name the profile directory
        #[arg(long, default_value = "cli")]
        test_id: String,

        /// Storage state file to replay before opening the dApp
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// Inspect the extension and profile cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// List cached extension versions and the pre-baked profile state
    List,
    /// Remove a cached extension version
    Remove {
        /// Extension version
        version: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Show the configuration file path
    Path,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::config_path)
    }

    /// Effective configuration: file and environment, then command-line flags.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_from(&self.config_path())?;

        if self.headless {
            config.browser.headless = true;
        }
        if let Some(url) = self
            .remote_debugging_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            config.browser.remote_debugging_url = Some(url.to_string());
        }

        Ok(config)
    }

    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Install { version } => commands::install::run(self, version.as_deref()).await,
            Commands::Fingerprint => commands::fingerprint::run(self).await,
            Commands::Prebake { force } => commands::prebake::run(self, *force).await,
            Commands::Locate { url } => commands::locate::run(self, url.as_deref()).await,
            Commands::Connect {
                url,
                test_id,
                state,
            } => commands::connect::run(self, url, test_id, state.as_deref()).await,
            Commands::Cache { command } => commands::cache::run(self, command).await,
            Commands::Config { command } => commands::config::run(self, command).await,
        }
    }
}
