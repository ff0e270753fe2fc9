//! CLI argument definitions for the Berrybot application.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use berrybot_core::config::{expand_home, BerrybotConfig};
use berrybot_core::credentials::{CredentialProvider, StaticCredentials, TokenStore};
use berrybot_core::types::Timeframe;

/// Berrybot - customer-support chat for blueberry growers.
#[derive(Parser, Debug)]
#[command(name = "berrybot", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Bearer token to use instead of the stored login.
    #[arg(long = "token", global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run the local gateway and admin API.
    Serve {
        /// API server port.
        #[arg(short = 'p', long = "port")]
        port: Option<u16>,
        /// Data directory for documents, session logs and the outbox.
        #[arg(short = 'd', long = "data-dir")]
        data_dir: Option<PathBuf>,
    },
    /// Chat with the bot on stdin/stdout.
    Chat,
    /// Log in to the user directory.
    Login {
        #[arg(short = 'u', long = "username")]
        username: String,
        /// Read from BERRYBOT_PASSWORD or prompted when omitted.
        #[arg(long = "password")]
        password: Option<String>,
    },
    /// Renew the stored access token.
    Refresh,
    /// Forget the stored tokens.
    Logout,
    /// List documents in the knowledge base.
    Files,
    /// Upload a document.
    Upload {
        path: PathBuf,
        /// Name to store the document under (defaults to the file name).
        #[arg(long = "name")]
        name: Option<String>,
        #[arg(long = "content-type")]
        content_type: Option<String>,
    },
    /// Download a document.
    Download {
        key: String,
        /// Output path (defaults to the last segment of the key).
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Delete a document.
    Delete { key: String },
    /// Re-index the knowledge base.
    Sync,
    /// Show usage analytics.
    Analytics {
        #[arg(short = 't', long = "timeframe", default_value = "today")]
        timeframe: Timeframe,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > BERRYBOT_CONFIG env var > ~/.berrybot/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("BERRYBOT_CONFIG") {
            return PathBuf::from(p);
        }
        expand_home("~/.berrybot/config.toml")
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > BERRYBOT_PORT env var > config file value > 3040.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Command::Serve { port: Some(p), .. } = self.command {
            return p;
        }
        if let Ok(val) = std::env::var("BERRYBOT_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        if config_port != 0 {
            return config_port;
        }
        3040
    }

    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }

    /// Apply command-line overrides to a loaded config.
    pub fn apply_overrides(&self, config: &mut BerrybotConfig) {
        config.server.port = self.resolve_port(config.server.port);
        if let Command::Serve {
            data_dir: Some(dir),
            ..
        } = &self.command
        {
            config.general.data_dir = dir.to_string_lossy().to_string();
        }
        config.general.log_level = self.resolve_log_level(&config.general.log_level);
    }

    /// Credentials for outbound calls.
    ///
    /// Priority: --token flag > BERRYBOT_TOKEN env var > stored login.
    pub fn resolve_credentials(&self, config: &BerrybotConfig) -> Arc<dyn CredentialProvider> {
        if let Some(token) = &self.token {
            return Arc::new(StaticCredentials::new(token.clone()));
        }
        if let Ok(token) = std::env::var("BERRYBOT_TOKEN") {
            if !token.is_empty() {
                return Arc::new(StaticCredentials::new(token));
            }
        }
        Arc::new(TokenStore::new(expand_home(&config.auth.token_file)))
    }
}
