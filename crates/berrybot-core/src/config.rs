use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{BerrybotError, Result};

/// Top-level configuration for Berrybot.
///
/// Loaded from `~/.berrybot/config.toml` by default. The client sections
/// (`gateway`, `chat`, `auth`) and the local backend section (`server`) live
/// in the same file so one config drives every subcommand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BerrybotConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl BerrybotConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BerrybotConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| BerrybotError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the document store and session logs.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.berrybot/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Endpoints of the messaging gateway and the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// WebSocket URL of the chat gateway.
    pub websocket_url: String,
    /// Base URL of the admin file API.
    pub api_url: String,
    /// Full URL of the analytics endpoint.
    pub analytics_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            websocket_url: "ws://127.0.0.1:3040/ws".to_string(),
            api_url: "http://127.0.0.1:3040".to_string(),
            analytics_url: "http://127.0.0.1:3040/analytics".to_string(),
        }
    }
}

/// Fixed texts and switches of the chat surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// First assistant message of every session.
    pub welcome_prompt: String,
    /// Reply appended after the location has been captured.
    pub location_ack: String,
    /// Text that replaces a placeholder when a response frame is malformed.
    pub parse_error_text: String,
    /// Text appended when the agent asks for the user's email address.
    pub email_request_text: String,
    /// Text appended once the user has supplied an email address.
    pub email_confirmation_text: String,
    /// Honour `requires_email` in response frames.
    pub email_escalation: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            welcome_prompt: "Welcome user! In order to provide the most accurate responses, can you please tell me where you are growing blueberries?".to_string(),
            location_ack: "Thank you for sharing that information! How can I help you today?"
                .to_string(),
            parse_error_text: "Error parsing response. Please try again.".to_string(),
            email_request_text: "Please provide your email so Admin can get back to you."
                .to_string(),
            email_confirmation_text: "Thank you for your email. The Admin will get back to you when we have an update on this query.".to_string(),
            email_escalation: false,
        }
    }
}

/// User-directory settings for admin login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// User-directory endpoint that accepts `InitiateAuth` calls.
    pub endpoint: String,
    /// App client id registered with the user directory.
    pub client_id: String,
    /// Where issued tokens are cached between invocations.
    pub token_file: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://cognito-idp.us-west-2.amazonaws.com/".to_string(),
            client_id: String::new(),
            token_file: "~/.berrybot/tokens.json".to_string(),
        }
    }
}

/// Local gateway/backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port the gateway listens on (127.0.0.1 only).
    pub port: u16,
    /// File holding the bearer token accepted by the gateway.
    pub api_token_file: String,
    /// Recipient of escalation notifications.
    pub admin_email: String,
    /// Sender address of escalation notifications.
    pub source_email: String,
    /// Number of agent invocations before a query is answered with an error.
    pub agent_max_attempts: u32,
    /// HTTP endpoint of the hosted agent. `None` disables chat relaying.
    pub agent_endpoint: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3040,
            api_token_file: "~/.berrybot/api-token".to_string(),
            admin_email: "admin@example.com".to_string(),
            source_email: "noreply@example.com".to_string(),
            agent_max_attempts: 2,
            agent_endpoint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = BerrybotConfig::default();
        assert_eq!(config.general.data_dir, "~/.berrybot/data");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.gateway.websocket_url, "ws://127.0.0.1:3040/ws");
        assert_eq!(config.server.port, 3040);
        assert_eq!(config.server.agent_max_attempts, 2);
        assert!(config.server.agent_endpoint.is_none());
        assert!(!config.chat.email_escalation);
        assert_eq!(
            config.chat.parse_error_text,
            "Error parsing response. Please try again."
        );
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[general]
log_level = "debug"

[gateway]
websocket_url = "wss://abc.execute-api.us-west-2.amazonaws.com/prod"

[chat]
email_escalation = true
"#;
        let file = create_temp_config(content);
        let config = BerrybotConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(
            config.gateway.websocket_url,
            "wss://abc.execute-api.us-west-2.amazonaws.com/prod"
        );
        assert!(config.chat.email_escalation);
        // Remaining fields use defaults
        assert_eq!(config.gateway.api_url, "http://127.0.0.1:3040");
        assert_eq!(
            config.chat.location_ack,
            "Thank you for sharing that information! How can I help you today?"
        );
        assert_eq!(config.server.port, 3040);
    }

    #[test]
    fn test_load_server_section() {
        let content = r#"
[server]
port = 9000
admin_email = "grower-help@example.org"
agent_max_attempts = 3
agent_endpoint = "http://127.0.0.1:9100/invoke"
"#;
        let file = create_temp_config(content);
        let config = BerrybotConfig::load(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.admin_email, "grower-help@example.org");
        assert_eq!(config.server.agent_max_attempts, 3);
        assert_eq!(
            config.server.agent_endpoint.as_deref(),
            Some("http://127.0.0.1:9100/invoke")
        );
        assert_eq!(config.server.source_email, "noreply@example.com");
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = BerrybotConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.data_dir, "~/.berrybot/data");
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        assert!(BerrybotConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_save_creates_parent_dirs_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");

        let mut config = BerrybotConfig::default();
        config.auth.client_id = "abc123".to_string();
        config.save(&path).unwrap();

        let reloaded = BerrybotConfig::load(&path).unwrap();
        assert_eq!(reloaded.auth.client_id, "abc123");
        assert_eq!(reloaded.chat.welcome_prompt, config.chat.welcome_prompt);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = BerrybotConfig::load(file.path()).unwrap();
        assert_eq!(config.auth.token_file, "~/.berrybot/tokens.json");
        assert_eq!(config.gateway.analytics_url, "http://127.0.0.1:3040/analytics");
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        let expanded = expand_home("~/data");
        assert!(expanded.ends_with("data"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }
}
