//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (HUDDLE_HOST, HUDDLE_PORT)
//! - TOML configuration file
//! - The `--config` command line flag

use anyhow::{Context, Result};
use huddle_core::{CoordinatorConfig, Room, RoomSettings, TokenTable};
use huddle_protocol::WireFormat;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Session coordinator options.
    #[serde(default)]
    pub coordinator: SessionConfig,

    /// Handshake credentials.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Rooms created at startup.
    #[serde(default)]
    pub rooms: Vec<RoomConfig>,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Wire format used when the client does not ask for one.
    #[serde(default)]
    pub default_format: WireFormat,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Session coordinator options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Remove kicked participants from the room right away.
    #[serde(default)]
    pub evict_on_kick: bool,

    /// Recent chat messages sent to each new member.
    #[serde(default = "default_chat_history")]
    pub chat_history_on_join: usize,
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Accepted bearer tokens.
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

/// One accepted bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    pub user_id: String,
}

/// A room created at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// User ID of the host.
    pub host: String,
    #[serde(default)]
    pub lobby_enabled: bool,
    #[serde(default)]
    pub recording_enabled: bool,
    #[serde(default = "default_max_participants")]
    pub max_participants: usize,
}

// Default value functions
fn default_host() -> String {
    std::env::var("HUDDLE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("HUDDLE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_chat_history() -> usize {
    50
}

fn default_max_participants() -> usize {
    huddle_core::room::DEFAULT_MAX_PARTICIPANTS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            metrics: MetricsConfig::default(),
            coordinator: SessionConfig::default(),
            auth: AuthConfig::default(),
            rooms: Vec::new(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            default_format: WireFormat::Json,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            evict_on_kick: false,
            chat_history_on_join: default_chat_history(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "huddle.toml",
            "/etc/huddle/huddle.toml",
            "~/.config/huddle/huddle.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let expanded = shellexpand::tilde(&path.as_ref().to_string_lossy()).into_owned();
        let path = Path::new(&expanded);
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Coordinator options.
    #[must_use]
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            evict_on_kick: self.coordinator.evict_on_kick,
            chat_history_on_join: self.coordinator.chat_history_on_join,
        }
    }

    /// Token table for the handshake authenticator.
    #[must_use]
    pub fn token_table(&self) -> TokenTable {
        self.auth
            .tokens
            .iter()
            .map(|t| (t.token.clone(), t.user_id.clone()))
            .collect()
    }

    /// Rooms to seed the in-memory store with.
    #[must_use]
    pub fn seed_rooms(&self) -> Vec<Room> {
        self.rooms
            .iter()
            .map(|r| {
                let name = if r.name.is_empty() { &r.id } else { &r.name };
                Room::new(r.id.clone(), name.clone(), r.host.clone()).with_settings(RoomSettings {
                    lobby_enabled: r.lobby_enabled,
                    recording_enabled: r.recording_enabled,
                    max_participants: r.max_participants,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(config.transport.default_format, WireFormat::Json);
        assert!(!config.coordinator.evict_on_kick);
        assert_eq!(config.coordinator.chat_history_on_join, 50);
        assert!(config.rooms.is_empty());
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config {
            host: "127.0.0.1".into(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.bind_addr().unwrap().port(), 8080);

        let broken = Config {
            host: "not a host".into(),
            ..Config::default()
        };
        assert!(broken.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [transport]
            default_format = "msgpack"

            [limits]
            max_connections = 500

            [coordinator]
            evict_on_kick = true

            [[auth.tokens]]
            token = "tok-alice"
            user_id = "alice"

            [[rooms]]
            id = "standup"
            name = "Daily standup"
            host = "alice"
            lobby_enabled = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.transport.default_format, WireFormat::Msgpack);
        assert_eq!(config.limits.max_connections, 500);
        assert!(config.coordinator_config().evict_on_kick);
        assert_eq!(config.token_table().len(), 1);

        let rooms = config.seed_rooms();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].name, "Daily standup");
        assert!(rooms[0].settings.lobby_enabled);
        assert_eq!(
            rooms[0].settings.max_participants,
            huddle_core::room::DEFAULT_MAX_PARTICIPANTS
        );
    }
}
