//! # Configuration
//!
//! Tavernkeep reads a single TOML file. Every section has defaults, so an
//! empty file (or a file with only the sections you care about) is valid.
//!
//! - [`ServerConfig`] - server name and listen address
//! - [`LobbyConfig`] - history size, name and message limits, default map size
//! - [`StorageConfig`] - data directory and the chat/roll mirror switch
//! - [`RateLimitConfig`] - per-connection message budget
//! - [`LoggingConfig`] - log level, log file and security log file
//! - [`SecurityConfig`] - Argon2 cost for lobby passwords
//! - [`CampaignsConfig`] - directory of extra campaign definitions
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tavernkeep::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Listening on {}", config.server.bind);
//!     Ok(())
//! }
//! ```
//!
//! ## File Format
//!
//! ```toml
//! [server]
//! name = "The Prancing Pony"
//! bind = "0.0.0.0:8080"
//!
//! [lobby]
//! history_limit = 40
//!
//! [rate_limit]
//! max_events = 40
//! window_ms = 10000
//!
//! [security.argon2]
//! memory_kib = 19456
//! time_cost = 2
//! parallelism = 1
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::lobby::map::{MAX_SIDE, MIN_SIDE};
use crate::lobby::LobbyDefaults;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            name: "Tavernkeep".to_string(),
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// Chat and roll entries replayed to a new joiner.
    pub history_limit: usize,
    pub max_name_chars: usize,
    pub max_lobby_name_chars: usize,
    pub max_message_chars: usize,
    pub default_map_width: i64,
    pub default_map_height: i64,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        LobbyConfig {
            history_limit: 40,
            max_name_chars: 24,
            max_lobby_name_chars: 32,
            max_message_chars: 500,
            default_map_width: 20,
            default_map_height: 20,
        }
    }
}

impl LobbyConfig {
    pub fn defaults(&self) -> LobbyDefaults {
        LobbyDefaults {
            history_limit: self.history_limit,
            map_width: self.default_map_width,
            map_height: self.default_map_height,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Copy chat, rolls and lobby metadata into a sled database.
    pub mirror_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: "./data".to_string(),
            mirror_enabled: true,
        }
    }
}

impl StorageConfig {
    pub fn mirror_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("mirror")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_events: u32,
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            enabled: true,
            max_events: 40,
            window_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default)]
    pub security_file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: Some("tavernkeep.log".to_string()),
            security_file: Some("tavernkeep-security.log".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Argon2Config {
    #[serde(default)]
    pub memory_kib: Option<u32>,
    #[serde(default)]
    pub time_cost: Option<u32>,
    #[serde(default)]
    pub parallelism: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub argon2: Option<Argon2Config>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CampaignsConfig {
    /// Directory of `*.json` campaign definitions loaded next to the built-ins.
    #[serde(default)]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub lobby: LobbyConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: Option<SecurityConfig>,
    #[serde(default)]
    pub campaigns: CampaignsConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.server
            .bind
            .parse::<std::net::SocketAddr>()
            .map_err(|e| anyhow!("server.bind '{}' is not a socket address: {}", self.server.bind, e))?;
        let l = &self.lobby;
        if l.max_name_chars == 0 || l.max_lobby_name_chars == 0 || l.max_message_chars == 0 {
            return Err(anyhow!("lobby name and message limits must be at least 1"));
        }
        for (what, side) in [("default_map_width", l.default_map_width), ("default_map_height", l.default_map_height)] {
            if !(MIN_SIDE..=MAX_SIDE).contains(&side) {
                return Err(anyhow!("lobby.{} must be within {}-{}, got {}", what, MIN_SIDE, MAX_SIDE, side));
            }
        }
        if self.rate_limit.enabled && (self.rate_limit.max_events == 0 || self.rate_limit.window_ms == 0) {
            return Err(anyhow!("rate_limit.max_events and rate_limit.window_ms must be positive"));
        }
        Ok(())
    }

    pub fn argon2(&self) -> Option<&Argon2Config> {
        self.security.as_ref().and_then(|s| s.argon2.as_ref())
    }
}
