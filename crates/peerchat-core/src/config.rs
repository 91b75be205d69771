//! Configuration resolution for peerchat.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/peerchat/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (applied by the binary, highest priority)
//!
//! Every layer is a complete [`Config`]; the merged result is validated once.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Complete peerchat configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub options: ChatOptions,
    #[serde(default)]
    pub session: SessionTimeouts,
    #[serde(default)]
    pub store: StoreSettings,
}

/// User-facing chat options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatOptions {
    /// Persist sent and received messages to the message store.
    pub save_messages: bool,
    /// Encrypt chat payloads end to end.
    pub encryption_enabled: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            save_messages: false,
            encryption_enabled: true,
        }
    }
}

/// Bounds on the controller's suspension points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTimeouts {
    /// How long to wait for a connection to open (seconds).
    pub connect_timeout_secs: u64,
    /// How long to wait for the peer's public key (seconds).
    pub handshake_timeout_secs: u64,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            handshake_timeout_secs: 15,
        }
    }
}

impl SessionTimeouts {
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

/// Where and under which schema version messages are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Logical store name; also the file name when `path` is unset.
    pub name: String,
    /// Schema version this build expects.
    pub version: i64,
    /// Explicit database file path.
    pub path: Option<PathBuf>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            name: "webchat.db".to_string(),
            version: 1,
            path: None,
        }
    }
}

impl StoreSettings {
    /// Resolved database file path, if one can be determined.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.path
            .clone()
            .or_else(|| data_dir().map(|dir| dir.join(&self.name)))
    }
}

impl Config {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.session.connect_timeout_secs == 0 {
            return Err(Error::Config("connect_timeout_secs must be > 0".into()));
        }
        if self.session.handshake_timeout_secs == 0 {
            return Err(Error::Config("handshake_timeout_secs must be > 0".into()));
        }
        if self.store.name.trim().is_empty() {
            return Err(Error::Config("store name must not be empty".into()));
        }
        if self.store.version < 1 {
            return Err(Error::Config(format!(
                "store version must be >= 1, got {}",
                self.store.version
            )));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path().filter(|p| p.exists()) {
        config = load_config_file(&global_path)?;
    }

    if let Some(path) = explicit {
        config = load_config_file(path)?;
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    config.validate()?;
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("peerchat").join("settings.json"))
}

/// Get the default data directory for the message store.
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("peerchat"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn apply_env_overrides(config: &mut Config, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = env("PEERCHAT_SAVE_MESSAGES").as_deref().and_then(parse_bool) {
        config.options.save_messages = v;
    }
    if let Some(v) = env("PEERCHAT_ENCRYPTION").as_deref().and_then(parse_bool) {
        config.options.encryption_enabled = v;
    }
    if let Some(n) = env("PEERCHAT_CONNECT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.session.connect_timeout_secs = n;
    }
    if let Some(n) = env("PEERCHAT_HANDSHAKE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.session.handshake_timeout_secs = n;
    }
    if let Some(path) = env("PEERCHAT_DB_PATH") {
        config.store.path = Some(PathBuf::from(path));
    }
}
