//! Configuration for the lamp-bridge binary.
//!
//! A TOML file (platform config dir, or an explicit path) merged with
//! `LAMP_`-prefixed environment variables, and translation to
//! `lamp_core` runtime types. An optional `[gateway]` table lets the
//! bridge set itself up at startup instead of waiting for a Setup call.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use lamp_core::{BridgeConfig, Credentials, NotifyTarget, Timing, TlsMode};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Address the JSON-RPC endpoint binds to.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Accept the gateway's self-signed certificate.
    #[serde(default = "default_insecure")]
    pub insecure: bool,

    #[serde(default)]
    pub timing: TimingConfig,

    /// Set up a gateway connection at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            insecure: default_insecure(),
            timing: TimingConfig::default(),
            gateway: None,
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_insecure() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimingConfig {
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    #[serde(default = "default_settle")]
    pub settle_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            query_timeout_secs: default_query_timeout(),
            settle_secs: default_settle(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_query_timeout() -> u64 {
    5
}
fn default_settle() -> u64 {
    3
}
fn default_connect_timeout() -> u64 {
    10
}

/// Gateway and webhook settings, mirroring the Setup call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Gateway host (IP or name), without scheme.
    pub host: String,

    pub username: String,

    /// Plaintext password (prefer `LAMP_GATEWAY__PASSWORD`).
    pub password: String,

    /// Home-automation host for webhooks, without scheme.
    pub notify_host: String,

    pub notify_token: String,

    #[serde(default)]
    pub channels: i64,

    /// Local hour of the daily reconnect; -1 disables it.
    #[serde(default = "default_reset_hour")]
    pub daily_reset_hour: i64,
}

fn default_reset_hour() -> i64 {
    lamp_core::config::RESET_DISABLED
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "lamp-bridge", "lamp-bridge").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("lamp-bridge");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults, then the file at `path` (if present), then `LAMP_*`
/// variables. Nested keys use a double underscore:
/// `LAMP_TIMING__QUERY_TIMEOUT_SECS=8`.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("LAMP_").split("__"))
}

/// Load the config from `path`, or from [`config_path`] when `None`.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let config: Config = figment(&path).extract()?;
    config.validate()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`, creating parent
/// directories.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, cfg.to_toml()?)?;
    Ok(())
}

// ── Translation to runtime types ────────────────────────────────────

const REDACTED: &str = "********";

impl Config {
    /// A copy safe to print: secrets replaced with a placeholder.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(gw) = copy.gateway.as_mut() {
            gw.password = REDACTED.into();
            gw.notify_token = REDACTED.into();
        }
        copy
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check values that serde alone cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        if self.timing.query_timeout_secs == 0 {
            return Err(ConfigError::Validation {
                field: "timing.query_timeout_secs".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.timing.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation {
                field: "timing.connect_timeout_secs".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|_| ConfigError::Validation {
            field: "listen".into(),
            reason: format!("not a socket address: {}", self.listen),
        })
    }

    pub fn timing(&self) -> Timing {
        Timing {
            query_timeout: Duration::from_secs(self.timing.query_timeout_secs),
            settle_interval: Duration::from_secs(self.timing.settle_secs),
            connect_timeout: Duration::from_secs(self.timing.connect_timeout_secs),
        }
    }

    pub fn tls_mode(&self) -> TlsMode {
        if self.insecure {
            TlsMode::DangerAcceptInvalid
        } else {
            TlsMode::System
        }
    }

    /// Build the startup bridge config from `[gateway]`, if present.
    pub fn bridge_config(&self) -> Result<Option<BridgeConfig>, ConfigError> {
        let Some(gw) = &self.gateway else {
            return Ok(None);
        };

        let credentials = Credentials {
            host: gw.host.clone(),
            username: gw.username.clone(),
            password: SecretString::from(gw.password.clone()),
        };
        let notify = NotifyTarget {
            host: gw.notify_host.clone(),
            token: SecretString::from(gw.notify_token.clone()),
        };

        let mut bridge =
            BridgeConfig::from_setup(credentials, notify, gw.channels, gw.daily_reset_hour)
                .map_err(|e| ConfigError::Validation {
                    field: "gateway".into(),
                    reason: e.to_string(),
                })?;
        bridge.tls = self.tls_mode();
        bridge.timing = self.timing();
        Ok(Some(bridge))
    }
}
