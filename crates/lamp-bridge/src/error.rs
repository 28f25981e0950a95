//! CLI error types with miette diagnostics.

use std::net::SocketAddr;

use lamp_config::ConfigError;
use miette::Diagnostic;
use thiserror::Error;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const NETWORK: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(lamp::config),
        help(
            "Check the config file (lamp-bridge config path) and any LAMP_* \
             environment variables."
        )
    )]
    Config(#[from] ConfigError),

    #[error("Config file already exists at {path}")]
    #[diagnostic(
        code(lamp::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    // ── Network ──────────────────────────────────────────────────────
    #[error("Could not listen on {addr}")]
    #[diagnostic(
        code(lamp::bind),
        help("Another process may own the port. Choose another with --listen.")
    )]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not build the webhook HTTP client")]
    #[diagnostic(code(lamp::http_client))]
    HttpClient(#[source] reqwest::Error),

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => exit_code::CONFIG,
            Self::ConfigExists { .. } => exit_code::USAGE,
            Self::Bind { .. } | Self::HttpClient(_) => exit_code::NETWORK,
            Self::Io(_) => exit_code::GENERAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        let err = CliError::Config(ConfigError::Validation {
            field: "listen".into(),
            reason: "bad".into(),
        });
        assert_eq!(err.exit_code(), exit_code::CONFIG);

        let err = CliError::Bind {
            addr: "127.0.0.1:1".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert_eq!(err.exit_code(), exit_code::NETWORK);
        assert!(err.to_string().contains("127.0.0.1:1"));
    }
}
