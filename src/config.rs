//! Broker endpoint configuration
//!
//! Connection defaults may be seeded from an optional `etc/config.json`
//! sitting next to the installed binary, holding a single field:
//!
//! ```json
//! { "rabbitmq": "login:password:host:port" }
//! ```
//!
//! Any read or parse problem falls back silently to the built-in defaults.
//! A missing or malformed config file is the common case for an ad-hoc
//! diagnostic tool, not an error condition.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5672;
pub const DEFAULT_LOGIN: &str = "guest";
pub const DEFAULT_PASSWORD: &str = "guest";

/// Where to connect, resolved once at startup and immutable after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    rabbitmq: Option<String>,
}

impl Default for BrokerEndpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            login: DEFAULT_LOGIN.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
        }
    }
}

impl BrokerEndpoint {
    /// Load the endpoint from the default config path.
    pub fn load() -> Self {
        match default_config_path() {
            Some(path) => Self::from_file(&path),
            None => Self::default(),
        }
    }

    /// Load the endpoint from a specific config file, falling back to the
    /// defaults on any failure.
    pub fn from_file(path: &Path) -> Self {
        Self::try_from_file(path).unwrap_or_default()
    }

    fn try_from_file(path: &Path) -> Option<Self> {
        let raw = fs::read_to_string(path).ok()?;
        let cfg: ConfigFile = serde_json::from_str(&raw).ok()?;
        parse_broker_spec(&cfg.rabbitmq?)
    }

    /// Override the hostname (the `-h` flag wins over the config file).
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// URI handed to the transport layer.
    pub fn amqp_uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/%2f",
            self.login, self.password, self.host, self.port
        )
    }
}

/// Parse a `"login:password:host:port"` spec. Exactly four segments, numeric
/// port; anything else is rejected.
fn parse_broker_spec(spec: &str) -> Option<BrokerEndpoint> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 4 {
        return None;
    }
    let port: u16 = parts[3].parse().ok()?;
    Some(BrokerEndpoint {
        login: parts[0].to_string(),
        password: parts[1].to_string(),
        host: parts[2].to_string(),
        port,
    })
}

/// `<exe dir>/../etc/config.json`, matching where the tool is installed.
fn default_config_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join("..").join("etc").join("config.json"))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
