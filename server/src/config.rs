//! Server configuration file
//!
//! ```json
//! { "ip": "localhost", "port": 19560, "password": "", "map_path": "server/maps/yard.json" }
//! ```
//!
//! Every key is optional; missing keys fall back to the defaults below.

use serde::{Deserialize, Serialize};
use shared::DEFAULT_PORT;
use std::io;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "server/server_conf.json";
pub const DEFAULT_MAP_PATH: &str = "server/maps/yard.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub ip: String,
    pub port: u16,
    pub password: String,
    pub map_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: "localhost".to_string(),
            port: DEFAULT_PORT,
            password: String::new(),
            map_path: DEFAULT_MAP_PATH.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Loads `path`, or returns the defaults when the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            other => other,
        }
    }

    /// `ip:port` suitable for binding
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}
