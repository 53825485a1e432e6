use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::iperf3::process::DEFAULT_IPERF3_PATH;

pub const DEFAULT_CONFIG_PATH: &str = "iperf_relay.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse TOML from config file at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which browser origins may open the live WebSocket.
///
/// Passed explicitly to the upgrade handler. An empty list accepts any origin.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct WebSocketPolicy {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl WebSocketPolicy {
    pub fn accepts(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        origin.is_some_and(|o| self.allowed_origins.iter().any(|allowed| allowed == o))
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub listen_address: SocketAddr,
    pub iperf3_path: PathBuf,
    pub log_dir: String,
    pub websocket: WebSocketPolicy,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialAgentConfig {
    listen_address: Option<String>,
    iperf3_path: Option<PathBuf>,
    log_dir: Option<String>,
    websocket: Option<WebSocketPolicy>,
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            iperf3_path: PathBuf::from(DEFAULT_IPERF3_PATH),
            log_dir: default_log_dir(),
            websocket: WebSocketPolicy::default(),
        }
    }
}

impl AgentConfig {
    /// Loads the TOML file (if it exists), then applies environment overrides.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let path = Path::new(config_path.unwrap_or(DEFAULT_CONFIG_PATH));
        let file_config = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            info!(path = ?path, "Config file not found, using defaults.");
            PartialAgentConfig::default()
        };

        Self::merge(file_config, |key| env::var(key).ok())
    }

    fn merge(
        file: PartialAgentConfig,
        env_var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let listen_address = env_var("IPERF_RELAY_LISTEN")
            .or(file.listen_address)
            .unwrap_or_else(default_listen_address);
        let listen_address = listen_address.parse::<SocketAddr>().map_err(|e| {
            ConfigError::Invalid(format!("listen_address {listen_address:?}: {e}"))
        })?;

        let iperf3_path = env_var("IPERF_RELAY_IPERF3_PATH")
            .map(PathBuf::from)
            .or(file.iperf3_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_IPERF3_PATH));
        if iperf3_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("iperf3_path must not be empty".to_string()));
        }

        Ok(AgentConfig {
            listen_address,
            iperf3_path,
            log_dir: env_var("IPERF_RELAY_LOG_DIR")
                .or(file.log_dir)
                .unwrap_or_else(default_log_dir),
            websocket: file.websocket.unwrap_or_default(),
        })
    }
}
