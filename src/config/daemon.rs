//! Daemon and HTTP control API configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Directory for the PID file and the sled database
    pub data_dir: PathBuf,
    /// Resume in-flight iterations found in the store at startup
    pub resume_on_start: bool,
    /// Seconds to wait for tasks to drain on shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: directories::ProjectDirs::from("", "", "recrawl")
                .map(|d| d.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".recrawl")),
            resume_on_start: true,
            shutdown_timeout_secs: 5,
        }
    }
}

/// HTTP control API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Enable the HTTP control API
    pub enabled: bool,
    /// Listen address (e.g. "0.0.0.0:8080")
    pub listen_addr: String,
    /// Bearer tokens accepted by the API (empty = no auth required)
    pub api_keys: Vec<String>,
    /// Enable permissive CORS
    pub cors_enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1:5000".to_string(),
            api_keys: Vec::new(),
            cors_enabled: false,
        }
    }
}
