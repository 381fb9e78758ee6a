//! Storage backend configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which store implementation backs the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Volatile, for dry runs and tests
    Memory,
    /// Embedded sled database under the data directory
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database path; defaults to `<data_dir>/campaigns.sled`
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolve_path(&self, data_dir: &Path) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| data_dir.join("campaigns.sled"))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sled,
            path: None,
        }
    }
}
