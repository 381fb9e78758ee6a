//! Scraping vendor API configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable consulted when `api_key` is not set in the file
pub const API_KEY_ENV: &str = "PARSEHUB_API_KEY";

/// Vendor REST API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorConfig {
    /// Base URL of the vendor REST API
    pub base_url: String,
    /// API key sent with every request
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Attempts per call for transient failures (1 = no retry)
    pub max_attempts: u32,
    /// First retry delay in milliseconds; doubles per attempt
    pub retry_base_delay_ms: u64,
    /// Upper bound for a single retry delay in milliseconds
    pub retry_max_delay_ms: u64,
    /// How long source lookups are cached, in seconds
    pub cache_ttl_secs: u64,
    /// Maximum cached source lookups
    pub cache_capacity: usize,
}

impl VendorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Fill `api_key` from the environment when the file leaves it unset
    pub fn resolve_api_key(&mut self) {
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            if let Ok(key) = std::env::var(API_KEY_ENV) {
                if !key.is_empty() {
                    self.api_key = Some(key);
                }
            }
        }
    }
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.parsehub.com/api/v2".to_string(),
            api_key: None,
            timeout_secs: 10,
            max_attempts: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8_000,
            cache_ttl_secs: 300,
            cache_capacity: 256,
        }
    }
}
