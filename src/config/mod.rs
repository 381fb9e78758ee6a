//! Configuration for recrawl

mod campaign;
mod daemon;
mod logging;
mod monitor;
mod storage;
mod vendor;

pub use campaign::CampaignConfig;
pub use daemon::{DaemonConfig, HttpConfig};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use monitor::MonitorConfig;
pub use storage::{StorageBackend, StorageConfig};
pub use vendor::{VendorConfig, API_KEY_ENV};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "recrawl.toml";

/// Longest accepted stall window
pub const MAX_IDLE_THRESHOLD_SECS: u64 = 7 * 24 * 3600;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub vendor: VendorConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub campaign: CampaignConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file, then fill the vendor API key
    /// from the environment and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.vendor.resolve_api_key();
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let mut config = Config::default();
            config.vendor.resolve_api_key();
            config.validate()?;
            Ok(config)
        }
    }

    /// Validate all configuration fields, reporting every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Vendor
        if url::Url::parse(&self.vendor.base_url).is_err() {
            errors.push(format!("vendor base_url is not a valid URL: '{}'", self.vendor.base_url));
        }
        if self.vendor.timeout_secs == 0 {
            errors.push("vendor timeout_secs must be positive".to_string());
        }
        if self.vendor.max_attempts == 0 {
            errors.push("vendor max_attempts must be at least 1".to_string());
        }
        if self.vendor.max_attempts > 10 {
            errors.push("vendor max_attempts must be <= 10".to_string());
        }
        if self.vendor.retry_base_delay_ms > self.vendor.retry_max_delay_ms {
            errors.push("vendor retry_base_delay_ms must not exceed retry_max_delay_ms".to_string());
        }
        if self.vendor.cache_capacity == 0 {
            errors.push("vendor cache_capacity must be positive".to_string());
        }

        // Monitor
        if self.monitor.poll_interval_secs == 0 {
            errors.push("monitor poll_interval_secs must be positive".to_string());
        }
        if self.monitor.idle_threshold_secs == 0 {
            errors.push("monitor idle_threshold_secs must be positive".to_string());
        }
        if self.monitor.idle_threshold_secs > MAX_IDLE_THRESHOLD_SECS {
            errors.push(format!(
                "monitor idle_threshold_secs must be <= {} (one week)",
                MAX_IDLE_THRESHOLD_SECS
            ));
        }
        if self.monitor.max_concurrent_ticks == 0 {
            errors.push("monitor max_concurrent_ticks must be positive".to_string());
        }

        // Campaign
        if self.campaign.pages_per_iteration == 0 {
            errors.push("campaign pages_per_iteration must be positive".to_string());
        }
        if self.campaign.offset_page_size == 0 {
            errors.push("campaign offset_page_size must be positive".to_string());
        }
        if !self.campaign.estimate_multiplier.is_finite() || self.campaign.estimate_multiplier < 0.0 {
            errors.push("campaign estimate_multiplier must be a non-negative number".to_string());
        }

        // HTTP
        if self.http.enabled && !self.http.listen_addr.is_empty() {
            if let Some(port_str) = self.http.listen_addr.rsplit(':').next() {
                if let Ok(port) = port_str.parse::<u32>() {
                    if port == 0 || port > 65535 {
                        errors.push(format!(
                            "HTTP listen port must be between 1 and 65535, got {}",
                            port
                        ));
                    }
                }
            }
        }

        // Daemon
        if self.daemon.data_dir.as_os_str().is_empty() {
            errors.push("data_dir must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    // ========================================================================
    // Helper: build a valid default config for mutation-based testing
    // ========================================================================

    fn valid_config() -> Config {
        Config::default()
    }

    #[test]
    fn default_config_passes_validation() {
        assert!(valid_config().validate().is_ok(), "default config should be valid");
    }

    // ========================================================================
    // Config::validate – vendor
    // ========================================================================

    #[test]
    fn validate_rejects_bad_base_url() {
        let mut cfg = valid_config();
        cfg.vendor.base_url = "not a url".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(
            err.to_string().contains("vendor base_url is not a valid URL"),
            "unexpected error message: {}",
            err
        );
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut cfg = valid_config();
        cfg.vendor.timeout_secs = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("vendor timeout_secs must be positive"));
    }

    #[test]
    fn validate_rejects_unbounded_retries() {
        let mut cfg = valid_config();
        cfg.vendor.max_attempts = 0;
        assert!(cfg.validate().unwrap_err().to_string().contains("at least 1"));

        cfg.vendor.max_attempts = 50;
        assert!(cfg.validate().unwrap_err().to_string().contains("must be <= 10"));
    }

    #[test]
    fn validate_rejects_inverted_retry_delays() {
        let mut cfg = valid_config();
        cfg.vendor.retry_base_delay_ms = 10_000;
        cfg.vendor.retry_max_delay_ms = 1_000;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("retry_base_delay_ms must not exceed"));
    }

    // ========================================================================
    // Config::validate – monitor and campaign
    // ========================================================================

    #[test]
    fn validate_rejects_zero_poll_interval() {
        let mut cfg = valid_config();
        cfg.monitor.poll_interval_secs = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("poll_interval_secs must be positive"));
    }

    #[test]
    fn validate_rejects_zero_pages_per_iteration() {
        let mut cfg = valid_config();
        cfg.campaign.pages_per_iteration = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("pages_per_iteration must be positive"));
    }

    #[test]
    fn validate_rejects_negative_multiplier() {
        let mut cfg = valid_config();
        cfg.campaign.estimate_multiplier = -1.0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("estimate_multiplier"));
    }

    // ========================================================================
    // Config::validate – HTTP port and data_dir
    // ========================================================================

    #[test]
    fn validate_rejects_http_port_zero() {
        let mut cfg = valid_config();
        cfg.http.enabled = true;
        cfg.http.listen_addr = "0.0.0.0:0".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("HTTP listen port must be between 1 and 65535"));
    }

    #[test]
    fn validate_skips_http_port_check_when_disabled() {
        let mut cfg = valid_config();
        cfg.http.enabled = false;
        cfg.http.listen_addr = "0.0.0.0:0".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_data_dir() {
        let mut cfg = valid_config();
        cfg.daemon.data_dir = PathBuf::from("");
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("data_dir must not be empty"));
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut cfg = valid_config();
        cfg.vendor.timeout_secs = 0;
        cfg.monitor.idle_threshold_secs = 0;
        cfg.campaign.offset_page_size = 0;
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("vendor timeout_secs must be positive"));
        assert!(msg.contains("idle_threshold_secs must be positive"));
        assert!(msg.contains("offset_page_size must be positive"));
    }

    #[test]
    fn validate_rejects_unbounded_idle_threshold() {
        let mut cfg = valid_config();
        cfg.monitor.idle_threshold_secs = u64::MAX;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("idle_threshold_secs must be <="));

        cfg.monitor.idle_threshold_secs = MAX_IDLE_THRESHOLD_SECS;
        assert!(cfg.validate().is_ok());
    }

    // ========================================================================
    // Defaults and loading
    // ========================================================================

    #[test]
    fn default_policy_values() {
        let cfg = valid_config();
        assert_eq!(cfg.vendor.timeout_secs, 10);
        assert_eq!(cfg.vendor.cache_ttl_secs, 300);
        assert_eq!(cfg.monitor.poll_interval_secs, 60);
        assert_eq!(cfg.monitor.idle_threshold_secs, 300);
        assert_eq!(cfg.monitor.max_recovery_attempts, 3);
        assert_eq!(cfg.monitor.min_pages_floor, 5);
        assert_eq!(cfg.monitor.min_records_floor, 20);
        assert_eq!(cfg.campaign.pages_per_iteration, 5);
        assert_eq!(cfg.campaign.offset_page_size, 20);
        assert_eq!(cfg.storage.backend, StorageBackend::Sled);
    }

    #[test]
    fn load_partial_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("recrawl.toml");
        std::fs::write(
            &path,
            r#"
[vendor]
api_key = "file-key"

[monitor]
idle_threshold_secs = 120

[storage]
backend = "memory"
"#,
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.vendor.api_key.as_deref(), Some("file-key"));
        assert_eq!(cfg.vendor.timeout_secs, 10);
        assert_eq!(cfg.monitor.idle_threshold_secs, 120);
        assert_eq!(cfg.monitor.poll_interval_secs, 60);
        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.toml");
        std::fs::write(&path, "[monitor\npoll_interval_secs = ").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn storage_path_defaults_under_data_dir() {
        let cfg = StorageConfig::default();
        let dir = PathBuf::from("/var/lib/recrawl");
        assert_eq!(cfg.resolve_path(&dir), dir.join("campaigns.sled"));
    }
}
