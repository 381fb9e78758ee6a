//! Campaign planning configuration

use serde::{Deserialize, Serialize};

/// Defaults applied to new campaigns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// Pages per iteration when a campaign does not specify one
    pub pages_per_iteration: u32,
    /// Items per page assumed for `offset=` pagination
    pub offset_page_size: u32,
    /// Display-only multiplier for the estimated item total
    pub estimate_multiplier: f64,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            pages_per_iteration: 5,
            offset_page_size: 20,
            estimate_multiplier: 1.5,
        }
    }
}
