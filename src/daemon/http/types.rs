//! HTTP API Request/Response Types
//!
//! JSON-serializable types for the control API.

use serde::{Deserialize, Serialize};

use crate::campaign::ProgressReport;
use crate::types::{Campaign, CampaignId, Iteration, IterationId, IterationStatus, NewCampaign};

/// Create-campaign request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaignRequest {
    /// Vendor project token
    pub source: String,
    /// Display name (defaults to the vendor project title)
    #[serde(default)]
    pub name: String,
    /// First listing page (defaults to the project's main site)
    #[serde(default)]
    pub seed_url: String,
    /// Page target; omit to run until pagination is exhausted
    #[serde(default)]
    pub total_pages_target: Option<u32>,
    /// Pages per vendor run (defaults to `campaign.pages_per_iteration`)
    #[serde(default)]
    pub pages_per_iteration: Option<u32>,
}

impl From<CreateCampaignRequest> for NewCampaign {
    fn from(req: CreateCampaignRequest) -> Self {
        Self {
            source: req.source,
            name: req.name,
            seed_url: req.seed_url,
            total_pages_target: req.total_pages_target,
            pages_per_iteration: req.pages_per_iteration,
        }
    }
}

/// Campaign with its derived progress
#[derive(Debug, Clone, Serialize)]
pub struct CampaignDetail {
    pub campaign: Campaign,
    pub progress: ProgressReport,
}

/// Iteration without its rows
#[derive(Debug, Clone, Serialize)]
pub struct IterationSummary {
    pub id: IterationId,
    pub campaign_id: CampaignId,
    pub iteration_number: u32,
    pub start_page: u32,
    pub end_page: u32,
    pub start_url: String,
    pub run_token: Option<String>,
    pub status: IterationStatus,
    pub row_count: u64,
    pub pages_scraped: u32,
    pub launch_attempts: u32,
    pub last_error: Option<String>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&Iteration> for IterationSummary {
    fn from(it: &Iteration) -> Self {
        Self {
            id: it.id,
            campaign_id: it.campaign_id,
            iteration_number: it.iteration_number,
            start_page: it.start_page,
            end_page: it.end_page,
            start_url: it.start_url.clone(),
            run_token: it.run_token.clone(),
            status: it.status,
            row_count: it.row_count,
            pages_scraped: it.pages_scraped,
            launch_attempts: it.launch_attempts,
            last_error: it.last_error.clone(),
            started_at: it.started_at,
            completed_at: it.completed_at,
        }
    }
}

/// Query string of the dataset endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetQuery {
    /// "json" (default) or "csv"
    pub format: Option<String>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Whether the service is healthy
    pub healthy: bool,
    /// Service version
    pub version: String,
    /// Seconds since the API started
    pub uptime_seconds: u64,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn unauthorized() -> Self {
        Self::new("UNAUTHORIZED", "Invalid or missing API key")
    }
}
