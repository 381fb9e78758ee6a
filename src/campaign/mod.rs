//! Campaign lifecycle
//!
//! A campaign scrapes a paginated listing in fixed-size iterations, one
//! vendor run at a time. [`Orchestrator::tick`] advances a single campaign by
//! one poll step: launch, poll, recover, consolidate.

mod launcher;
mod orchestrator;
pub mod progress;
mod recovery;

pub use launcher::next_range;
pub use orchestrator::{Orchestrator, TickEvent};
pub use progress::ProgressReport;

use crate::pagination::PaginationError;
use crate::storage::StoreError;
use crate::types::{CampaignId, CampaignStatus};
use crate::vendor::VendorError;
use thiserror::Error;

/// Errors from campaign operations
#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("campaign {0} not found")]
    NotFound(CampaignId),

    #[error("campaign {campaign} cannot move from {from} to {to}")]
    InvalidTransition {
        campaign: CampaignId,
        from: CampaignStatus,
        to: CampaignStatus,
    },

    #[error("campaign {campaign} still has iteration {iteration} in flight")]
    IterationInFlight { campaign: CampaignId, iteration: u32 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Pagination(#[from] PaginationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("vendor error: {0}")]
    Vendor(#[from] VendorError),
}

pub type Result<T> = std::result::Result<T, CampaignError>;
