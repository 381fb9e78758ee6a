//! Campaign persistence
//!
//! The orchestrator only sees the [`Store`] trait. Two implementations ship:
//! [`MemoryStore`] for tests and dry runs, and [`SledStore`], an embedded
//! database with one tree per entity kind and bincode-encoded values.

mod memory;
mod persistent;

pub use memory::MemoryStore;
pub use persistent::SledStore;

use crate::pagination::UrlPattern;
use crate::types::{
    Campaign, CampaignId, ConsolidatedDataset, Iteration, IterationId, RecoveryOperation,
};
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// Errors from the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u64 },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Backend(#[from] sled::Error),

    #[error("encoding error: {0}")]
    Codec(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistence port for campaigns and everything hanging off them.
///
/// `create_*` methods ignore the `id` of their argument and return the
/// stored record with a freshly allocated id. `update_*` methods fail with
/// [`StoreError::NotFound`] for unknown ids.
pub trait Store: Send + Sync + Debug {
    fn create_campaign(&self, campaign: Campaign) -> Result<Campaign>;
    fn get_campaign(&self, id: CampaignId) -> Result<Option<Campaign>>;
    fn update_campaign(&self, campaign: &Campaign) -> Result<()>;
    fn list_campaigns(&self) -> Result<Vec<Campaign>>;

    fn create_iteration(&self, iteration: Iteration) -> Result<Iteration>;
    fn get_iteration(&self, id: IterationId) -> Result<Option<Iteration>>;
    fn update_iteration(&self, iteration: &Iteration) -> Result<()>;
    /// Iterations of a campaign ordered by `iteration_number`
    fn list_iterations(&self, campaign_id: CampaignId) -> Result<Vec<Iteration>>;

    /// Store the final dataset; a campaign has at most one and it is never replaced.
    fn put_dataset(&self, dataset: &ConsolidatedDataset) -> Result<()>;
    fn get_dataset(&self, campaign_id: CampaignId) -> Result<Option<ConsolidatedDataset>>;

    fn create_recovery(&self, op: RecoveryOperation) -> Result<RecoveryOperation>;
    fn update_recovery(&self, op: &RecoveryOperation) -> Result<()>;
    /// Recovery operations of a campaign ordered by id
    fn list_recoveries(&self, campaign_id: CampaignId) -> Result<Vec<RecoveryOperation>>;

    fn get_url_pattern(&self, source: &str) -> Result<Option<UrlPattern>>;
    fn put_url_pattern(&self, source: &str, pattern: &UrlPattern) -> Result<()>;

    /// Make buffered writes durable
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Campaigns that still need polling (not terminal, or with an
    /// iteration still in flight).
    fn active_campaigns(&self) -> Result<Vec<Campaign>> {
        let mut active = Vec::new();
        for campaign in self.list_campaigns()? {
            if !campaign.status.is_terminal() {
                active.push(campaign);
                continue;
            }
            let in_flight = self
                .list_iterations(campaign.id)?
                .iter()
                .any(|it| it.status == crate::types::IterationStatus::Running);
            if in_flight {
                active.push(campaign);
            }
        }
        Ok(active)
    }
}

pub type SharedStore = Arc<dyn Store>;
