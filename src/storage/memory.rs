//! In-memory store

use super::{Result, Store, StoreError};
use crate::pagination::UrlPattern;
use crate::types::{
    Campaign, CampaignId, ConsolidatedDataset, Iteration, IterationId, RecoveryId,
    RecoveryOperation,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Tables {
    campaigns: BTreeMap<CampaignId, Campaign>,
    iterations: BTreeMap<IterationId, Iteration>,
    recoveries: BTreeMap<RecoveryId, RecoveryOperation>,
    datasets: HashMap<CampaignId, ConsolidatedDataset>,
    patterns: HashMap<String, UrlPattern>,
}

/// Volatile store behind a single `RwLock`
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn create_campaign(&self, mut campaign: Campaign) -> Result<Campaign> {
        campaign.id = self.allocate_id();
        self.tables.write().campaigns.insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    fn get_campaign(&self, id: CampaignId) -> Result<Option<Campaign>> {
        Ok(self.tables.read().campaigns.get(&id).cloned())
    }

    fn update_campaign(&self, campaign: &Campaign) -> Result<()> {
        let mut tables = self.tables.write();
        match tables.campaigns.get_mut(&campaign.id) {
            Some(slot) => {
                *slot = campaign.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound { kind: "campaign", id: campaign.id }),
        }
    }

    fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        Ok(self.tables.read().campaigns.values().cloned().collect())
    }

    fn create_iteration(&self, mut iteration: Iteration) -> Result<Iteration> {
        iteration.id = self.allocate_id();
        self.tables.write().iterations.insert(iteration.id, iteration.clone());
        Ok(iteration)
    }

    fn get_iteration(&self, id: IterationId) -> Result<Option<Iteration>> {
        Ok(self.tables.read().iterations.get(&id).cloned())
    }

    fn update_iteration(&self, iteration: &Iteration) -> Result<()> {
        let mut tables = self.tables.write();
        match tables.iterations.get_mut(&iteration.id) {
            Some(slot) => {
                *slot = iteration.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound { kind: "iteration", id: iteration.id }),
        }
    }

    fn list_iterations(&self, campaign_id: CampaignId) -> Result<Vec<Iteration>> {
        let mut iterations: Vec<Iteration> = self
            .tables
            .read()
            .iterations
            .values()
            .filter(|it| it.campaign_id == campaign_id)
            .cloned()
            .collect();
        iterations.sort_by_key(|it| (it.iteration_number, it.id));
        Ok(iterations)
    }

    fn put_dataset(&self, dataset: &ConsolidatedDataset) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.datasets.contains_key(&dataset.campaign_id) {
            return Err(StoreError::Conflict(format!(
                "campaign {} already has a consolidated dataset",
                dataset.campaign_id
            )));
        }
        tables.datasets.insert(dataset.campaign_id, dataset.clone());
        Ok(())
    }

    fn get_dataset(&self, campaign_id: CampaignId) -> Result<Option<ConsolidatedDataset>> {
        Ok(self.tables.read().datasets.get(&campaign_id).cloned())
    }

    fn create_recovery(&self, mut op: RecoveryOperation) -> Result<RecoveryOperation> {
        op.id = self.allocate_id();
        self.tables.write().recoveries.insert(op.id, op.clone());
        Ok(op)
    }

    fn update_recovery(&self, op: &RecoveryOperation) -> Result<()> {
        let mut tables = self.tables.write();
        match tables.recoveries.get_mut(&op.id) {
            Some(slot) => {
                *slot = op.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound { kind: "recovery", id: op.id }),
        }
    }

    fn list_recoveries(&self, campaign_id: CampaignId) -> Result<Vec<RecoveryOperation>> {
        Ok(self
            .tables
            .read()
            .recoveries
            .values()
            .filter(|op| op.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    fn get_url_pattern(&self, source: &str) -> Result<Option<UrlPattern>> {
        Ok(self.tables.read().patterns.get(source).cloned())
    }

    fn put_url_pattern(&self, source: &str, pattern: &UrlPattern) -> Result<()> {
        self.tables.write().patterns.insert(source.to_string(), pattern.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fixtures;

    #[test]
    fn test_memory_store_contract() {
        let store = MemoryStore::new();
        fixtures::exercise_store(&store);
    }
}
