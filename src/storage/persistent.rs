//! Sled-backed store
//!
//! One tree per entity kind. Iterations and recoveries are keyed by
//! `campaign_id ++ id` (big-endian) so a campaign's records are a prefix
//! scan; a side tree maps the bare id back to its campaign.

use super::{Result, Store, StoreError};
use crate::pagination::UrlPattern;
use crate::types::{
    Campaign, CampaignId, ConsolidatedDataset, Iteration, IterationId, RecoveryOperation,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

const CAMPAIGNS: &str = "campaigns";
const ITERATIONS: &str = "iterations";
const ITERATION_OWNERS: &str = "iteration_owners";
const RECOVERIES: &str = "recoveries";
const RECOVERY_OWNERS: &str = "recovery_owners";
const DATASETS: &str = "datasets";
const URL_PATTERNS: &str = "url_patterns";

/// Persistent store on an embedded sled database
#[derive(Debug, Clone)]
pub struct SledStore {
    db: sled::Db,
    campaigns: sled::Tree,
    iterations: sled::Tree,
    iteration_owners: sled::Tree,
    recoveries: sled::Tree,
    recovery_owners: sled::Tree,
    datasets: sled::Tree,
    url_patterns: sled::Tree,
}

impl SledStore {
    /// Open or create the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Opening campaign database at {}", path.display());
        let db = sled::open(path)?;
        Ok(Self {
            campaigns: db.open_tree(CAMPAIGNS)?,
            iterations: db.open_tree(ITERATIONS)?,
            iteration_owners: db.open_tree(ITERATION_OWNERS)?,
            recoveries: db.open_tree(RECOVERIES)?,
            recovery_owners: db.open_tree(RECOVERY_OWNERS)?,
            datasets: db.open_tree(DATASETS)?,
            url_patterns: db.open_tree(URL_PATTERNS)?,
            db,
        })
    }

    fn allocate_id(&self) -> Result<u64> {
        // sled ids start at 0; keep 0 free as "unassigned"
        Ok(self.db.generate_id()? + 1)
    }

    fn owned_key(owner: u64, id: u64) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&owner.to_be_bytes());
        key[8..].copy_from_slice(&id.to_be_bytes());
        key
    }

    fn owner_of(tree: &sled::Tree, id: u64) -> Result<Option<u64>> {
        Ok(tree.get(id.to_be_bytes())?.and_then(|v| {
            let bytes: [u8; 8] = v.as_ref().try_into().ok()?;
            Some(u64::from_be_bytes(bytes))
        }))
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

impl Store for SledStore {
    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn create_campaign(&self, mut campaign: Campaign) -> Result<Campaign> {
        campaign.id = self.allocate_id()?;
        self.campaigns.insert(campaign.id.to_be_bytes(), encode(&campaign)?)?;
        Ok(campaign)
    }

    fn get_campaign(&self, id: CampaignId) -> Result<Option<Campaign>> {
        self.campaigns
            .get(id.to_be_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn update_campaign(&self, campaign: &Campaign) -> Result<()> {
        let key = campaign.id.to_be_bytes();
        if !self.campaigns.contains_key(key)? {
            return Err(StoreError::NotFound { kind: "campaign", id: campaign.id });
        }
        self.campaigns.insert(key, encode(campaign)?)?;
        Ok(())
    }

    fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        self.campaigns
            .iter()
            .values()
            .map(|bytes| decode(&bytes?))
            .collect()
    }

    fn create_iteration(&self, mut iteration: Iteration) -> Result<Iteration> {
        iteration.id = self.allocate_id()?;
        let key = Self::owned_key(iteration.campaign_id, iteration.id);
        self.iterations.insert(key, encode(&iteration)?)?;
        self.iteration_owners
            .insert(iteration.id.to_be_bytes(), iteration.campaign_id.to_be_bytes().to_vec())?;
        Ok(iteration)
    }

    fn get_iteration(&self, id: IterationId) -> Result<Option<Iteration>> {
        let Some(owner) = Self::owner_of(&self.iteration_owners, id)? else {
            return Ok(None);
        };
        self.iterations
            .get(Self::owned_key(owner, id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn update_iteration(&self, iteration: &Iteration) -> Result<()> {
        match Self::owner_of(&self.iteration_owners, iteration.id)? {
            Some(owner) if owner == iteration.campaign_id => {
                self.iterations
                    .insert(Self::owned_key(owner, iteration.id), encode(iteration)?)?;
                Ok(())
            }
            Some(owner) => Err(StoreError::Conflict(format!(
                "iteration {} belongs to campaign {}, not {}",
                iteration.id, owner, iteration.campaign_id
            ))),
            None => Err(StoreError::NotFound { kind: "iteration", id: iteration.id }),
        }
    }

    fn list_iterations(&self, campaign_id: CampaignId) -> Result<Vec<Iteration>> {
        let mut iterations = self
            .iterations
            .scan_prefix(campaign_id.to_be_bytes())
            .values()
            .map(|bytes| decode::<Iteration>(&bytes?))
            .collect::<Result<Vec<_>>>()?;
        iterations.sort_by_key(|it| (it.iteration_number, it.id));
        Ok(iterations)
    }

    fn put_dataset(&self, dataset: &ConsolidatedDataset) -> Result<()> {
        let swapped = self.datasets.compare_and_swap(
            dataset.campaign_id.to_be_bytes(),
            None as Option<&[u8]>,
            Some(encode(dataset)?),
        )?;
        swapped.map_err(|_| {
            StoreError::Conflict(format!(
                "campaign {} already has a consolidated dataset",
                dataset.campaign_id
            ))
        })
    }

    fn get_dataset(&self, campaign_id: CampaignId) -> Result<Option<ConsolidatedDataset>> {
        self.datasets
            .get(campaign_id.to_be_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn create_recovery(&self, mut op: RecoveryOperation) -> Result<RecoveryOperation> {
        op.id = self.allocate_id()?;
        self.recoveries
            .insert(Self::owned_key(op.campaign_id, op.id), encode(&op)?)?;
        self.recovery_owners
            .insert(op.id.to_be_bytes(), op.campaign_id.to_be_bytes().to_vec())?;
        Ok(op)
    }

    fn update_recovery(&self, op: &RecoveryOperation) -> Result<()> {
        match Self::owner_of(&self.recovery_owners, op.id)? {
            Some(owner) if owner == op.campaign_id => {
                self.recoveries.insert(Self::owned_key(owner, op.id), encode(op)?)?;
                Ok(())
            }
            _ => Err(StoreError::NotFound { kind: "recovery", id: op.id }),
        }
    }

    fn list_recoveries(&self, campaign_id: CampaignId) -> Result<Vec<RecoveryOperation>> {
        self.recoveries
            .scan_prefix(campaign_id.to_be_bytes())
            .values()
            .map(|bytes| decode(&bytes?))
            .collect()
    }

    fn get_url_pattern(&self, source: &str) -> Result<Option<UrlPattern>> {
        self.url_patterns
            .get(source.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn put_url_pattern(&self, source: &str, pattern: &UrlPattern) -> Result<()> {
        self.url_patterns.insert(source.as_bytes(), encode(pattern)?)?;
        Ok(())
    }
}
