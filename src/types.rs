//! Core types for recrawl campaigns
//!
//! Campaigns, iterations (one vendor run each), recovery operations and the
//! consolidated dataset. Everything here is plain data: persisted through
//! [`crate::storage::Store`] and mutated only by the campaign orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Store-allocated campaign identifier
pub type CampaignId = u64;

/// Store-allocated iteration identifier
pub type IterationId = u64;

/// Store-allocated recovery operation identifier
pub type RecoveryId = u64;

/// Vendor project token identifying what is being scraped
pub type SourceToken = String;

/// Vendor run token identifying one run
pub type RunToken = String;

// ============================================================================
// Rows
// ============================================================================

/// One scraped record, normalized to string values with a stable key order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(pub BTreeMap<String, String>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from `(column, value)` pairs
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column).map(String::as_str)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Content hash over the normalized row.
    ///
    /// Values are trimmed and blank values are treated as absent, so a row
    /// that lacks a column hashes the same as one carrying an empty value for
    /// it. This matters once heterogeneous iterations are merged under a
    /// union schema.
    pub fn content_hash(&self) -> RowHash {
        let mut hasher = Sha256::new();
        for (column, value) in &self.0 {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            hasher.update((column.len() as u64).to_le_bytes());
            hasher.update(column.as_bytes());
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        }
        RowHash(hex::encode(hasher.finalize()))
    }
}

/// SHA-256 content hash of a normalized [`Row`] (64-character hex string)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowHash(pub String);

impl RowHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Campaign
// ============================================================================

/// Lifecycle of a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Pending,
    Running,
    Complete,
    Failed,
    Cancelled,
}

impl CampaignStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A multi-iteration scraping effort against one source with a page target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub source: SourceToken,
    pub name: String,
    pub seed_url: String,
    /// Page target; `None` means "run until pagination is exhausted"
    pub total_pages_target: Option<u32>,
    pub pages_per_iteration: u32,
    /// Number of the most recently planned iteration (0 before the first)
    pub current_iteration: u32,
    /// Pages actually scraped across completed iterations
    pub pages_completed: u32,
    /// Highest page number covered so far
    pub current_page_scraped: u32,
    pub status: CampaignStatus,
    /// Automatic recoveries performed; reset only by an operator
    pub recovery_attempts: u32,
    /// Set when the recovery cap was hit and a human has to look
    pub needs_attention: bool,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Parameters for a new campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCampaign {
    pub source: SourceToken,
    pub name: String,
    pub seed_url: String,
    pub total_pages_target: Option<u32>,
    pub pages_per_iteration: Option<u32>,
}

// ============================================================================
// Iteration
// ============================================================================

/// Lifecycle of one iteration (vendor run)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    /// Planned and persisted, vendor run not (yet) accepted
    Pending,
    Running,
    Completed,
    Failed,
}

impl IterationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for IterationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Last observed progress of a running iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressMark {
    pub pages: u32,
    pub records: u64,
    /// When `pages` or `records` last changed
    pub changed_at: DateTime<Utc>,
}

impl ProgressMark {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            pages: 0,
            records: 0,
            changed_at: at,
        }
    }

    /// Record an observation; returns true when the counts moved.
    pub fn observe(&mut self, pages: u32, records: u64, at: DateTime<Utc>) -> bool {
        if pages != self.pages || records != self.records {
            self.pages = pages;
            self.records = records;
            self.changed_at = at;
            true
        } else {
            false
        }
    }
}

/// One vendor run within a campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    pub id: IterationId,
    pub campaign_id: CampaignId,
    pub iteration_number: u32,
    pub start_page: u32,
    pub end_page: u32,
    pub start_url: String,
    pub run_token: Option<RunToken>,
    pub status: IterationStatus,
    pub rows: Vec<Row>,
    pub row_count: u64,
    pub pages_scraped: u32,
    pub launch_attempts: u32,
    pub progress: ProgressMark,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Iteration {
    /// Pages this iteration was planned to cover
    pub fn planned_pages(&self) -> u32 {
        self.end_page.saturating_sub(self.start_page) + 1
    }
}

// ============================================================================
// Recovery
// ============================================================================

/// Why an automatic recovery was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryReason {
    /// No progress within the idle window
    Stuck,
    /// The vendor reports the run as cancelled
    Cancelled,
    /// The run completed with suspiciously little output
    LowYield,
    /// The vendor reports the run as errored
    Errored,
}

impl fmt::Display for RecoveryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stuck => "stuck",
            Self::Cancelled => "cancelled",
            Self::LowYield => "low_yield",
            Self::Errored => "errored",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    InProgress,
    Completed,
    Failed,
}

/// Last product seen in a stalled run's output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastItem {
    pub url: Option<String>,
    pub name: Option<String>,
}

/// Audit record of one automatic recovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOperation {
    pub id: RecoveryId,
    pub campaign_id: CampaignId,
    pub stalled_iteration_id: IterationId,
    pub reason: RecoveryReason,
    pub last_item: Option<LastItem>,
    pub stopped_at: DateTime<Utc>,
    pub continuation_iteration_id: Option<IterationId>,
    pub status: RecoveryStatus,
    pub new_records: u64,
    pub duplicates_removed: u64,
    pub completed_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Consolidated dataset
// ============================================================================

/// De-duplicated union of all iterations of a campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedDataset {
    pub campaign_id: CampaignId,
    /// Union of all columns in first-seen order
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub total_records: u64,
    pub duplicates_removed: u64,
    pub total_pages: u32,
    pub iterations_merged: u32,
    pub created_at: DateTime<Utc>,
}
