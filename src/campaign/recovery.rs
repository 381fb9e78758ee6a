//! Recovery operation bookkeeping

use super::Result;
use crate::clock::SharedClock;
use crate::consolidation::{merge_increment, IncrementStats};
use crate::storage::SharedStore;
use crate::types::{
    Campaign, Iteration, IterationId, IterationStatus, LastItem, RecoveryOperation, RecoveryReason,
    RecoveryStatus,
};
use tracing::info;

/// Audit log of automatic recoveries.
///
/// An operation is opened when a stalled iteration is cut short, linked to
/// the continuation iteration once that is planned, and settled when the
/// continuation reaches a terminal state.
#[derive(Debug, Clone)]
pub(crate) struct RecoveryLog {
    store: SharedStore,
    clock: SharedClock,
}

impl RecoveryLog {
    pub fn new(store: SharedStore, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    pub fn open(
        &self,
        campaign: &Campaign,
        stalled: &Iteration,
        reason: RecoveryReason,
        last_item: Option<LastItem>,
    ) -> Result<RecoveryOperation> {
        let op = self.store.create_recovery(RecoveryOperation {
            id: 0,
            campaign_id: campaign.id,
            stalled_iteration_id: stalled.id,
            reason,
            last_item,
            stopped_at: self.clock.now(),
            continuation_iteration_id: None,
            status: RecoveryStatus::InProgress,
            new_records: 0,
            duplicates_removed: 0,
            completed_at: None,
        })?;
        info!(
            campaign = campaign.id,
            recovery = op.id,
            stalled = stalled.iteration_number,
            %reason,
            "Recovery opened"
        );
        Ok(op)
    }

    pub fn attach(&self, op: &mut RecoveryOperation, continuation: IterationId) -> Result<()> {
        op.continuation_iteration_id = Some(continuation);
        self.store.update_recovery(op)?;
        Ok(())
    }

    /// Close an operation that needs no continuation (the campaign finished)
    pub fn close_without_continuation(&self, op: &mut RecoveryOperation) -> Result<()> {
        op.status = RecoveryStatus::Completed;
        op.completed_at = Some(self.clock.now());
        self.store.update_recovery(op)?;
        Ok(())
    }

    /// Settle the open operation whose continuation is `iteration`, if any.
    ///
    /// A completed continuation closes it with the rows it added over every
    /// earlier iteration; a failed one marks it failed.
    pub fn settle(&self, iteration: &Iteration) -> Result<Option<(RecoveryOperation, IncrementStats)>> {
        let ops = self.store.list_recoveries(iteration.campaign_id)?;
        let Some(mut op) = ops.into_iter().find(|op| {
            op.status == RecoveryStatus::InProgress && op.continuation_iteration_id == Some(iteration.id)
        }) else {
            return Ok(None);
        };

        let prior: Vec<Iteration> = self
            .store
            .list_iterations(iteration.campaign_id)?
            .into_iter()
            .filter(|it| it.iteration_number < iteration.iteration_number && it.status == IterationStatus::Completed)
            .collect();

        let stats = match iteration.status {
            IterationStatus::Completed => merge_increment(&prior, &iteration.rows),
            _ => merge_increment(&prior, &[]),
        };
        op.status = match iteration.status {
            IterationStatus::Completed => RecoveryStatus::Completed,
            _ => RecoveryStatus::Failed,
        };
        op.new_records = stats.new_records;
        op.duplicates_removed = stats.duplicates;
        op.completed_at = Some(self.clock.now());
        self.store.update_recovery(&op)?;

        info!(
            campaign = iteration.campaign_id,
            recovery = op.id,
            new_records = stats.new_records,
            duplicates = stats.duplicates,
            "Recovery {}",
            if op.status == RecoveryStatus::Completed { "completed" } else { "failed" }
        );
        Ok(Some((op, stats)))
    }
}
