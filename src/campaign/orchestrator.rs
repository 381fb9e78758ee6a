//! Campaign orchestrator
//!
//! [`Orchestrator::tick`] moves one campaign forward by a single poll step
//! under that campaign's exclusive lock. Ticks for different campaigns run
//! concurrently; operator calls (`cancel`, `reset_recovery_attempts`) take
//! the same lock so they never interleave with a tick.

use super::launcher::{next_range, Launcher};
use super::progress::{self, ProgressReport};
use super::recovery::RecoveryLog;
use super::{CampaignError, Result};
use crate::clock::SharedClock;
use crate::config::CampaignConfig;
use crate::consolidation::consolidate;
use crate::metrics::{Metrics, Timer};
use crate::monitor::{Assessment, RecoveryDecision, RunClass, RunPoller, StopDetector};
use crate::pagination::UrlPattern;
use crate::storage::{SharedStore, StoreError};
use crate::types::{
    Campaign, CampaignId, CampaignStatus, ConsolidatedDataset, Iteration, IterationId,
    IterationStatus, NewCampaign, RecoveryId, RecoveryReason, Row,
};
use crate::vendor::{payload, SharedVendor, VendorError};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Something that happened during a tick
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TickEvent {
    Launched {
        iteration: IterationId,
        number: u32,
        start_page: u32,
        end_page: u32,
    },
    LaunchFailed {
        iteration: IterationId,
        attempts: u32,
        error: String,
    },
    Polled {
        iteration: IterationId,
        class: RunClass,
        pages: u32,
    },
    IterationCompleted {
        iteration: IterationId,
        rows: u64,
        start_page: u32,
        end_page: u32,
    },
    IterationFailed {
        iteration: IterationId,
        reason: String,
    },
    RecoveryStarted {
        recovery: RecoveryId,
        reason: RecoveryReason,
        attempt: u32,
    },
    RecoverySettled {
        recovery: RecoveryId,
        new_records: u64,
        duplicates: u64,
    },
    AttentionRequired {
        attempts: u32,
    },
    PaginationExhausted {
        current_page_scraped: u32,
    },
    CampaignCompleted {
        total_records: u64,
        duplicates_removed: u64,
    },
}

/// Drives campaigns through their iterations
#[derive(Debug)]
pub struct Orchestrator {
    store: SharedStore,
    vendor: SharedVendor,
    clock: SharedClock,
    poller: RunPoller,
    launcher: Launcher,
    recoveries: RecoveryLog,
    settings: CampaignConfig,
    metrics: Arc<Metrics>,
    locks: DashMap<CampaignId, Arc<Mutex<()>>>,
}

impl Orchestrator {
    pub fn new(
        store: SharedStore,
        vendor: SharedVendor,
        clock: SharedClock,
        detector: StopDetector,
        settings: CampaignConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            poller: RunPoller::new(detector, clock.clone()),
            launcher: Launcher::new(store.clone(), vendor.clone(), clock.clone(), metrics.clone()),
            recoveries: RecoveryLog::new(store.clone(), clock.clone()),
            store,
            vendor,
            clock,
            settings,
            metrics,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    fn lock_for(&self, id: CampaignId) -> Arc<Mutex<()>> {
        self.locks.entry(id).or_default().clone()
    }

    /// Load a campaign or fail with [`CampaignError::NotFound`]
    pub fn campaign(&self, id: CampaignId) -> Result<Campaign> {
        self.store.get_campaign(id)?.ok_or(CampaignError::NotFound(id))
    }

    pub fn iterations(&self, id: CampaignId) -> Result<Vec<Iteration>> {
        self.campaign(id)?;
        Ok(self.store.list_iterations(id)?)
    }

    /// Register a new campaign.
    ///
    /// Without a seed URL the source's main site is used. A seed that cannot
    /// be paginated still creates the campaign, already `failed`, so the
    /// rejection is visible through the normal status surface.
    pub async fn create_campaign(&self, request: NewCampaign) -> Result<Campaign> {
        let source = request.source.trim().to_string();
        if source.is_empty() {
            return Err(CampaignError::InvalidRequest("source is required".to_string()));
        }
        let pages_per_iteration = request
            .pages_per_iteration
            .unwrap_or(self.settings.pages_per_iteration);
        if pages_per_iteration == 0 {
            return Err(CampaignError::InvalidRequest(
                "pages_per_iteration must be greater than 0".to_string(),
            ));
        }

        let mut name = request.name.trim().to_string();
        let mut seed_url = request.seed_url.trim().to_string();
        if seed_url.is_empty() || name.is_empty() {
            let info = self.vendor.source_info(&source).await?;
            if seed_url.is_empty() {
                seed_url = info.main_site.unwrap_or_default();
            }
            if name.is_empty() {
                name = info.title.unwrap_or_else(|| source.clone());
            }
        }
        if seed_url.is_empty() {
            return Err(CampaignError::InvalidRequest(format!(
                "no seed_url given and source {} has no main site",
                source
            )));
        }

        let now = self.clock.now();
        let mut campaign = Campaign {
            id: 0,
            source,
            name,
            seed_url,
            total_pages_target: request.total_pages_target,
            pages_per_iteration,
            current_iteration: 0,
            pages_completed: 0,
            current_page_scraped: 0,
            status: CampaignStatus::Pending,
            recovery_attempts: 0,
            needs_attention: false,
            last_error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let pattern = self.pattern_for(&campaign.source, &campaign.seed_url);
        if let Err(e) = &pattern {
            warn!("Campaign seed {} rejected: {}", campaign.seed_url, e);
            campaign.status = CampaignStatus::Failed;
            campaign.last_error = Some(e.to_string());
            campaign.completed_at = Some(now);
        }

        let campaign = self.store.create_campaign(campaign)?;
        self.metrics.campaigns_started.inc();
        match pattern {
            Ok(pattern) => info!(
                campaign = campaign.id,
                source = %campaign.source,
                pattern = %pattern.kind,
                "Created campaign '{}' (target {:?} pages, {} per iteration)",
                campaign.name,
                campaign.total_pages_target,
                campaign.pages_per_iteration
            ),
            Err(_) => self.metrics.campaigns_failed.inc(),
        }
        Ok(campaign)
    }

    /// Pagination pattern of a source, detected from `seed_url` when the
    /// stored one was learned from a different seed.
    fn pattern_for(&self, source: &str, seed_url: &str) -> Result<UrlPattern> {
        if let Some(pattern) = self.store.get_url_pattern(source)? {
            if pattern.original_url == seed_url {
                return Ok(pattern);
            }
        }
        let pattern = UrlPattern::detect(seed_url, self.settings.offset_page_size)?;
        self.store.put_url_pattern(source, &pattern)?;
        debug!("Detected {} pagination for {}", pattern.kind, source);
        Ok(pattern)
    }

    /// Advance one campaign by a single poll step
    pub async fn tick(&self, id: CampaignId) -> Result<Vec<TickEvent>> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let timer = Timer::start();
        let result = self.tick_locked(id).await;
        timer.record(&self.metrics.tick_latency);
        if let Err(e) = &result {
            self.metrics.tick_failures.inc();
            error!(campaign = id, "Tick failed: {}", e);
        }
        if self.is_settled(id) {
            self.release_lock(id, &lock);
        }
        result
    }

    /// Terminal with nothing left in flight
    fn is_settled(&self, id: CampaignId) -> bool {
        let Ok(Some(campaign)) = self.store.get_campaign(id) else {
            return false;
        };
        campaign.status.is_terminal()
            && self
                .store
                .list_iterations(id)
                .map(|its| its.iter().all(|it| it.status.is_terminal()))
                .unwrap_or(false)
    }

    /// Drop the lock entry of a settled campaign unless another caller is
    /// already waiting on it.
    fn release_lock(&self, id: CampaignId, held: &Arc<Mutex<()>>) {
        // One reference in the map, one held by the caller
        self.locks
            .remove_if(&id, |_, lock| Arc::ptr_eq(lock, held) && Arc::strong_count(lock) <= 2);
    }

    async fn tick_locked(&self, id: CampaignId) -> Result<Vec<TickEvent>> {
        let mut campaign = self.campaign(id)?;
        let mut events = Vec::new();

        let active = self
            .store
            .list_iterations(id)?
            .into_iter()
            .rev()
            .find(|it| !it.status.is_terminal());

        match active {
            Some(mut iteration) if iteration.status == IterationStatus::Pending => {
                if campaign.status.is_terminal() {
                    let reason = format!("campaign {}", campaign.status);
                    self.abandon(&mut iteration, reason, &mut events)?;
                } else {
                    let event = self.launcher.launch(&mut campaign, &mut iteration).await?;
                    events.push(event);
                }
            }
            Some(iteration) => self.poll_running(&mut campaign, iteration, &mut events).await?,
            None if campaign.status.is_terminal() => {}
            None => {
                self.advance(&mut campaign, &mut events).await?;
            }
        }
        Ok(events)
    }

    async fn poll_running(
        &self,
        campaign: &mut Campaign,
        mut iteration: Iteration,
        events: &mut Vec<TickEvent>,
    ) -> Result<()> {
        let observation = match self.poller.poll(self.vendor.as_ref(), &mut iteration).await {
            Ok(observation) => observation,
            Err(e) if e.is_transient() => {
                warn!(
                    campaign = campaign.id,
                    iteration = iteration.iteration_number,
                    "Status poll failed, will retry next cycle: {}",
                    e
                );
                return Ok(());
            }
            Err(e @ VendorError::Rejected { .. }) => {
                warn!(
                    campaign = campaign.id,
                    iteration = iteration.iteration_number,
                    "Vendor rejected status poll: {}",
                    e
                );
                iteration.last_error = Some(e.to_string());
                return self
                    .on_stopped(campaign, iteration, RecoveryReason::Errored, None, events)
                    .await;
            }
            Err(e) => return Err(e.into()),
        };

        iteration.pages_scraped = iteration.progress.pages;
        events.push(TickEvent::Polled {
            iteration: iteration.id,
            class: observation.class,
            pages: iteration.pages_scraped,
        });

        match (observation.class, observation.assessment) {
            (RunClass::Running, _) => {
                self.store.update_iteration(&iteration)?;
                Ok(())
            }
            (RunClass::Completed, _) => self.on_completed(campaign, iteration, events).await,
            (_, Assessment::NeedsRecovery(reason)) => {
                self.on_stopped(campaign, iteration, reason, None, events).await
            }
            (class, _) => {
                warn!("Unexpected assessment for {:?} run, treating as errored", class);
                self.on_stopped(campaign, iteration, RecoveryReason::Errored, None, events)
                    .await
            }
        }
    }

    /// Output of a run; purged output counts as empty
    async fn fetch_rows(&self, iteration: &Iteration) -> Result<Vec<Row>> {
        let Some(run_token) = iteration.run_token.as_deref() else {
            return Ok(Vec::new());
        };
        match self.vendor.fetch_output(run_token).await {
            Ok(rows) => Ok(rows),
            Err(VendorError::OutputGone(_)) => {
                warn!(
                    campaign = iteration.campaign_id,
                    iteration = iteration.iteration_number,
                    "Output of run {} is no longer available; recording zero rows",
                    run_token
                );
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn on_completed(
        &self,
        campaign: &mut Campaign,
        mut iteration: Iteration,
        events: &mut Vec<TickEvent>,
    ) -> Result<()> {
        let rows = self.fetch_rows(&iteration).await?;
        let planned = iteration.planned_pages();
        let pages = iteration.progress.pages;

        // A continuation that yields nothing means the listing has run out.
        // Without a target any empty continuation counts; with one, only a
        // run that reached no page at all.
        let exhausted = rows.is_empty()
            && iteration.iteration_number > 1
            && (pages == 0 || !matches!(campaign.total_pages_target, Some(t) if t > 0));

        if exhausted {
            iteration.last_error = Some(format!(
                "no rows from page {}; listing exhausted",
                iteration.start_page
            ));
            self.record(campaign, iteration, rows, 0, events)?;
            if campaign.status.is_terminal() {
                return Ok(());
            }
            info!(campaign = campaign.id, "Empty continuation; pagination exhausted");
            events.push(TickEvent::PaginationExhausted {
                current_page_scraped: campaign.current_page_scraped,
            });
            return self.finish(campaign, events);
        }

        if !campaign.status.is_terminal()
            && self
                .poller
                .detector()
                .is_low_yield(pages, rows.len() as u64, planned)
        {
            return self
                .on_stopped(campaign, iteration, RecoveryReason::LowYield, Some(rows), events)
                .await;
        }

        let covered = if pages == 0 { planned } else { pages.min(planned) };
        self.record(campaign, iteration, rows, covered, events)?;

        if campaign.status.is_terminal() {
            return Ok(());
        }
        self.advance(campaign, events).await?;
        Ok(())
    }

    /// Handle a run that stopped short: stuck, cancelled, errored or low yield
    async fn on_stopped(
        &self,
        campaign: &mut Campaign,
        mut iteration: Iteration,
        reason: RecoveryReason,
        rows: Option<Vec<Row>>,
        events: &mut Vec<TickEvent>,
    ) -> Result<()> {
        self.metrics.stalls_detected.inc();
        warn!(
            campaign = campaign.id,
            iteration = iteration.iteration_number,
            pages = iteration.progress.pages,
            %reason,
            "Run stopped early"
        );

        // Cancelled campaigns keep what the run produced but launch nothing
        if campaign.status.is_terminal() {
            if reason == RecoveryReason::Stuck {
                self.cancel_run(&iteration).await;
            }
            let rows = match rows {
                Some(rows) => rows,
                None => self.fetch_rows(&iteration).await?,
            };
            let covered = iteration.progress.pages.min(iteration.planned_pages());
            return self.record(campaign, iteration, rows, covered, events);
        }

        let attempt = match self.poller.detector().recovery_decision(campaign.recovery_attempts) {
            RecoveryDecision::Recover { attempt } => attempt,
            RecoveryDecision::Escalate => {
                self.store.update_iteration(&iteration)?;
                if !campaign.needs_attention {
                    campaign.needs_attention = true;
                    campaign.last_error = Some(format!(
                        "iteration {} {} after {} recovery attempts; operator attention required",
                        iteration.iteration_number, reason, campaign.recovery_attempts
                    ));
                    campaign.updated_at = self.clock.now();
                    self.store.update_campaign(campaign)?;
                    self.metrics.attention_required.inc();
                    error!(
                        campaign = campaign.id,
                        attempts = campaign.recovery_attempts,
                        "Recovery limit reached; campaign needs attention"
                    );
                    events.push(TickEvent::AttentionRequired {
                        attempts: campaign.recovery_attempts,
                    });
                }
                return Ok(());
            }
        };

        if reason == RecoveryReason::Stuck {
            self.cancel_run(&iteration).await;
        }
        let rows = match rows {
            Some(rows) => rows,
            None => self.fetch_rows(&iteration).await?,
        };
        let last_item = payload::last_item(&rows);

        // Counters only move once the partial output is safely recorded
        campaign.recovery_attempts = attempt;
        self.metrics.recoveries_started.inc();

        let covered = iteration.progress.pages.min(iteration.planned_pages());
        if iteration.last_error.is_none() {
            iteration.last_error = Some(format!("stopped early: {}", reason));
        }
        let stalled = iteration.clone();
        self.record(campaign, iteration, rows, covered, events)?;

        let mut op = self.recoveries.open(campaign, &stalled, reason, last_item)?;
        events.push(TickEvent::RecoveryStarted {
            recovery: op.id,
            reason,
            attempt,
        });

        match self.advance(campaign, events).await? {
            Some(continuation) => self.recoveries.attach(&mut op, continuation)?,
            None => self.recoveries.close_without_continuation(&mut op)?,
        }
        Ok(())
    }

    async fn cancel_run(&self, iteration: &Iteration) {
        if let Some(run_token) = iteration.run_token.as_deref() {
            if let Err(e) = self.vendor.cancel_run(run_token).await {
                warn!("Failed to cancel stuck run {}: {}", run_token, e);
            }
        }
    }

    /// Make `iteration` terminal with its output and move the campaign's
    /// page counters by the pages it covered.
    fn record(
        &self,
        campaign: &mut Campaign,
        mut iteration: Iteration,
        rows: Vec<Row>,
        covered: u32,
        events: &mut Vec<TickEvent>,
    ) -> Result<()> {
        let now = self.clock.now();
        iteration.row_count = rows.len() as u64;
        iteration.rows = rows;
        iteration.pages_scraped = iteration.progress.pages;
        iteration.completed_at = Some(now);

        if covered > 0 {
            iteration.end_page = iteration.start_page + covered - 1;
            iteration.status = IterationStatus::Completed;
            campaign.current_page_scraped = campaign.current_page_scraped.max(iteration.end_page);
            campaign.pages_completed += covered;
            self.metrics.iterations_completed.inc();
            self.metrics.records_collected.add(iteration.row_count);
            info!(
                campaign = campaign.id,
                iteration = iteration.iteration_number,
                rows = iteration.row_count,
                "Iteration completed pages {}-{}",
                iteration.start_page,
                iteration.end_page
            );
            events.push(TickEvent::IterationCompleted {
                iteration: iteration.id,
                rows: iteration.row_count,
                start_page: iteration.start_page,
                end_page: iteration.end_page,
            });
        } else {
            iteration.status = IterationStatus::Failed;
            self.metrics.iterations_failed.inc();
            events.push(TickEvent::IterationFailed {
                iteration: iteration.id,
                reason: iteration
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "no pages covered".to_string()),
            });
        }

        campaign.updated_at = now;
        self.store.update_iteration(&iteration)?;
        self.store.update_campaign(campaign)?;
        self.settle_recovery(&iteration, events)
    }

    fn abandon(&self, iteration: &mut Iteration, reason: String, events: &mut Vec<TickEvent>) -> Result<()> {
        iteration.status = IterationStatus::Failed;
        iteration.last_error = Some(reason.clone());
        iteration.completed_at = Some(self.clock.now());
        self.store.update_iteration(iteration)?;
        self.metrics.iterations_failed.inc();
        events.push(TickEvent::IterationFailed {
            iteration: iteration.id,
            reason,
        });
        self.settle_recovery(iteration, events)
    }

    fn settle_recovery(&self, iteration: &Iteration, events: &mut Vec<TickEvent>) -> Result<()> {
        if let Some((op, stats)) = self.recoveries.settle(iteration)? {
            events.push(TickEvent::RecoverySettled {
                recovery: op.id,
                new_records: stats.new_records,
                duplicates: stats.duplicates,
            });
        }
        Ok(())
    }

    /// Launch the next iteration, or finish the campaign when nothing is
    /// left. Returns the planned iteration's id.
    async fn advance(&self, campaign: &mut Campaign, events: &mut Vec<TickEvent>) -> Result<Option<IterationId>> {
        if progress::is_complete(campaign.total_pages_target, campaign.current_page_scraped) {
            self.finish(campaign, events)?;
            return Ok(None);
        }

        let pattern = self.pattern_for(&campaign.source, &campaign.seed_url)?;
        let (start_page, _) = next_range(campaign);
        let start_url = pattern.url_for_page(&campaign.seed_url, start_page)?;

        let mut iteration = self.launcher.plan(campaign, start_url)?;
        let event = self.launcher.launch(campaign, &mut iteration).await?;
        events.push(event);
        Ok(Some(iteration.id))
    }

    /// Consolidate and mark the campaign complete
    fn finish(&self, campaign: &mut Campaign, events: &mut Vec<TickEvent>) -> Result<()> {
        let now = self.clock.now();
        let iterations = self.store.list_iterations(campaign.id)?;
        let dataset = consolidate(campaign.id, &iterations, now);

        match self.store.put_dataset(&dataset) {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                debug!(campaign = campaign.id, "Dataset already stored");
            }
            Err(e) => return Err(e.into()),
        }

        progress::transition(campaign, CampaignStatus::Complete, now)?;
        self.store.update_campaign(campaign)?;

        self.metrics.campaigns_completed.inc();
        self.metrics.duplicates_removed.add(dataset.duplicates_removed);
        info!(
            campaign = campaign.id,
            records = dataset.total_records,
            duplicates = dataset.duplicates_removed,
            pages = campaign.current_page_scraped,
            "Campaign complete"
        );
        events.push(TickEvent::CampaignCompleted {
            total_records: dataset.total_records,
            duplicates_removed: dataset.duplicates_removed,
        });
        Ok(())
    }

    /// Stop launching new iterations.
    ///
    /// A run already in flight is still polled to the end and its output
    /// recorded. Cancelling twice is a no-op.
    pub async fn cancel(&self, id: CampaignId) -> Result<Campaign> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut campaign = self.campaign(id)?;
        if campaign.status == CampaignStatus::Cancelled {
            return Ok(campaign);
        }
        progress::transition(&mut campaign, CampaignStatus::Cancelled, self.clock.now())?;
        self.store.update_campaign(&campaign)?;

        let mut events = Vec::new();
        for mut iteration in self.store.list_iterations(id)? {
            if iteration.status == IterationStatus::Pending {
                self.abandon(&mut iteration, "campaign cancelled".to_string(), &mut events)?;
            }
        }

        self.metrics.campaigns_cancelled.inc();
        info!(campaign = id, "Campaign cancelled");
        if self.is_settled(id) {
            self.release_lock(id, &lock);
        }
        Ok(campaign)
    }

    /// Operator reset of the recovery budget
    pub async fn reset_recovery_attempts(&self, id: CampaignId) -> Result<Campaign> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut campaign = self.campaign(id)?;
        let previous = campaign.recovery_attempts;
        campaign.recovery_attempts = 0;
        campaign.needs_attention = false;
        campaign.updated_at = self.clock.now();
        self.store.update_campaign(&campaign)?;
        info!(campaign = id, previous, "Recovery attempts reset");
        Ok(campaign)
    }

    pub fn progress(&self, id: CampaignId) -> Result<ProgressReport> {
        let campaign = self.campaign(id)?;
        let iterations = self.store.list_iterations(id)?;
        Ok(ProgressReport::build(
            &campaign,
            &iterations,
            self.settings.estimate_multiplier,
        ))
    }

    /// Stored dataset, or a live merge of what has completed so far
    pub fn dataset(&self, id: CampaignId) -> Result<ConsolidatedDataset> {
        self.campaign(id)?;
        if let Some(dataset) = self.store.get_dataset(id)? {
            return Ok(dataset);
        }
        let iterations = self.store.list_iterations(id)?;
        Ok(consolidate(id, &iterations, self.clock.now()))
    }

    /// Campaigns the poll loop should tick
    pub fn active_campaigns(&self) -> Result<Vec<CampaignId>> {
        let active: Vec<CampaignId> = self
            .store
            .active_campaigns()?
            .into_iter()
            .map(|c| c.id)
            .collect();
        self.metrics.active_campaigns.set(active.len() as u64);
        Ok(active)
    }

    /// Prepare persisted campaigns after a restart.
    ///
    /// Running iterations get a fresh progress mark so downtime is not
    /// mistaken for a stalled run.
    pub fn resume(&self) -> Result<Vec<CampaignId>> {
        let now = self.clock.now();
        let ids = self.active_campaigns()?;
        let mut resumed = 0;
        for &id in &ids {
            for mut iteration in self.store.list_iterations(id)? {
                if iteration.status == IterationStatus::Running {
                    iteration.progress.changed_at = now;
                    self.store.update_iteration(&iteration)?;
                    resumed += 1;
                }
            }
        }
        info!("Resuming {} campaigns ({} runs in flight)", ids.len(), resumed);
        Ok(ids)
    }
}
