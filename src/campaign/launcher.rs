//! Continuation launcher: plans the next iteration and starts its run

use super::orchestrator::TickEvent;
use super::{progress, CampaignError, Result};
use crate::clock::SharedClock;
use crate::metrics::Metrics;
use crate::storage::SharedStore;
use crate::types::{Campaign, CampaignStatus, Iteration, IterationStatus, ProgressMark};
use crate::vendor::SharedVendor;
use std::sync::Arc;
use tracing::{info, warn};

/// Page range of the campaign's next iteration.
///
/// Starts right after the last scraped page and spans `pages_per_iteration`
/// pages, clipped to a positive target.
pub fn next_range(campaign: &Campaign) -> (u32, u32) {
    let start = campaign.current_page_scraped + 1;
    let span = campaign.pages_per_iteration.max(1);
    let end = start + span - 1;
    match campaign.total_pages_target {
        Some(target) if target >= start => (start, end.min(target)),
        _ => (start, end),
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Launcher {
    store: SharedStore,
    vendor: SharedVendor,
    clock: SharedClock,
    metrics: Arc<Metrics>,
}

impl Launcher {
    pub fn new(store: SharedStore, vendor: SharedVendor, clock: SharedClock, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            vendor,
            clock,
            metrics,
        }
    }

    /// Persist the next iteration as `pending` before anything is sent to
    /// the vendor, so a crash between planning and launching is retried
    /// with the same range and URL.
    pub fn plan(&self, campaign: &mut Campaign, start_url: String) -> Result<Iteration> {
        let iterations = self.store.list_iterations(campaign.id)?;
        if let Some(active) = iterations.iter().find(|it| !it.status.is_terminal()) {
            return Err(CampaignError::IterationInFlight {
                campaign: campaign.id,
                iteration: active.iteration_number,
            });
        }

        let now = self.clock.now();
        progress::transition(campaign, CampaignStatus::Running, now)?;

        let number = iterations.last().map_or(0, |it| it.iteration_number) + 1;
        let (start_page, end_page) = next_range(campaign);
        let iteration = self.store.create_iteration(Iteration {
            id: 0,
            campaign_id: campaign.id,
            iteration_number: number,
            start_page,
            end_page,
            start_url,
            run_token: None,
            status: IterationStatus::Pending,
            rows: Vec::new(),
            row_count: 0,
            pages_scraped: 0,
            launch_attempts: 0,
            progress: ProgressMark::new(now),
            last_error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        })?;

        campaign.current_iteration = number;
        self.store.update_campaign(campaign)?;
        Ok(iteration)
    }

    /// Start the vendor run for a pending iteration.
    ///
    /// A failed launch is not an error: the iteration stays `pending` with
    /// the failure recorded and the next tick tries again.
    pub async fn launch(&self, campaign: &mut Campaign, iteration: &mut Iteration) -> Result<TickEvent> {
        iteration.launch_attempts += 1;

        match self.vendor.launch_run(&campaign.source, &iteration.start_url).await {
            Ok(run_token) => {
                let now = self.clock.now();
                info!(
                    campaign = campaign.id,
                    iteration = iteration.iteration_number,
                    run = %run_token,
                    "Launched pages {}-{} at {}",
                    iteration.start_page,
                    iteration.end_page,
                    iteration.start_url
                );
                iteration.run_token = Some(run_token);
                iteration.status = IterationStatus::Running;
                iteration.started_at = Some(now);
                iteration.progress = ProgressMark::new(now);
                iteration.last_error = None;
                self.store.update_iteration(iteration)?;

                if campaign.status == CampaignStatus::Pending {
                    progress::transition(campaign, CampaignStatus::Running, now)?;
                }
                campaign.last_error = None;
                campaign.updated_at = now;
                self.store.update_campaign(campaign)?;

                self.metrics.iterations_launched.inc();
                Ok(TickEvent::Launched {
                    iteration: iteration.id,
                    number: iteration.iteration_number,
                    start_page: iteration.start_page,
                    end_page: iteration.end_page,
                })
            }
            Err(e) => {
                warn!(
                    campaign = campaign.id,
                    iteration = iteration.iteration_number,
                    attempts = iteration.launch_attempts,
                    "Launch failed: {}",
                    e
                );
                let message = format!("launch failed: {}", e);
                iteration.last_error = Some(message.clone());
                self.store.update_iteration(iteration)?;

                campaign.last_error = Some(message.clone());
                campaign.updated_at = self.clock.now();
                self.store.update_campaign(campaign)?;

                self.metrics.launch_failures.inc();
                Ok(TickEvent::LaunchFailed {
                    iteration: iteration.id,
                    attempts: iteration.launch_attempts,
                    error: message,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::{fixtures, MemoryStore, Store};
    use crate::vendor::fake::FakeVendor;
    use crate::vendor::VendorError;

    fn setup() -> (Launcher, Arc<MemoryStore>, Arc<FakeVendor>) {
        let store = Arc::new(MemoryStore::new());
        let vendor = Arc::new(FakeVendor::new());
        let launcher = Launcher::new(
            store.clone(),
            vendor.clone(),
            Arc::new(ManualClock::default()),
            Metrics::shared(),
        );
        (launcher, store, vendor)
    }

    #[test]
    fn test_next_range_clips_to_target() {
        let mut campaign = fixtures::campaign("src");
        campaign.total_pages_target = Some(12);
        campaign.pages_per_iteration = 5;
        assert_eq!(next_range(&campaign), (1, 5));

        campaign.current_page_scraped = 10;
        assert_eq!(next_range(&campaign), (11, 12));

        campaign.total_pages_target = None;
        assert_eq!(next_range(&campaign), (11, 15));

        // Zero target means "no target", never an inverted range
        campaign.total_pages_target = Some(0);
        assert_eq!(next_range(&campaign), (11, 15));
    }

    #[tokio::test]
    async fn test_plan_then_launch() {
        let (launcher, store, vendor) = setup();
        let mut campaign = store.create_campaign(fixtures::campaign("src")).unwrap();

        let mut iteration = launcher
            .plan(&mut campaign, "https://x.com/list?page=1".to_string())
            .unwrap();
        assert_eq!(iteration.iteration_number, 1);
        assert_eq!(iteration.status, IterationStatus::Pending);
        assert_eq!(campaign.status, CampaignStatus::Running);
        assert_eq!(campaign.current_iteration, 1);

        let event = launcher.launch(&mut campaign, &mut iteration).await.unwrap();
        assert!(matches!(event, TickEvent::Launched { number: 1, start_page: 1, end_page: 5, .. }));

        let stored = store.get_iteration(iteration.id).unwrap().unwrap();
        assert_eq!(stored.status, IterationStatus::Running);
        assert_eq!(stored.run_token.as_deref(), Some("run-1"));
        assert_eq!(vendor.launches(), vec![("src".to_string(), "https://x.com/list?page=1".to_string())]);
    }

    #[tokio::test]
    async fn test_failed_launch_keeps_iteration_pending() {
        let (launcher, store, vendor) = setup();
        let mut campaign = store.create_campaign(fixtures::campaign("src")).unwrap();
        let mut iteration = launcher
            .plan(&mut campaign, "https://x.com/list?page=1".to_string())
            .unwrap();

        vendor.fail_next_launch(VendorError::Rejected { status: 400, body: "bad start_url".into() });
        let event = launcher.launch(&mut campaign, &mut iteration).await.unwrap();
        assert!(matches!(event, TickEvent::LaunchFailed { attempts: 1, .. }));

        let stored = store.get_iteration(iteration.id).unwrap().unwrap();
        assert_eq!(stored.status, IterationStatus::Pending);
        assert_eq!(stored.launch_attempts, 1);
        assert!(stored.last_error.unwrap().contains("bad start_url"));

        let stored = store.get_campaign(campaign.id).unwrap().unwrap();
        assert_eq!(stored.current_page_scraped, 0);
        assert_eq!(stored.pages_completed, 0);
        assert!(stored.last_error.is_some());
    }

    #[tokio::test]
    async fn test_plan_refuses_second_active_iteration() {
        let (launcher, store, _vendor) = setup();
        let mut campaign = store.create_campaign(fixtures::campaign("src")).unwrap();
        launcher
            .plan(&mut campaign, "https://x.com/list?page=1".to_string())
            .unwrap();

        let err = launcher
            .plan(&mut campaign, "https://x.com/list?page=6".to_string())
            .unwrap_err();
        assert!(matches!(err, CampaignError::IterationInFlight { iteration: 1, .. }));
    }
}
