//! Periodic poll loop
//!
//! Every `monitor.poll_interval_secs` the scheduler lists the campaigns that
//! still need attention and ticks them concurrently, at most
//! `monitor.max_concurrent_ticks` at a time. A failing tick is logged and
//! counted; it never stops the loop.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::campaign::Orchestrator;
use crate::config::MonitorConfig;

/// Outcome of one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub campaigns: usize,
    pub failed: usize,
    pub events: usize,
}

/// Drives [`Orchestrator::tick`] on an interval
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    max_concurrent: usize,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, config: &MonitorConfig) -> Self {
        Self {
            orchestrator,
            interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            max_concurrent: config.max_concurrent_ticks.max(1),
        }
    }

    /// Tick every active campaign once
    pub async fn run_once(&self) -> PollSummary {
        self.orchestrator.metrics().poll_cycles.inc();

        let ids = match self.orchestrator.active_campaigns() {
            Ok(ids) => ids,
            Err(e) => {
                error!("Failed to list active campaigns: {}", e);
                return PollSummary::default();
            }
        };

        let results: Vec<_> = stream::iter(ids)
            .map(|id| async move { (id, self.orchestrator.tick(id).await) })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut summary = PollSummary {
            campaigns: results.len(),
            ..PollSummary::default()
        };
        for (id, result) in results {
            match result {
                Ok(events) => {
                    if !events.is_empty() {
                        debug!(campaign = id, ?events, "Tick");
                    }
                    summary.events += events.len();
                }
                // Already logged and counted by the orchestrator
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }

    /// Poll until shutdown is signalled
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!("Poll loop started (every {}s)", self.interval.as_secs());
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let summary = self.run_once().await;
                    if summary.campaigns > 0 {
                        debug!(
                            campaigns = summary.campaigns,
                            failed = summary.failed,
                            events = summary.events,
                            "Poll cycle done"
                        );
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        info!("Poll loop stopped");
    }
}
