//! Run status polling

use super::detector::{Assessment, RunClass, StopDetector};
use crate::clock::SharedClock;
use crate::types::Iteration;
use crate::vendor::{RunSnapshot, VendorApi, VendorError};
use tracing::debug;

/// One poll of a running iteration
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub snapshot: RunSnapshot,
    pub class: RunClass,
    pub assessment: Assessment,
    /// Whether the progress mark moved on this poll
    pub progressed: bool,
}

/// Polls a vendor run and classifies it against the stop detector
#[derive(Debug, Clone)]
pub struct RunPoller {
    detector: StopDetector,
    clock: SharedClock,
}

impl RunPoller {
    pub fn new(detector: StopDetector, clock: SharedClock) -> Self {
        Self { detector, clock }
    }

    pub fn detector(&self) -> &StopDetector {
        &self.detector
    }

    /// Poll `iteration`'s run, updating its progress mark in place.
    ///
    /// The caller persists the iteration afterwards.
    pub async fn poll(&self, vendor: &dyn VendorApi, iteration: &mut Iteration) -> Result<Observation, VendorError> {
        let run_token = iteration
            .run_token
            .clone()
            .ok_or_else(|| VendorError::Config(format!("iteration {} has no run token", iteration.id)))?;

        let snapshot = vendor.run_status(&run_token).await?;
        let now = self.clock.now();
        let records = snapshot.records.unwrap_or(iteration.progress.records);
        let progressed = iteration.progress.observe(snapshot.pages_scraped, records, now);

        let class = self.detector.classify(&snapshot.state, &iteration.progress, now);
        let assessment = self.detector.assess(
            class,
            iteration.progress.pages,
            iteration.progress.records,
            iteration.planned_pages(),
        );

        debug!(
            iteration = iteration.id,
            run = %run_token,
            state = %snapshot.state,
            pages = snapshot.pages_scraped,
            ?class,
            "Polled run"
        );

        Ok(Observation { snapshot, class, assessment, progressed })
    }
}
