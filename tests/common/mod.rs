//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use recrawl::{
    campaign::Orchestrator,
    clock::ManualClock,
    config::{CampaignConfig, MonitorConfig},
    metrics::Metrics,
    monitor::StopDetector,
    storage::SharedStore,
    types::{Row, RunToken},
    vendor::{RunSnapshot, RunState, SourceInfo, VendorApi, VendorError, VendorResult},
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ScriptedRun {
    pub start_url: String,
    pub state: RunState,
    pub pages: u32,
    pub rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct Inner {
    runs: Vec<(RunToken, ScriptedRun)>,
    launch_errors: VecDeque<VendorError>,
    cancelled: Vec<RunToken>,
}

/// In-process vendor whose runs are advanced by the test
#[derive(Debug, Default)]
pub struct ScriptedVendor {
    inner: Mutex<Inner>,
}

impl ScriptedVendor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject_next_launch(&self, body: &str) {
        self.inner.lock().launch_errors.push_back(VendorError::Rejected {
            status: 400,
            body: body.to_string(),
        });
    }

    /// Report progress on the most recent run
    pub fn progress(&self, pages: u32, rows: Vec<Row>) {
        let mut inner = self.inner.lock();
        if let Some((_, run)) = inner.runs.last_mut() {
            run.pages = pages;
            run.rows = rows;
        }
    }

    /// Complete the most recent run
    pub fn complete(&self, pages: u32, rows: Vec<Row>) {
        let mut inner = self.inner.lock();
        if let Some((_, run)) = inner.runs.last_mut() {
            run.state = RunState::Completed;
            run.pages = pages;
            run.rows = rows;
        }
    }

    pub fn start_urls(&self) -> Vec<String> {
        self.inner.lock().runs.iter().map(|(_, r)| r.start_url.clone()).collect()
    }

    pub fn cancelled(&self) -> Vec<RunToken> {
        self.inner.lock().cancelled.clone()
    }

    fn with_run<T>(&self, token: &str, f: impl FnOnce(&mut ScriptedRun) -> T) -> VendorResult<T> {
        let mut inner = self.inner.lock();
        inner
            .runs
            .iter_mut()
            .find(|(t, _)| t == token)
            .map(|(_, run)| f(run))
            .ok_or_else(|| VendorError::Rejected {
                status: 404,
                body: format!("unknown run {}", token),
            })
    }
}

#[async_trait]
impl VendorApi for ScriptedVendor {
    async fn run_status(&self, run_token: &str) -> VendorResult<RunSnapshot> {
        self.with_run(run_token, |run| RunSnapshot {
            run_token: run_token.to_string(),
            state: run.state.clone(),
            pages_scraped: run.pages,
            records: Some(run.rows.len() as u64),
            start_url: Some(run.start_url.clone()),
        })
    }

    async fn launch_run(&self, _source: &str, start_url: &str) -> VendorResult<RunToken> {
        let mut inner = self.inner.lock();
        if let Some(err) = inner.launch_errors.pop_front() {
            return Err(err);
        }
        let token = format!("t{}", inner.runs.len() + 1);
        inner.runs.push((
            token.clone(),
            ScriptedRun {
                start_url: start_url.to_string(),
                state: RunState::Running,
                pages: 0,
                rows: Vec::new(),
            },
        ));
        Ok(token)
    }

    async fn fetch_output(&self, run_token: &str) -> VendorResult<Vec<Row>> {
        self.with_run(run_token, |run| run.rows.clone())
    }

    async fn cancel_run(&self, run_token: &str) -> VendorResult<()> {
        self.with_run(run_token, |run| run.state = RunState::Cancelled)?;
        self.inner.lock().cancelled.push(run_token.to_string());
        Ok(())
    }

    async fn source_info(&self, source: &str) -> VendorResult<SourceInfo> {
        Ok(SourceInfo {
            token: source.to_string(),
            title: Some(format!("{} catalog", source)),
            main_site: Some("https://x.com/list?page=1".to_string()),
            last_run: None,
        })
    }
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()))
}

pub fn orchestrator(store: SharedStore, vendor: Arc<ScriptedVendor>, clock: Arc<ManualClock>) -> Orchestrator {
    Orchestrator::new(
        store,
        vendor,
        clock,
        StopDetector::new(&MonitorConfig::default()),
        CampaignConfig::default(),
        Metrics::shared(),
    )
}

/// `n` distinct product rows named `{prefix}-{i}`
pub fn products(prefix: &str, n: usize) -> Vec<Row> {
    (0..n)
        .map(|i| {
            Row::from_pairs([
                ("name", format!("{}-{}", prefix, i)),
                ("url", format!("https://x.com/p/{}-{}", prefix, i)),
            ])
        })
        .collect()
}
