//! recrawl: incremental scrape campaign orchestration
//!
//! Drives a hosted scraping vendor through multi-run campaigns:
//! - pagination continuation from a detected URL pattern
//! - stall detection and capped automatic recovery
//! - de-duplicating consolidation of every run's output
//! - a daemon with a poll loop and an HTTP control API

pub mod cache;
pub mod campaign;
pub mod client;
pub mod clock;
pub mod config;
pub mod consolidation;
pub mod daemon;
pub mod metrics;
pub mod monitor;
pub mod pagination;
pub mod storage;
pub mod types;
pub mod util;
pub mod vendor;

pub use config::Config;
pub use types::*;
