//! Daemon Module
//!
//! Long-running process that owns the campaign store, ticks active
//! campaigns on an interval and serves the control API.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    recrawl serve                      │
//! │                                                       │
//! │  ┌──────────────┐   tick(id)   ┌──────────────────┐  │
//! │  │  Scheduler   │─────────────▶│   Orchestrator   │  │
//! │  │ (poll loop)  │              │ (per-campaign    │  │
//! │  └──────────────┘              │  locks)          │  │
//! │  ┌──────────────┐  cancel/...  │                  │  │
//! │  │  HTTP API    │─────────────▶│                  │  │
//! │  │  /api/v1     │              └───┬──────────┬───┘  │
//! │  └──────────────┘                  │          │      │
//! │                              ┌─────▼───┐ ┌────▼───┐  │
//! │                              │  Store  │ │ Vendor │  │
//! │                              │ (sled)  │ │ (HTTP) │  │
//! │                              └─────────┘ └────────┘  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! recrawl serve
//! ```

pub mod http;
pub mod lifecycle;
pub mod scheduler;

pub use http::HttpServer;
pub use lifecycle::Daemon;
pub use scheduler::{PollSummary, Scheduler};
