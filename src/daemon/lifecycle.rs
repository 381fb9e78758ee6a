//! Daemon Lifecycle Management
//!
//! Handles daemon startup, shutdown, and single-instance guarantees.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::campaign::Orchestrator;
use crate::clock::SharedClock;
use crate::config::Config;
use crate::metrics::Metrics;
use crate::monitor::StopDetector;
use crate::storage::SharedStore;
use crate::vendor::SharedVendor;

use super::http::HttpServer;
use super::scheduler::Scheduler;

/// PID file for single-instance guarantee
const PID_FILE_NAME: &str = "recrawl.pid";

/// Daemon instance hosting the poll loop and the control API
pub struct Daemon {
    config: Config,
    orchestrator: Arc<Orchestrator>,
    store: SharedStore,
    shutdown_tx: broadcast::Sender<()>,
    pid_file_path: PathBuf,
}

impl Daemon {
    /// Acquire the instance lock and wire the orchestrator
    pub fn start(
        config: Config,
        store: SharedStore,
        vendor: SharedVendor,
        clock: SharedClock,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        info!("Starting recrawl daemon");

        std::fs::create_dir_all(&config.daemon.data_dir).with_context(|| {
            format!("Failed to create data directory {}", config.daemon.data_dir.display())
        })?;
        let pid_file_path = config.daemon.data_dir.join(PID_FILE_NAME);
        Self::acquire_lock(&pid_file_path)?;

        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            vendor,
            clock,
            StopDetector::new(&config.monitor),
            config.campaign.clone(),
            metrics,
        ));

        if config.daemon.resume_on_start {
            let resumed = orchestrator
                .resume()
                .context("Failed to resume persisted campaigns")?;
            if !resumed.is_empty() {
                info!("Resumed campaigns: {:?}", resumed);
            }
        }

        let (shutdown_tx, _) = broadcast::channel(16);

        info!("Daemon initialized");
        info!("Data directory: {}", config.daemon.data_dir.display());

        Ok(Self {
            config,
            orchestrator,
            store,
            shutdown_tx,
            pid_file_path,
        })
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        self.orchestrator.clone()
    }

    /// Sender that stops [`Daemon::run`] when signalled
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run the daemon until a signal or a shutdown request
    pub async fn run(&self) -> Result<()> {
        info!("Daemon running");

        let shutdown_rx = self.shutdown_tx.subscribe();

        let scheduler = Scheduler::new(self.orchestrator.clone(), &self.config.monitor);
        let shutdown_rx_poll = self.shutdown_tx.subscribe();
        let poll_handle = tokio::spawn(async move {
            scheduler.run(shutdown_rx_poll).await;
        });

        // Start HTTP server if enabled
        let http_handle = if self.config.http.enabled {
            let http_config = self.config.http.clone();
            let shutdown_rx_http = self.shutdown_tx.subscribe();

            info!("Starting HTTP API server on: {}", http_config.listen_addr);

            let http_server = HttpServer::new(http_config, self.orchestrator.clone());
            Some(tokio::spawn(async move {
                match http_server.run(shutdown_rx_http).await {
                    Ok(()) => info!("HTTP server shut down cleanly"),
                    Err(e) => error!("HTTP server failed: {}", e),
                }
            }))
        } else {
            None
        };

        // Wait for shutdown signal (Ctrl+C or SIGTERM)
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
            }
            _ = Self::wait_for_sigterm() => {
                info!("Received SIGTERM, shutting down");
            }
            _ = Self::wait_for_shutdown(shutdown_rx) => {
                info!("Shutdown requested");
            }
        }

        let _ = self.shutdown_tx.send(());

        // Wait for tasks to stop, aborting if they don't shut down in time
        let timeout = Duration::from_secs(self.config.daemon.shutdown_timeout_secs);
        let poll_abort = poll_handle.abort_handle();
        if tokio::time::timeout(timeout, poll_handle).await.is_err() {
            warn!("Poll loop did not stop within {}s, aborting", timeout.as_secs());
            poll_abort.abort();
        }
        if let Some(http_handle) = http_handle {
            let http_abort = http_handle.abort_handle();
            if tokio::time::timeout(timeout, http_handle).await.is_err() {
                warn!("HTTP server did not shut down within {}s, aborting", timeout.as_secs());
                http_abort.abort();
            }
        }

        self.shutdown().await
    }

    /// Flush storage and release the lock
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down daemon");

        if let Err(e) = self.store.flush() {
            warn!("Failed to flush store during shutdown: {}", e);
        }

        Self::release_lock(&self.pid_file_path)?;

        info!("Daemon shutdown complete");
        Ok(())
    }

    /// Acquire single-instance lock via PID file
    ///
    /// Uses `create_new(true)` for atomic creation so two processes cannot
    /// both see the file missing and both create it.
    fn acquire_lock(pid_file_path: &Path) -> Result<()> {
        use std::fs::OpenOptions;

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(pid_file_path)
        {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                return Ok(());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(e).context("Failed to create PID file");
            }
        }

        let mut file = File::open(pid_file_path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        if let Ok(pid) = contents.trim().parse::<u32>() {
            if Self::process_exists(pid) {
                anyhow::bail!(
                    "Daemon is already running (PID {}). Stop it first or remove {}",
                    pid,
                    pid_file_path.display()
                );
            }
        }

        // Stale PID file
        std::fs::remove_file(pid_file_path)?;

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(pid_file_path)
        {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                Ok(())
            }
            Err(e) => Err(e).context("Failed to create PID file after removing stale lock"),
        }
    }

    fn release_lock(pid_file_path: &Path) -> Result<()> {
        if pid_file_path.exists() {
            std::fs::remove_file(pid_file_path)?;
        }
        Ok(())
    }

    fn process_exists(pid: u32) -> bool {
        #[cfg(unix)]
        {
            // Signal 0 only checks that the process exists
            unsafe { libc::kill(pid as i32, 0) == 0 }
        }

        #[cfg(not(unix))]
        {
            let _ = pid;
            true
        }
    }

    #[cfg(unix)]
    async fn wait_for_sigterm() {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    async fn wait_for_sigterm() {
        std::future::pending::<()>().await
    }

    async fn wait_for_shutdown(mut rx: broadcast::Receiver<()>) {
        let _ = rx.recv().await;
    }
}
