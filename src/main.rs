//! recrawl: incremental scrape campaign orchestration

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use recrawl::config::{Config, LogFormat, LoggingConfig, DEFAULT_CONFIG_FILE};
use recrawl::consolidation::ExportFormat;
use recrawl::types::CampaignId;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recrawl")]
#[command(about = "Drive multi-run scrape campaigns against a hosted scraping vendor")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, env = "RECRAWL_CONFIG")]
    config: PathBuf,

    /// Data directory (overrides daemon.data_dir)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon: poll loop plus HTTP control API
    Serve,

    /// Write a default configuration file
    Init {
        /// Output directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Manage campaigns on a running daemon
    Campaign {
        #[command(subcommand)]
        action: CampaignAction,
    },

    /// Show the continuation URL for a listing URL
    NextUrl {
        url: String,

        /// Compute the URL of this page instead of the next one
        #[arg(short, long)]
        page: Option<u32>,

        /// Items per page for offset-style paging
        #[arg(long)]
        page_size: Option<u32>,
    },

    /// Export a campaign's dataset from the store (daemon must be stopped)
    Consolidate {
        id: CampaignId,

        /// json or csv
        #[arg(short, long, default_value = "json")]
        format: ExportFormat,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub(crate) enum CampaignAction {
    /// Declare a new campaign
    Create {
        /// Vendor project token
        source: String,

        /// First listing page (defaults to the project's main site)
        #[arg(short, long)]
        seed_url: Option<String>,

        #[arg(short, long)]
        name: Option<String>,

        /// Page target (omit to run until pagination is exhausted)
        #[arg(short, long)]
        pages: Option<u32>,

        #[arg(long)]
        pages_per_iteration: Option<u32>,
    },
    /// List campaigns with their progress
    List,
    /// Show one campaign and its iterations
    Status { id: CampaignId },
    /// Stop launching new iterations
    Cancel { id: CampaignId },
    /// Clear the recovery counter after a manual check
    ResetRecovery { id: CampaignId },
    /// Print the consolidated dataset
    Dataset {
        id: CampaignId,

        #[arg(short, long, default_value = "json")]
        format: String,
    },
}

fn init_logging(logging: &LoggingConfig, verbosity: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(logging.filter(verbosity)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { path, force } = cli.command {
        init_logging(&LoggingConfig::default(), cli.verbose)?;
        return commands::init::init_config(path, force);
    }

    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(data_dir) = cli.data_dir {
        config.daemon.data_dir = data_dir;
    }
    init_logging(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Serve => commands::serve::serve(config).await,
        Commands::Campaign { action } => commands::campaign::handle_campaign(config, action).await,
        Commands::NextUrl { url, page, page_size } => commands::next_url::next_url(
            &url,
            page,
            page_size.unwrap_or(config.campaign.offset_page_size),
        ),
        Commands::Consolidate { id, format, output } => {
            commands::consolidate::export_dataset(config, id, format, output)
        }
        Commands::Init { .. } => Ok(()),
    }
}
