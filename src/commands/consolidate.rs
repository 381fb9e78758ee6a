use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use recrawl::{
    config::Config,
    consolidation::{consolidate, to_json, write_csv, ExportFormat},
    types::CampaignId,
};

use super::serve::open_store;

/// Export a campaign's dataset straight from the store.
///
/// The daemon holds the sled database open; stop it first or use
/// `recrawl campaign dataset` against the running daemon instead.
pub fn export_dataset(config: Config, id: CampaignId, format: ExportFormat, output: Option<PathBuf>) -> Result<()> {
    let store = open_store(&config)?;
    store
        .get_campaign(id)?
        .with_context(|| format!("Campaign {} not found", id))?;

    let dataset = match store.get_dataset(id)? {
        Some(dataset) => dataset,
        None => {
            eprintln!("Campaign {} has no final dataset yet; merging completed iterations", id);
            consolidate(id, &store.list_iterations(id)?, Utc::now())
        }
    };

    let mut out: Box<dyn Write> = match &output {
        Some(path) => Box::new(
            std::fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };

    match format {
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &to_json(&dataset))?;
            writeln!(out)?;
        }
        ExportFormat::Csv => write_csv(&dataset, &mut out)?,
    }
    out.flush()?;

    if let Some(path) = output {
        eprintln!(
            "Wrote {} records ({} duplicates removed) to {}",
            dataset.total_records,
            dataset.duplicates_removed,
            path.display()
        );
    }
    Ok(())
}
