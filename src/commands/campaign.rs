use anyhow::Result;
use recrawl::{
    client::ApiClient,
    config::Config,
    types::{CampaignId, NewCampaign},
};
use serde_json::Value;

use crate::CampaignAction;

/// Campaign management against a running daemon
pub async fn handle_campaign(config: Config, action: CampaignAction) -> Result<()> {
    let client = ApiClient::from_config(&config.http)?;

    match action {
        CampaignAction::Create {
            source,
            seed_url,
            name,
            pages,
            pages_per_iteration,
        } => {
            let request = NewCampaign {
                source,
                name: name.unwrap_or_default(),
                seed_url: seed_url.unwrap_or_default(),
                total_pages_target: pages,
                pages_per_iteration,
            };
            let created = client.create_campaign(&request).await?;
            print_detail(&created);
        }
        CampaignAction::List => {
            let campaigns = client.list_campaigns().await?;
            let list = campaigns.as_array().cloned().unwrap_or_default();
            if list.is_empty() {
                println!("No campaigns");
            }
            for detail in &list {
                let p = &detail["progress"];
                println!(
                    "{:>4}  {:<10} {:>6}%  pages {}/{}  records {}  {}",
                    p["campaign_id"],
                    p["status"].as_str().unwrap_or("?"),
                    p["completion_percentage"],
                    p["current_page_scraped"],
                    target(&p["total_pages_target"]),
                    p["records_so_far"],
                    p["name"].as_str().unwrap_or_default(),
                );
            }
        }
        CampaignAction::Status { id } => {
            print_detail(&client.campaign(id).await?);
            print_iterations(&client, id).await?;
        }
        CampaignAction::Cancel { id } => {
            print_detail(&client.cancel(id).await?);
        }
        CampaignAction::ResetRecovery { id } => {
            print_detail(&client.reset_recovery(id).await?);
        }
        CampaignAction::Dataset { id, format } => {
            print!("{}", client.dataset(id, &format).await?);
        }
    }
    Ok(())
}

fn target(value: &Value) -> String {
    value.as_u64().map_or_else(|| "-".to_string(), |t| t.to_string())
}

fn print_detail(detail: &Value) {
    let p = &detail["progress"];
    println!("Campaign {} ({})", p["campaign_id"], p["name"].as_str().unwrap_or_default());
    println!("  Status:      {}", p["status"].as_str().unwrap_or("?"));
    println!(
        "  Pages:       {}/{} ({}%)",
        p["current_page_scraped"],
        target(&p["total_pages_target"]),
        p["completion_percentage"]
    );
    println!("  Iterations:  {} ({} completed)", p["current_iteration"], p["iterations_completed"]);
    println!(
        "  Records:     {} (estimated total {})",
        p["records_so_far"], p["estimated_total_items"]
    );
    println!("  Recoveries:  {}", p["recovery_attempts"]);
    if p["needs_attention"].as_bool() == Some(true) {
        println!("  ATTENTION:   recovery limit reached; reset with `recrawl campaign reset-recovery`");
    }
    if let Some(err) = p["last_error"].as_str() {
        println!("  Last error:  {}", err);
    }
}

async fn print_iterations(client: &ApiClient, id: CampaignId) -> Result<()> {
    let iterations = client.iterations(id).await?;
    for it in iterations.as_array().into_iter().flatten() {
        println!(
            "    #{:<3} pages {}-{}  {:<9} rows {}  {}",
            it["iteration_number"],
            it["start_page"],
            it["end_page"],
            it["status"].as_str().unwrap_or("?"),
            it["row_count"],
            it["start_url"].as_str().unwrap_or_default(),
        );
    }
    Ok(())
}
