//! End-to-end campaign runs against a scripted vendor

mod common;

use chrono::Duration;
use common::{clock, orchestrator, products, ScriptedVendor};
use recrawl::{
    campaign::{progress, TickEvent},
    consolidation::consolidate,
    pagination::UrlPattern,
    storage::{MemoryStore, SharedStore, SledStore, Store},
    types::{CampaignStatus, IterationStatus, NewCampaign, RecoveryReason, RecoveryStatus, Row},
};
use std::sync::Arc;
use tempfile::TempDir;

fn request(target: Option<u32>, per_iteration: u32) -> NewCampaign {
    NewCampaign {
        source: "tok".to_string(),
        name: "Catalog".to_string(),
        seed_url: "https://x.com/list?page=1".to_string(),
        total_pages_target: target,
        pages_per_iteration: Some(per_iteration),
    }
}

#[test]
fn test_continuation_url_from_reference_page() {
    let pattern = UrlPattern::detect("https://x.com/list?page=3", 20).unwrap();
    assert_eq!(pattern.next_url("https://x.com/list?page=3").unwrap(), "https://x.com/list?page=4");
    assert!(!progress::is_complete(Some(10), 3));
}

#[tokio::test]
async fn test_overlapping_iterations_are_deduplicated() {
    let vendor = ScriptedVendor::new();
    let store: SharedStore = Arc::new(MemoryStore::new());
    let orch = orchestrator(store.clone(), vendor.clone(), clock());

    let row = |name: &str, price: &str| Row::from_pairs([("name", name), ("price", price)]);
    let (a, b, c) = (row("A", "1"), row("B", "2"), row("C", "3"));

    let campaign = orch.create_campaign(request(Some(2), 1)).await.unwrap();
    orch.tick(campaign.id).await.unwrap();
    vendor.complete(1, vec![a.clone(), b.clone()]);
    orch.tick(campaign.id).await.unwrap();

    // Same product again, with stray whitespace
    vendor.complete(1, vec![row(" B ", "2"), c.clone()]);
    let events = orch.tick(campaign.id).await.unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, TickEvent::CampaignCompleted { total_records: 3, duplicates_removed: 1 })));

    let dataset = store.get_dataset(campaign.id).unwrap().unwrap();
    assert_eq!(dataset.rows, vec![a, b, c]);
    assert_eq!(dataset.iterations_merged, 2);
    assert_eq!(dataset.total_pages, 2);
    assert_eq!(vendor.start_urls(), vec!["https://x.com/list?page=1", "https://x.com/list?page=2"]);

    // Re-running consolidation over the same iterations changes nothing
    let again = consolidate(campaign.id, &store.list_iterations(campaign.id).unwrap(), dataset.created_at);
    assert_eq!(again, dataset);
}

#[tokio::test]
async fn test_stalled_run_is_continued_to_target() {
    let vendor = ScriptedVendor::new();
    let store: SharedStore = Arc::new(MemoryStore::new());
    let clock = clock();
    let orch = orchestrator(store.clone(), vendor.clone(), clock.clone());

    let campaign = orch.create_campaign(request(Some(5), 5)).await.unwrap();
    orch.tick(campaign.id).await.unwrap();

    // Two pages in, then nothing for longer than the idle window
    vendor.progress(2, products("a", 12));
    orch.tick(campaign.id).await.unwrap();
    clock.advance(Duration::seconds(301));
    let events = orch.tick(campaign.id).await.unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        TickEvent::RecoveryStarted { reason: RecoveryReason::Stuck, attempt: 1, .. }
    )));
    assert_eq!(vendor.cancelled(), vec!["t1".to_string()]);

    let midway = orch.campaign(campaign.id).unwrap();
    assert_eq!(midway.status, CampaignStatus::Running);
    assert_eq!(midway.current_page_scraped, 2);
    assert!(!progress::is_complete(midway.total_pages_target, midway.current_page_scraped));

    // Continuation covers pages 3-5
    vendor.complete(3, products("b", 25));
    let events = orch.tick(campaign.id).await.unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, TickEvent::RecoverySettled { new_records: 25, duplicates: 0, .. })));

    let done = orch.campaign(campaign.id).unwrap();
    assert_eq!(done.status, CampaignStatus::Complete);
    assert_eq!(done.current_page_scraped, 5);
    assert_eq!(done.pages_completed, 5);
    assert_eq!(done.recovery_attempts, 1);
    assert_eq!(
        vendor.start_urls(),
        vec!["https://x.com/list?page=1", "https://x.com/list?page=3"]
    );

    let iterations = orch.iterations(campaign.id).unwrap();
    assert_eq!((iterations[0].start_page, iterations[0].end_page), (1, 2));
    assert_eq!((iterations[1].start_page, iterations[1].end_page), (3, 5));
    assert!(iterations.iter().all(|it| it.status == IterationStatus::Completed));

    let recoveries = store.list_recoveries(campaign.id).unwrap();
    assert_eq!(recoveries.len(), 1);
    assert_eq!(recoveries[0].status, RecoveryStatus::Completed);
    assert_eq!(recoveries[0].continuation_iteration_id, Some(iterations[1].id));
    assert_eq!(recoveries[0].last_item.as_ref().and_then(|i| i.name.as_deref()), Some("a-11"));

    let report = orch.progress(campaign.id).unwrap();
    assert_eq!(report.completion_percentage, 100.0);
    assert_eq!(report.records_so_far, 37);
}

#[tokio::test]
async fn test_launch_failure_keeps_page_counter_and_retries_same_url() {
    let vendor = ScriptedVendor::new();
    let store: SharedStore = Arc::new(MemoryStore::new());
    let orch = orchestrator(store.clone(), vendor.clone(), clock());
    let campaign = orch.create_campaign(request(Some(10), 5)).await.unwrap();

    vendor.reject_next_launch("project busy");
    let events = orch.tick(campaign.id).await.unwrap();
    assert!(matches!(events[0], TickEvent::LaunchFailed { attempts: 1, .. }));
    let after = orch.campaign(campaign.id).unwrap();
    assert_eq!(after.current_page_scraped, 0);
    assert_eq!(after.status, CampaignStatus::Running);
    assert!(after.last_error.unwrap().contains("project busy"));

    let events = orch.tick(campaign.id).await.unwrap();
    assert!(matches!(events[0], TickEvent::Launched { number: 1, start_page: 1, .. }));
    assert_eq!(vendor.start_urls(), vec!["https://x.com/list?page=1"]);
    assert_eq!(orch.iterations(campaign.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_lets_current_run_finish_but_launches_nothing() {
    let vendor = ScriptedVendor::new();
    let store: SharedStore = Arc::new(MemoryStore::new());
    let orch = orchestrator(store.clone(), vendor.clone(), clock());
    let campaign = orch.create_campaign(request(Some(20), 5)).await.unwrap();
    orch.tick(campaign.id).await.unwrap();

    let cancelled = orch.cancel(campaign.id).await.unwrap();
    assert_eq!(cancelled.status, CampaignStatus::Cancelled);

    vendor.complete(5, products("a", 40));
    orch.tick(campaign.id).await.unwrap();

    assert_eq!(vendor.start_urls().len(), 1);
    let iterations = orch.iterations(campaign.id).unwrap();
    assert_eq!(iterations[0].status, IterationStatus::Completed);
    assert_eq!(iterations[0].row_count, 40);
    assert_eq!(orch.campaign(campaign.id).unwrap().status, CampaignStatus::Cancelled);
    assert!(orch.active_campaigns().unwrap().is_empty());
}

#[tokio::test]
async fn test_recovery_counters_survive_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("campaigns.sled");
    let vendor = ScriptedVendor::new();
    let clock = clock();

    let id = {
        let store = Arc::new(SledStore::open(&path).unwrap());
        let orch = orchestrator(store.clone(), vendor.clone(), clock.clone());
        let campaign = orch.create_campaign(request(None, 5)).await.unwrap();
        orch.tick(campaign.id).await.unwrap();

        vendor.progress(1, products("a", 3));
        orch.tick(campaign.id).await.unwrap();
        clock.advance(Duration::seconds(301));
        orch.tick(campaign.id).await.unwrap();
        store.flush().unwrap();
        campaign.id
    };

    let store = Arc::new(SledStore::open(&path).unwrap());
    let campaign = store.get_campaign(id).unwrap().unwrap();
    assert_eq!(campaign.recovery_attempts, 1);
    assert_eq!(campaign.current_page_scraped, 1);
    assert_eq!(store.list_recoveries(id).unwrap().len(), 1);

    // The continuation that was in flight is picked up again
    let orch = orchestrator(store.clone(), vendor.clone(), clock.clone());
    assert_eq!(orch.resume().unwrap(), vec![id]);
    vendor.complete(5, products("b", 50));
    let events = orch.tick(id).await.unwrap();
    assert!(events.iter().any(|e| matches!(e, TickEvent::IterationCompleted { start_page: 2, end_page: 6, .. })));
    assert_eq!(orch.campaign(id).unwrap().recovery_attempts, 1);
}
