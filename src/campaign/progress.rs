//! Campaign progress tracking and status transitions

use super::CampaignError;
use crate::types::{Campaign, CampaignId, CampaignStatus, Iteration, IterationStatus};
use crate::util::round2;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A campaign is complete only against a positive page target.
pub fn is_complete(target: Option<u32>, current_page_scraped: u32) -> bool {
    matches!(target, Some(t) if t > 0 && current_page_scraped >= t)
}

/// Percentage of the target scraped.
///
/// Exactly 100 only when [`is_complete`]; an incomplete campaign never
/// reports more than 99 even when rounding would say otherwise.
pub fn completion_percentage(target: Option<u32>, current_page_scraped: u32) -> f64 {
    match target {
        Some(t) if t > 0 => {
            if is_complete(target, current_page_scraped) {
                100.0
            } else {
                let pct = f64::from(current_page_scraped) / f64::from(t) * 100.0;
                round2(pct).clamp(0.0, 99.0)
            }
        }
        _ => 0.0,
    }
}

/// Pages left before the target; `None` without a target
pub fn remaining_pages(target: Option<u32>, current_page_scraped: u32) -> Option<u32> {
    match target {
        Some(t) if t > 0 => Some(t.saturating_sub(current_page_scraped)),
        _ => None,
    }
}

/// Rough item total for display. Not a contract.
pub fn estimated_total_items(records_so_far: u64, multiplier: f64) -> u64 {
    (records_so_far as f64 * multiplier).round().max(0.0) as u64
}

/// Whether `from -> to` is a legal campaign transition.
///
/// `running` is re-entered on every launch; nothing goes back to `pending`
/// and terminal states are final.
pub fn can_transition(from: CampaignStatus, to: CampaignStatus) -> bool {
    use CampaignStatus::*;
    match from {
        Pending => matches!(to, Running | Failed | Cancelled),
        Running => matches!(to, Running | Complete | Failed | Cancelled),
        Complete | Failed | Cancelled => false,
    }
}

/// Move `campaign` to `to`, stamping `updated_at`
pub fn transition(campaign: &mut Campaign, to: CampaignStatus, at: DateTime<Utc>) -> Result<(), CampaignError> {
    if !can_transition(campaign.status, to) {
        return Err(CampaignError::InvalidTransition {
            campaign: campaign.id,
            from: campaign.status,
            to,
        });
    }
    campaign.status = to;
    campaign.updated_at = at;
    if to.is_terminal() {
        campaign.completed_at = Some(at);
    }
    Ok(())
}

/// Progress summary served by the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    pub campaign_id: CampaignId,
    pub name: String,
    pub status: CampaignStatus,
    pub total_pages_target: Option<u32>,
    pub current_page_scraped: u32,
    pub pages_completed: u32,
    pub remaining_pages: Option<u32>,
    pub completion_percentage: f64,
    pub is_complete: bool,
    pub current_iteration: u32,
    pub iterations_completed: u32,
    pub records_so_far: u64,
    pub estimated_total_items: u64,
    pub recovery_attempts: u32,
    pub needs_attention: bool,
    pub last_error: Option<String>,
}

impl ProgressReport {
    pub fn build(campaign: &Campaign, iterations: &[Iteration], estimate_multiplier: f64) -> Self {
        let completed = iterations
            .iter()
            .filter(|it| it.status == IterationStatus::Completed);
        let (iterations_completed, records_so_far) =
            completed.fold((0u32, 0u64), |(n, rows), it| (n + 1, rows + it.row_count));

        let target = campaign.total_pages_target;
        let current = campaign.current_page_scraped;

        Self {
            campaign_id: campaign.id,
            name: campaign.name.clone(),
            status: campaign.status,
            total_pages_target: target,
            current_page_scraped: current,
            pages_completed: campaign.pages_completed,
            remaining_pages: remaining_pages(target, current),
            completion_percentage: completion_percentage(target, current),
            is_complete: is_complete(target, current),
            current_iteration: campaign.current_iteration,
            iterations_completed,
            records_so_far,
            estimated_total_items: estimated_total_items(records_so_far, estimate_multiplier),
            recovery_attempts: campaign.recovery_attempts,
            needs_attention: campaign.needs_attention,
            last_error: campaign.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fixtures;

    #[test]
    fn test_is_complete_needs_positive_target() {
        assert!(!is_complete(None, 500));
        assert!(!is_complete(Some(0), 500));
        assert!(!is_complete(Some(10), 9));
        assert!(is_complete(Some(10), 10));
        assert!(is_complete(Some(10), 12));
    }

    #[test]
    fn test_percentage_caps_below_completion() {
        assert_eq!(completion_percentage(None, 40), 0.0);
        assert_eq!(completion_percentage(Some(0), 40), 0.0);
        assert_eq!(completion_percentage(Some(3), 1), 33.33);
        // 999/1000 rounds to 99.9 but must stay at 99 until complete
        assert_eq!(completion_percentage(Some(1000), 999), 99.0);
        assert_eq!(completion_percentage(Some(1000), 1000), 100.0);
        assert_eq!(completion_percentage(Some(5), 9), 100.0);
    }

    #[test]
    fn test_remaining_and_estimate() {
        assert_eq!(remaining_pages(Some(10), 4), Some(6));
        assert_eq!(remaining_pages(Some(10), 14), Some(0));
        assert_eq!(remaining_pages(None, 4), None);
        assert_eq!(estimated_total_items(100, 1.5), 150);
        assert_eq!(estimated_total_items(0, 1.5), 0);
    }

    #[test]
    fn test_transitions() {
        use CampaignStatus::*;
        assert!(can_transition(Pending, Running));
        assert!(can_transition(Running, Running));
        assert!(can_transition(Running, Complete));
        assert!(can_transition(Pending, Cancelled));
        assert!(!can_transition(Running, Pending));
        assert!(!can_transition(Pending, Complete));
        assert!(!can_transition(Complete, Running));
        assert!(!can_transition(Cancelled, Cancelled));
    }

    #[test]
    fn test_transition_stamps_terminal_time() {
        let mut campaign = fixtures::campaign("src");
        let at = Utc::now();
        transition(&mut campaign, CampaignStatus::Running, at).unwrap();
        assert_eq!(campaign.completed_at, None);
        transition(&mut campaign, CampaignStatus::Complete, at).unwrap();
        assert_eq!(campaign.completed_at, Some(at));

        let err = transition(&mut campaign, CampaignStatus::Running, at).unwrap_err();
        assert!(matches!(err, CampaignError::InvalidTransition { .. }));
    }

    #[test]
    fn test_report_counts_completed_iterations_only() {
        let mut campaign = fixtures::campaign("src");
        campaign.id = 7;
        campaign.current_page_scraped = 5;

        let mut done = fixtures::iteration(7, 1);
        done.status = IterationStatus::Completed;
        done.row_count = 40;
        let mut failed = fixtures::iteration(7, 2);
        failed.status = IterationStatus::Failed;
        failed.row_count = 3;

        let report = ProgressReport::build(&campaign, &[done, failed], 1.5);
        assert_eq!(report.iterations_completed, 1);
        assert_eq!(report.records_so_far, 40);
        assert_eq!(report.estimated_total_items, 60);
        assert_eq!(report.completion_percentage, 50.0);
        assert_eq!(report.remaining_pages, Some(5));
        assert!(!report.is_complete);
    }
}
