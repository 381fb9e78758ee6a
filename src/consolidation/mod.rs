//! Consolidation and de-duplication
//!
//! Merges the rows of a campaign's completed iterations into one dataset.
//! Iterations are merged in `iteration_number` order and rows in their
//! original order; the first occurrence of a row wins and every later copy
//! counts as a removed duplicate. The output schema is the union of all
//! columns in first-seen order, with blanks where a row lacks a column.

mod export;

pub use export::{to_csv, to_json, write_csv, ExportFormat};

use crate::types::{CampaignId, ConsolidatedDataset, Iteration, IterationStatus, Row, RowHash};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

/// Streaming de-duplicator tracking the column union
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<RowHash>,
    columns: Vec<String>,
    known_columns: HashSet<String>,
    rows: Vec<Row>,
    input_rows: u64,
    duplicates: u64,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a row; returns true when it was new and kept.
    pub fn push(&mut self, row: &Row) -> bool {
        self.input_rows += 1;
        if !self.seen.insert(row.content_hash()) {
            self.duplicates += 1;
            return false;
        }
        for column in row.columns() {
            if self.known_columns.insert(column.to_string()) {
                self.columns.push(column.to_string());
            }
        }
        self.rows.push(row.clone());
        true
    }

    /// Register rows as already seen without keeping them
    pub fn prime<'a>(&mut self, rows: impl IntoIterator<Item = &'a Row>) {
        for row in rows {
            self.seen.insert(row.content_hash());
        }
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    pub fn input_rows(&self) -> u64 {
        self.input_rows
    }

    /// Kept rows padded to the column union, plus the column list
    pub fn finish(self) -> (Vec<String>, Vec<Row>) {
        let Self { columns, mut rows, .. } = self;
        for row in &mut rows {
            for column in &columns {
                if row.get(column).is_none() {
                    row.insert(column.clone(), String::new());
                }
            }
        }
        (columns, rows)
    }
}

/// Result of merging one continuation's rows against everything before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IncrementStats {
    pub original_count: u64,
    pub increment_count: u64,
    pub new_records: u64,
    pub duplicates: u64,
    pub total_unique: u64,
}

/// Merge `increment` against the rows of `prior` iterations.
pub fn merge_increment(prior: &[Iteration], increment: &[Row]) -> IncrementStats {
    let mut base = Deduplicator::new();
    for row in prior.iter().flat_map(|it| it.rows.iter()) {
        base.push(row);
    }
    let original_count = base.input_rows();
    let original_unique = original_count - base.duplicates();

    let mut dedup = Deduplicator::new();
    dedup.prime(prior.iter().flat_map(|it| it.rows.iter()));
    let new_records = increment.iter().filter(|row| dedup.push(row)).count() as u64;

    IncrementStats {
        original_count,
        increment_count: increment.len() as u64,
        new_records,
        duplicates: increment.len() as u64 - new_records,
        total_unique: original_unique + new_records,
    }
}

/// Consolidate a campaign's completed iterations.
///
/// Deterministic for a given iteration set: the same rows come out in the
/// same order with the same counts however often it runs.
pub fn consolidate(
    campaign_id: CampaignId,
    iterations: &[Iteration],
    created_at: DateTime<Utc>,
) -> ConsolidatedDataset {
    let mut completed: Vec<&Iteration> = iterations
        .iter()
        .filter(|it| it.campaign_id == campaign_id && it.status == IterationStatus::Completed)
        .collect();
    completed.sort_by_key(|it| (it.iteration_number, it.id));

    let mut dedup = Deduplicator::new();
    for iteration in &completed {
        for row in &iteration.rows {
            dedup.push(row);
        }
    }

    let total_pages = completed.iter().map(|it| it.planned_pages()).sum();
    let duplicates_removed = dedup.duplicates();
    let (columns, rows) = dedup.finish();

    ConsolidatedDataset {
        campaign_id,
        columns,
        total_records: rows.len() as u64,
        rows,
        duplicates_removed,
        total_pages,
        iterations_merged: completed.len() as u32,
        created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProgressMark;

    fn iteration(id: u64, number: u32, rows: Vec<Row>) -> Iteration {
        let now = Utc::now();
        Iteration {
            id,
            campaign_id: 1,
            iteration_number: number,
            start_page: (number - 1) * 2 + 1,
            end_page: number * 2,
            start_url: format!("https://x.com/list?page={}", (number - 1) * 2 + 1),
            run_token: Some(format!("run-{}", id)),
            status: IterationStatus::Completed,
            row_count: rows.len() as u64,
            rows,
            pages_scraped: 2,
            launch_attempts: 1,
            progress: ProgressMark::new(now),
            last_error: None,
            created_at: now,
            started_at: Some(now),
            completed_at: Some(now),
        }
    }

    fn row(name: &str) -> Row {
        Row::from_pairs([("name", name)])
    }

    #[test]
    fn test_overlapping_iterations_keep_first_copy() {
        let iterations = vec![
            iteration(10, 1, vec![row("A"), row("B")]),
            iteration(11, 2, vec![row("B"), row("C")]),
        ];
        let dataset = consolidate(1, &iterations, Utc::now());

        assert_eq!(dataset.total_records, 3);
        assert_eq!(dataset.duplicates_removed, 1);
        let names: Vec<_> = dataset.rows.iter().map(|r| r.get("name").unwrap()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);

        let input: u64 = iterations.iter().map(|it| it.row_count).sum();
        assert_eq!(dataset.total_records, input - dataset.duplicates_removed);
    }

    #[test]
    fn test_merge_order_follows_iteration_number() {
        // Stored out of order; iteration 1 still wins
        let iterations = vec![
            iteration(20, 2, vec![Row::from_pairs([("name", "A"), ("src", "")])]),
            iteration(21, 1, vec![row("A"), row("Z")]),
        ];
        let dataset = consolidate(1, &iterations, Utc::now());
        assert_eq!(dataset.rows[0].get("name"), Some("A"));
        assert_eq!(dataset.rows[1].get("name"), Some("Z"));
        assert_eq!(dataset.duplicates_removed, 1);
    }

    #[test]
    fn test_consolidation_is_idempotent() {
        let iterations = vec![
            iteration(1, 1, vec![row("A"), row("A"), row("B")]),
            iteration(2, 2, vec![row("C"), row("B")]),
        ];
        let at = Utc::now();
        let first = consolidate(1, &iterations, at);
        let second = consolidate(1, &iterations, at);
        assert_eq!(first, second);
        assert_eq!(first.duplicates_removed, 2);
    }

    #[test]
    fn test_heterogeneous_columns_are_unioned() {
        let iterations = vec![
            iteration(1, 1, vec![Row::from_pairs([("name", "A"), ("price", "1")])]),
            iteration(2, 2, vec![Row::from_pairs([("name", "B"), ("rating", "4")])]),
        ];
        let dataset = consolidate(1, &iterations, Utc::now());
        assert_eq!(dataset.columns, vec!["name", "price", "rating"]);
        assert_eq!(dataset.rows[0].get("rating"), Some(""));
        assert_eq!(dataset.rows[1].get("price"), Some(""));
    }

    #[test]
    fn test_skips_unfinished_iterations() {
        let mut failed = iteration(2, 2, vec![row("X")]);
        failed.status = IterationStatus::Failed;
        let iterations = vec![iteration(1, 1, vec![row("A")]), failed];
        let dataset = consolidate(1, &iterations, Utc::now());
        assert_eq!(dataset.iterations_merged, 1);
        assert_eq!(dataset.total_records, 1);
        assert_eq!(dataset.total_pages, 2);
    }

    #[test]
    fn test_merge_increment_stats() {
        let prior = vec![iteration(1, 1, vec![row("A"), row("B"), row("B")])];
        let stats = merge_increment(&prior, &[row("B"), row("C"), row("C")]);
        assert_eq!(stats.original_count, 3);
        assert_eq!(stats.increment_count, 3);
        assert_eq!(stats.new_records, 1);
        assert_eq!(stats.duplicates, 2);
        assert_eq!(stats.total_unique, 3);
    }
}
