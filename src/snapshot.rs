//! Read-only snapshots for the renderer/exporter collaborators
//!
//! Snapshots are owned copies of the current store state: the outside
//! world never holds a live reference into in-progress aggregation.
//! `capture` is pure serialization — no side effects.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::TrialRecord;
use crate::stats::ComparativeAnalysis;
use crate::store::ResultStore;

/// Whole-store summary counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub total_results: usize,
    pub distinct_domains: usize,
    pub distinct_tiers: usize,
    pub distinct_approaches: usize,
    /// Records stored with synthesized default metrics
    pub minimal_data_count: usize,
    /// Fraction of records whose declared metrics report success
    pub overall_success_rate: f64,
    pub captured_at: DateTime<Utc>,
}

/// Immutable export of the store: the full log, every cached
/// comparative analysis, and summary statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub results: Vec<TrialRecord>,
    pub comparative: Vec<ComparativeAnalysis>,
    pub summary_stats: SummaryStats,
}

/// Capture a point-in-time snapshot of the store.
pub fn capture(store: &ResultStore) -> StoreSnapshot {
    let results: Vec<TrialRecord> = store.log().to_vec();

    let mut comparative: Vec<ComparativeAnalysis> = store.analyses().cloned().collect();
    comparative.sort_by(|a, b| a.key.cmp(&b.key));

    let domains: BTreeSet<&str> = results.iter().map(|r| r.domain.as_str()).collect();
    let tiers: BTreeSet<&str> = results.iter().map(|r| r.tier.as_str()).collect();
    let approaches: BTreeSet<&str> = results.iter().map(|r| r.approach.as_str()).collect();
    let minimal_data_count = results.iter().filter(|r| r.minimal_data).count();
    let successes = results
        .iter()
        .filter(|r| r.domain_metrics.overall_success)
        .count();
    let overall_success_rate = if results.is_empty() {
        0.0
    } else {
        successes as f64 / results.len() as f64
    };

    StoreSnapshot {
        summary_stats: SummaryStats {
            total_results: results.len(),
            distinct_domains: domains.len(),
            distinct_tiers: tiers.len(),
            distinct_approaches: approaches.len(),
            minimal_data_count,
            overall_success_rate,
            captured_at: Utc::now(),
        },
        results,
        comparative,
    }
}
