//! Engine configuration

use serde::{Deserialize, Serialize};

/// Configuration for the result engine.
///
/// Defaults are tuned for an interactive harness emitting a few events
/// per second; all knobs are serializable so a harness can ship its own
/// profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Maximum entries retained in the flat result log before the
    /// stratified eviction pass runs
    pub log_ceiling: usize,

    /// Debounce window for refresh notifications (milliseconds);
    /// repeated store-changed signals inside the window collapse to one
    pub debounce_ms: u64,

    /// Circuit breaker: hard cap on refresh notifications per second.
    /// Excess signals are dropped with a warning, never queued.
    pub max_refreshes_per_sec: u32,

    /// Per-item processing deadline in the ingestion loop (milliseconds)
    pub item_timeout_ms: u64,

    /// Cooperative inter-item delay so a burst of events never starves
    /// other tasks (milliseconds)
    pub inter_item_delay_ms: u64,

    /// Grace delay before resuming after the execution gate clears,
    /// re-verified to avoid racing a pending gate release (milliseconds)
    pub resume_grace_ms: u64,

    /// Expected success proportion the significance approximation tests
    /// against
    pub expected_success_rate: f64,

    /// Minimum trial count before a confidence interval is considered
    /// reliable
    pub min_reliable_samples: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_ceiling: 200,
            debounce_ms: 250,
            max_refreshes_per_sec: 4,
            item_timeout_ms: 3_000,
            inter_item_delay_ms: 5,
            resume_grace_ms: 50,
            expected_success_rate: 0.8,
            min_reliable_samples: 10,
        }
    }
}
