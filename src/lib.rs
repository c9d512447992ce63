//! # Verdict
//!
//! Benchmark-trial result engine: ingestion, metric extraction, and
//! comparative statistics for competing retrieval approaches.
//!
//! - **Ingestion**: heterogeneous trial events are validated and
//!   sanitized into uniform records on a single-consumer pipeline
//! - **Extraction**: success, latency, and token metrics are recovered
//!   through fallback chains over inconsistently shaped payloads
//! - **Storage**: records are held per (domain, tier) stratum with a
//!   bounded flat log and stratified eviction
//! - **Statistics**: Wilson confidence intervals, t-approximate
//!   significance, weighted rankings, and advantage validation per key
//! - **Scheduling**: downstream refreshes are debounced and rate-capped
//!
//! Data flow:
//!
//! ```text
//!   producers ──► queue ──► [gate] ──► validate ──► store ──► stats
//!                                         │                    │
//!                                      rejected          scheduler ──► sink
//! ```
//!
//! ```no_run
//! use std::sync::Arc;
//! use verdict::{BenchEngine, EngineConfig, NoopSink, RawTrialEvent};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let engine = BenchEngine::spawn(EngineConfig::default(), Arc::new(NoopSink));
//! let event = RawTrialEvent::from_value(serde_json::json!({
//!     "domain": "navigation",
//!     "tier": "Q1",
//!     "walkthroughId": "w-001",
//!     "approach": "mcd",
//!     "scenarioResults": [{"success": true, "latencyMs": 420, "tokens": 96}],
//! }));
//! engine.ingest(event)?;
//! engine.drained().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod record;
pub mod scheduler;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod validate;

pub use config::EngineConfig;
pub use error::IngestError;
pub use pipeline::{BenchEngine, EngineHandle, PipelineStats};
pub use record::{DomainMetrics, DomainTierKey, RawTrialEvent, TrialRecord, DEFAULT_APPROACH};
pub use scheduler::{NoopSink, RefreshSink, SchedulerStats, UpdateScheduler};
pub use snapshot::{StoreSnapshot, SummaryStats};
pub use stats::{ApproachStats, ComparativeAnalysis, ConfidenceInterval, Significance};
pub use store::ResultStore;

/// Initialize tracing for binaries and integration tests. Respects
/// `RUST_LOG`, defaulting to info-level output for this crate.
pub fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "verdict=info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
