//! Error taxonomy for the ingestion pipeline
//!
//! Only hard failures are modeled as errors. Recoverable conditions
//! (missing metrics, extraction misses, throttled notifications) are
//! carried as flags on the data instead, so a record is never lost just
//! because it arrived incomplete.

use thiserror::Error;

/// Errors surfaced by ingestion and analysis.
///
/// All variants are handled locally inside the pipeline; nothing here
/// propagates to producers or to the refresh sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// A required identity field was absent or empty; the record is
    /// rejected, logged, and dropped.
    #[error("malformed record: missing required field `{field}`")]
    MalformedRecord { field: &'static str },

    /// Per-item processing exceeded its deadline; the item is skipped
    /// and the queue continues.
    #[error("processing timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The consumer loop has shut down and no longer accepts events.
    #[error("ingestion pipeline is shut down")]
    PipelineClosed,
}
