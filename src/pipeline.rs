//! Ingestion pipeline: single-consumer queue feeding the result store
//!
//! Producers on any task enqueue raw events; one logical consumer loop
//! drains them FIFO. All store writes happen on that one execution
//! path, which is what makes mutation safe without fine-grained locks.
//!
//! Item lifecycle: Received → Queued → Validating → (Rejected |
//! Extracting → Stored → [StatisticsRecomputed] → NotifyScheduled).
//!
//! Before each item the consumer checks the external execution gate;
//! while the gate is engaged it parks without consuming, leaving the
//! remaining items queued. Each item runs under a short deadline, and a
//! timeout or processing error is logged and skipped — never allowed to
//! stall the queue.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::IngestError;
use crate::record::{DomainTierKey, RawTrialEvent, TrialRecord};
use crate::scheduler::{RefreshSink, UpdateScheduler};
use crate::snapshot::{self, StoreSnapshot};
use crate::stats::{self, ComparativeAnalysis};
use crate::store::ResultStore;
use crate::validate;

/// Processing phases of one inbound event, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemPhase {
    Received,
    Queued,
    Validating,
    Rejected,
    Extracting,
    Stored,
    StatisticsRecomputed,
    NotifyScheduled,
}

/// Pipeline observability counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub queued: usize,
    pub processed: u64,
    pub stored: u64,
    pub rejected: u64,
    pub timed_out: u64,
    pub recomputes: u64,
}

#[derive(Debug, Default)]
struct PipelineShared {
    queue_depth: AtomicUsize,
    processed: AtomicU64,
    stored: AtomicU64,
    rejected: AtomicU64,
    timed_out: AtomicU64,
    recomputes: AtomicU64,
}

/// The benchmark result engine.
///
/// Explicitly constructed and handed to producers/consumers — there is
/// no global singleton, so test runs never share hidden state.
pub struct BenchEngine;

impl BenchEngine {
    /// Start the engine: spawns the single consumer loop and returns a
    /// cloneable handle. Must run inside a tokio runtime.
    pub fn spawn(config: EngineConfig, sink: Arc<dyn RefreshSink>) -> EngineHandle {
        let store = Arc::new(RwLock::new(ResultStore::new(config.log_ceiling)));
        let scheduler = UpdateScheduler::new(&config, Arc::clone(&store), sink);
        let shared = Arc::new(PipelineShared::default());

        let (tx, rx) = mpsc::unbounded_channel();
        let (gate_tx, gate_rx) = watch::channel(false);

        tokio::spawn(run_consumer(
            rx,
            gate_rx,
            Arc::clone(&store),
            Arc::clone(&shared),
            scheduler.clone(),
            config,
        ));

        info!("🚀 result engine started");
        EngineHandle {
            tx,
            gate: Arc::new(gate_tx),
            store,
            shared,
            scheduler,
        }
    }
}

/// Cloneable handle to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<RawTrialEvent>,
    gate: Arc<watch::Sender<bool>>,
    store: Arc<RwLock<ResultStore>>,
    shared: Arc<PipelineShared>,
    scheduler: UpdateScheduler,
}

impl EngineHandle {
    /// Enqueue a raw event for ingestion. Producers only ever enqueue;
    /// they never touch the store directly.
    pub fn ingest(&self, event: RawTrialEvent) -> Result<(), IngestError> {
        debug!(phase = ?ItemPhase::Received, "event received");
        self.shared.queue_depth.fetch_add(1, Ordering::SeqCst);
        debug!(phase = ?ItemPhase::Queued, "event enqueued");
        self.tx.send(event).map_err(|_| {
            self.shared.queue_depth.fetch_sub(1, Ordering::SeqCst);
            IngestError::PipelineClosed
        })
    }

    /// Engage the execution gate; the consumer stops draining and
    /// leaves remaining items queued. Idempotent.
    pub fn pause(&self) {
        self.gate.send_replace(true);
    }

    /// Release the execution gate; draining resumes in original order
    /// after a short grace delay. Idempotent.
    pub fn resume(&self) {
        self.gate.send_replace(false);
    }

    /// Clear the store, the flat log, and all cached analyses.
    /// Idempotent.
    pub fn reset(&self) {
        self.store.write().clear();
        self.scheduler.notify_changed();
    }

    pub fn results_count(&self) -> usize {
        self.store.read().results_count()
    }

    pub fn domain_results(&self, domain: &str) -> Vec<TrialRecord> {
        self.store.read().domain_results(domain)
    }

    pub fn comparative_analysis(&self, key: &DomainTierKey) -> Option<ComparativeAnalysis> {
        self.store.read().analysis(key).cloned()
    }

    /// Pure, side-effect-free serialization of current state for the
    /// external exporter.
    pub fn export_snapshot(&self) -> StoreSnapshot {
        snapshot::capture(&self.store.read())
    }

    /// Snapshot serialized as pretty JSON, ready for the exporter.
    pub fn export_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(&self.export_snapshot())
            .context("failed to serialize result snapshot")
    }

    pub fn queue_depth(&self) -> usize {
        self.shared.queue_depth.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            queued: self.queue_depth(),
            processed: self.shared.processed.load(Ordering::SeqCst),
            stored: self.shared.stored.load(Ordering::SeqCst),
            rejected: self.shared.rejected.load(Ordering::SeqCst),
            timed_out: self.shared.timed_out.load(Ordering::SeqCst),
            recomputes: self.shared.recomputes.load(Ordering::SeqCst),
        }
    }

    pub fn scheduler_stats(&self) -> crate::scheduler::SchedulerStats {
        self.scheduler.stats()
    }

    /// Wait until the queue is fully drained. Intended for tests and
    /// shutdown sequencing; do not await this while paused.
    pub async fn drained(&self) {
        while self.queue_depth() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

async fn run_consumer(
    mut rx: mpsc::UnboundedReceiver<RawTrialEvent>,
    mut gate: watch::Receiver<bool>,
    store: Arc<RwLock<ResultStore>>,
    shared: Arc<PipelineShared>,
    scheduler: UpdateScheduler,
    config: EngineConfig,
) {
    let item_deadline = Duration::from_millis(config.item_timeout_ms.max(1));
    let grace = Duration::from_millis(config.resume_grace_ms);

    loop {
        // Check the gate before draining the next item.
        wait_for_gate(&mut gate, grace).await;

        let Some(event) = rx.recv().await else {
            break;
        };
        // The gate may have engaged while we waited for an event.
        wait_for_gate(&mut gate, grace).await;

        debug!(phase = ?ItemPhase::Validating, "processing event");
        let outcome = timeout(
            item_deadline,
            process_item(event, &store, &config, &scheduler),
        )
        .await;

        shared.processed.fetch_add(1, Ordering::SeqCst);
        match outcome {
            Err(_) => {
                shared.timed_out.fetch_add(1, Ordering::SeqCst);
                let err = IngestError::Timeout {
                    timeout_ms: config.item_timeout_ms,
                };
                warn!(%err, "item skipped");
            }
            Ok(Err(err)) => {
                shared.rejected.fetch_add(1, Ordering::SeqCst);
                warn!(phase = ?ItemPhase::Rejected, %err, "event dropped");
            }
            Ok(Ok(recomputed)) => {
                shared.stored.fetch_add(1, Ordering::SeqCst);
                if recomputed {
                    shared.recomputes.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
        shared.queue_depth.fetch_sub(1, Ordering::SeqCst);

        // Cooperative pause so a burst never starves other tasks.
        if config.inter_item_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.inter_item_delay_ms)).await;
        } else {
            tokio::task::yield_now().await;
        }
    }

    info!("ingestion consumer stopped");
}

/// Park while the execution gate is engaged. After a release, wait a
/// short grace delay and re-verify so a pending re-engage is not raced.
async fn wait_for_gate(gate: &mut watch::Receiver<bool>, grace: Duration) {
    loop {
        if !*gate.borrow() {
            return;
        }
        debug!("execution gate engaged, consumer parked");
        if gate.changed().await.is_err() {
            // Control handle dropped; nothing will ever release the
            // gate again, so proceed rather than hang.
            return;
        }
        if !*gate.borrow() {
            tokio::time::sleep(grace).await;
            if !*gate.borrow() {
                debug!("execution gate released, resuming");
                return;
            }
        }
    }
}

/// Validate, store, and (when a key holds competing approaches)
/// recompute its comparative analysis.
async fn process_item(
    event: RawTrialEvent,
    store: &Arc<RwLock<ResultStore>>,
    config: &EngineConfig,
    scheduler: &UpdateScheduler,
) -> Result<bool, IngestError> {
    let record = validate::validate(event)?;
    debug!(
        phase = ?ItemPhase::Extracting,
        walkthrough_id = %record.walkthrough_id,
        approach = %record.approach,
        "record validated"
    );

    let recomputed = {
        let mut store = store.write();
        let outcome = store.put(record);
        debug!(phase = ?ItemPhase::Stored, key = %outcome.key, "record stored");
        if outcome.evicted > 0 {
            info!(evicted = outcome.evicted, "log ceiling reached, evicted entries");
        }

        if outcome.recompute {
            let analysis = store
                .approaches(&outcome.key)
                .and_then(|set| stats::analyze(&outcome.key, set, store.log(), config));
            match analysis {
                Some(analysis) => {
                    store.set_analysis(outcome.key.clone(), analysis);
                    debug!(
                        phase = ?ItemPhase::StatisticsRecomputed,
                        key = %outcome.key,
                        approaches = outcome.comparative_approaches,
                        "comparative analysis recomputed"
                    );
                    true
                }
                None => false,
            }
        } else {
            false
        }
    };

    debug!(phase = ?ItemPhase::NotifyScheduled, "refresh scheduled");
    scheduler.notify_changed();
    Ok(recomputed)
}
