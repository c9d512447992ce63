//! Update scheduler: debounced, rate-capped refresh notifications
//!
//! Repeated "store changed" signals within the debounce window collapse
//! into a single refresh, and a circuit breaker hard-caps refreshes per
//! second — excess signals are dropped with a warning, never queued.
//!
//! The debounce logic is an explicit state machine
//! (Idle → Scheduled → Running → Idle); the in-flight marker is an
//! owned guard that is released on every exit path, so no code path can
//! leak it set.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::snapshot::{self, StoreSnapshot};
use crate::store::ResultStore;

/// Receiver of refresh notifications (the renderer/exporter seam).
///
/// Sinks only ever receive owned, immutable snapshots — never live
/// references into the store.
pub trait RefreshSink: Send + Sync + 'static {
    fn refresh(&self, snapshot: StoreSnapshot);
}

/// A sink that discards refreshes; useful for headless runs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl RefreshSink for NoopSink {
    fn refresh(&self, _snapshot: StoreSnapshot) {}
}

/// Debounce state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Scheduled,
    Running,
}

/// Scheduler observability counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub refreshes_total: u64,
    pub dropped_total: u64,
    pub phase: SchedulerPhase,
}

#[derive(Debug)]
struct SchedState {
    phase: SchedulerPhase,
    /// A trigger arrived while a refresh was running; coalesced into the
    /// next debounce window instead of run concurrently.
    pending: bool,
    window_start: Instant,
    fired_in_window: u32,
    refreshes_total: u64,
    dropped_total: u64,
}

struct SchedulerInner {
    state: Mutex<SchedState>,
    store: Arc<RwLock<ResultStore>>,
    sink: Arc<dyn RefreshSink>,
    debounce: Duration,
    max_per_sec: u32,
}

/// Debounced notifier between the store and the refresh sink.
#[derive(Clone)]
pub struct UpdateScheduler {
    inner: Arc<SchedulerInner>,
}

impl UpdateScheduler {
    pub fn new(
        config: &EngineConfig,
        store: Arc<RwLock<ResultStore>>,
        sink: Arc<dyn RefreshSink>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(SchedState {
                    phase: SchedulerPhase::Idle,
                    pending: false,
                    window_start: Instant::now(),
                    fired_in_window: 0,
                    refreshes_total: 0,
                    dropped_total: 0,
                }),
                store,
                sink,
                debounce: Duration::from_millis(config.debounce_ms),
                max_per_sec: config.max_refreshes_per_sec,
            }),
        }
    }

    /// Signal that the store changed. Must run inside a tokio runtime.
    pub fn notify_changed(&self) {
        let mut st = self.inner.state.lock();

        if !breaker_allows(&mut st, Instant::now(), self.inner.max_per_sec) {
            st.dropped_total += 1;
            warn!(
                dropped_total = st.dropped_total,
                "refresh rate cap reached, dropping notification"
            );
            return;
        }

        match st.phase {
            SchedulerPhase::Idle => {
                st.phase = SchedulerPhase::Scheduled;
                drop(st);
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    run_debounced(inner).await;
                });
            }
            SchedulerPhase::Scheduled => {
                // Already inside a debounce window; coalesce.
            }
            SchedulerPhase::Running => {
                st.pending = true;
            }
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        let st = self.inner.state.lock();
        SchedulerStats {
            refreshes_total: st.refreshes_total,
            dropped_total: st.dropped_total,
            phase: st.phase,
        }
    }
}

/// Rolling one-second window check for the circuit breaker.
fn breaker_allows(st: &mut SchedState, now: Instant, cap: u32) -> bool {
    if now.duration_since(st.window_start) >= Duration::from_secs(1) {
        st.window_start = now;
        st.fired_in_window = 0;
    }
    st.fired_in_window < cap
}

/// One debounce cycle, re-entered while coalesced triggers are pending.
async fn run_debounced(inner: Arc<SchedulerInner>) {
    loop {
        tokio::time::sleep(inner.debounce).await;

        {
            let mut st = inner.state.lock();
            st.phase = SchedulerPhase::Running;
            st.fired_in_window += 1;
            st.refreshes_total += 1;
        }

        // Guard releases the Running phase if the refresh unwinds.
        let _guard = RunGuard {
            inner: Arc::clone(&inner),
        };
        let snapshot = snapshot::capture(&inner.store.read());
        debug!(
            results = snapshot.summary_stats.total_results,
            "🔔 refresh dispatched"
        );
        inner.sink.refresh(snapshot);

        // Leave Running in one step, straight to Scheduled when a
        // coalesced trigger is pending. An intermediate Idle here would
        // let notify_changed spawn a second loop alongside this one.
        let again = {
            let mut st = inner.state.lock();
            if st.pending {
                st.pending = false;
                st.phase = SchedulerPhase::Scheduled;
                true
            } else {
                st.phase = SchedulerPhase::Idle;
                false
            }
        };
        if !again {
            break;
        }
    }
}

struct RunGuard {
    inner: Arc<SchedulerInner>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        // Normal exits have already moved the phase on; this only fires
        // when the refresh unwound while still marked Running.
        let mut st = self.inner.state.lock();
        if st.phase == SchedulerPhase::Running {
            st.phase = SchedulerPhase::Idle;
        }
    }
}
