//! Deal monitor: polls a [`DealSource`], diffs the result against the last
//! known snapshot and reports deals that were not there before.

pub mod cycle;

use anyhow::Result;
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;

use crate::deals::{dedupe_by_id, new_deals, Deal, DealSource, SnapshotStore};
use crate::metrics::ensure_metrics_described;
use crate::storage::KvStore;

pub use cycle::{CycleOutcome, PollPhase};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(30_000);

/// Receives deals that appeared since the previous poll.
#[async_trait::async_trait]
pub trait DealObserver: Send + Sync {
    /// Called once per new deal, in fetch order; the next call waits for this
    /// one to finish. `restaurant` is already flattened to a display name.
    async fn on_new_deal(&self, deal: Deal) -> Result<()>;
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub is_monitoring: bool,
    pub last_known_deals_count: usize,
    pub poll_interval_ms: u64,
    pub phase: PollPhase,
    pub last_outcome: Option<CycleOutcome>,
}

/// Cheap to clone; clones share the same state and schedule.
#[derive(Clone)]
pub struct DealMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn DealSource>,
    snapshots: SnapshotStore,
    observer: RwLock<Option<Arc<dyn DealObserver>>>,
    state: Mutex<MonitorState>,
}

struct MonitorState {
    phase: PollPhase,
    poll_interval: Duration,
    last_known: Vec<Deal>,
    last_outcome: Option<CycleOutcome>,
    ticker: Option<Ticker>,
}

struct Ticker {
    stop: oneshot::Sender<()>,
}

impl Ticker {
    /// Future ticks are cancelled; a cycle already running is left to finish.
    fn stop(self) {
        let _ = self.stop.send(());
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }
}

/// Holds the "cycle running" slot; dropping it always returns the monitor to
/// `Idle`, also when the cycle future is cancelled mid-way.
struct CycleGuard<'a> {
    inner: &'a Inner,
}

impl<'a> CycleGuard<'a> {
    fn begin(inner: &'a Inner) -> Option<Self> {
        let mut st = inner.lock_state();
        if st.phase != PollPhase::Idle {
            return None;
        }
        st.phase = PollPhase::Polling;
        Some(Self { inner })
    }

    fn advance(&self, phase: PollPhase) {
        self.inner.lock_state().phase = phase;
    }

    fn known(&self) -> Vec<Deal> {
        self.inner.lock_state().last_known.clone()
    }

    fn finish(self, outcome: CycleOutcome) -> CycleOutcome {
        self.inner.lock_state().last_outcome = Some(outcome);
        outcome
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.inner.lock_state().phase = PollPhase::Idle;
    }
}

impl DealMonitor {
    pub fn new(source: Arc<dyn DealSource>, store: Arc<dyn KvStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                snapshots: SnapshotStore::new(store),
                observer: RwLock::new(None),
                state: Mutex::new(MonitorState {
                    phase: PollPhase::Idle,
                    poll_interval: DEFAULT_POLL_INTERVAL,
                    last_known: Vec::new(),
                    last_outcome: None,
                    ticker: None,
                }),
            }),
        }
    }

    pub fn with_poll_interval(self, interval: Duration) -> Self {
        self.inner.lock_state().poll_interval = sanitize_interval(interval);
        self
    }

    /// Register the observer and hydrate the snapshot from storage.
    ///
    /// A storage failure is logged and leaves the snapshot empty, so the next
    /// poll seeds instead of reporting every deal as new.
    pub async fn initialize(&self, observer: Arc<dyn DealObserver>) {
        match self.inner.observer.write() {
            Ok(mut slot) => *slot = Some(observer),
            Err(poison) => *poison.into_inner() = Some(observer),
        }

        match self.inner.snapshots.load().await {
            Ok(deals) => {
                tracing::debug!(target: "monitor", known = deals.len(), "loaded deal snapshot");
                self.inner.lock_state().last_known = deals;
            }
            Err(e) => {
                tracing::warn!(target: "monitor", error = ?e, "could not load deal snapshot, starting empty");
            }
        }
    }

    /// Start the recurring poll: one cycle right away, then one per interval.
    /// Returns `false` if the monitor was already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_monitoring(&self) -> bool {
        let mut st = self.inner.lock_state();
        if st.ticker.is_some() {
            return false;
        }
        st.ticker = Some(self.spawn_ticker(st.poll_interval));
        tracing::info!(
            target: "monitor",
            interval_ms = st.poll_interval.as_millis() as u64,
            source = self.inner.source.name(),
            "deal monitoring started"
        );
        true
    }

    /// Cancel future polls. Returns `false` if the monitor was not running.
    pub fn stop_monitoring(&self) -> bool {
        let ticker = self.inner.lock_state().ticker.take();
        match ticker {
            Some(t) => {
                t.stop();
                tracing::info!(target: "monitor", "deal monitoring stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.lock_state().ticker.is_some()
    }

    /// Change the poll interval. A running schedule is swapped for a new one
    /// in the same critical section, so two schedules never coexist.
    pub fn set_poll_interval(&self, interval: Duration) {
        let interval = sanitize_interval(interval);
        let mut st = self.inner.lock_state();
        st.poll_interval = interval;
        if let Some(old) = st.ticker.take() {
            old.stop();
            st.ticker = Some(self.spawn_ticker(interval));
            tracing::info!(
                target: "monitor",
                interval_ms = interval.as_millis() as u64,
                "deal monitoring rescheduled"
            );
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.inner.lock_state().poll_interval
    }

    /// Forget every known deal, in memory and in storage.
    pub async fn reset_stored_deals(&self) {
        self.inner.lock_state().last_known.clear();
        if let Err(e) = self.inner.snapshots.clear().await {
            tracing::warn!(target: "monitor", error = ?e, "could not remove stored deal snapshot");
        }
    }

    /// Ids of the deals seen on the last successful poll, in fetch order.
    pub fn known_deal_ids(&self) -> Vec<String> {
        self.inner
            .lock_state()
            .last_known
            .iter()
            .map(|d| d.id.clone())
            .collect()
    }

    pub fn status(&self) -> MonitorStatus {
        let st = self.inner.lock_state();
        MonitorStatus {
            is_monitoring: st.ticker.is_some(),
            last_known_deals_count: st.last_known.len(),
            poll_interval_ms: st.poll_interval.as_millis() as u64,
            phase: st.phase,
            last_outcome: st.last_outcome,
        }
    }

    /// Run one poll cycle now. Also what every scheduled tick calls.
    ///
    /// Returns [`CycleOutcome::Skipped`] without fetching if another cycle is
    /// still in progress.
    pub async fn check_for_new_deals(&self) -> CycleOutcome {
        ensure_metrics_described();

        let Some(guard) = CycleGuard::begin(&self.inner) else {
            tracing::debug!(target: "monitor", "previous poll still running, skipping");
            counter!("deal_monitor_polls_skipped_total").increment(1);
            return CycleOutcome::Skipped;
        };
        counter!("deal_monitor_polls_total").increment(1);
        let started = Instant::now();

        let fetched = match self.inner.source.fetch_deals().await {
            Ok(deals) => deals,
            Err(e) => {
                guard.advance(PollPhase::Failed);
                tracing::warn!(
                    target: "monitor",
                    source = self.inner.source.name(),
                    error = ?e,
                    "deal poll failed, retrying next tick"
                );
                counter!("deal_monitor_poll_errors_total").increment(1);
                return guard.finish(CycleOutcome::Failed);
            }
        };

        let current = dedupe_by_id(fetched);
        let known = guard.known();

        let outcome = if known.is_empty() {
            tracing::info!(target: "monitor", deals = current.len(), "seeding deal snapshot");
            CycleOutcome::Seeded {
                deals: current.len(),
            }
        } else {
            guard.advance(PollPhase::Applying);
            let fresh = new_deals(&known, &current);
            let observer = self.observer();
            let mut failed_callbacks = 0usize;

            for deal in &fresh {
                tracing::info!(target: "monitor", deal_id = %deal.id, title = %deal.title, "new deal");
                let Some(obs) = observer.as_ref() else {
                    continue;
                };
                if let Err(e) = obs.on_new_deal(deal.normalized()).await {
                    failed_callbacks += 1;
                    tracing::warn!(target: "monitor", deal_id = %deal.id, error = ?e, "new-deal observer failed");
                }
            }

            counter!("deal_monitor_new_deals_total").increment(fresh.len() as u64);
            CycleOutcome::Applied {
                new_deals: fresh.len(),
                failed_callbacks,
            }
        };

        self.replace_snapshot(current).await;

        histogram!("deal_monitor_poll_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        gauge!("deal_monitor_last_poll_ts").set(chrono::Utc::now().timestamp() as f64);
        guard.finish(outcome)
    }

    fn observer(&self) -> Option<Arc<dyn DealObserver>> {
        match self.inner.observer.read() {
            Ok(slot) => slot.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    /// In-memory snapshot is updated even if the write fails, so a storage
    /// outage cannot turn into repeated notifications for the same deals.
    async fn replace_snapshot(&self, current: Vec<Deal>) {
        if let Err(e) = self.inner.snapshots.save(&current).await {
            tracing::warn!(target: "monitor", error = ?e, "could not persist deal snapshot");
        }
        gauge!("deal_monitor_known_deals").set(current.len() as f64);
        self.inner.lock_state().last_known = current;
    }

    fn spawn_ticker(&self, interval: Duration) -> Ticker {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let monitor = DealMonitor { inner };
                // Run outside the select so stopping never cuts a cycle short.
                monitor.check_for_new_deals().await;
            }
            tracing::debug!(target: "monitor", "poll loop exited");
        });

        Ticker { stop: stop_tx }
    }
}

fn sanitize_interval(interval: Duration) -> Duration {
    if interval.is_zero() {
        tracing::warn!(target: "monitor", "zero poll interval, using default");
        DEFAULT_POLL_INTERVAL
    } else {
        interval
    }
}
