// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod config;
pub mod deals;
pub mod metrics;
pub mod monitor;
pub mod notifications;
pub mod notify;
pub mod prefs;
pub mod recent;
pub mod storage;

// ---- Re-exports for stable public API ----
pub use crate::config::AppConfig;
pub use crate::deals::{Deal, DealSource, HttpDealSource, Restaurant};
pub use crate::monitor::{CycleOutcome, DealMonitor, DealObserver, MonitorStatus, PollPhase};
pub use crate::notifications::{
    NewNotification, NotificationKind, NotificationRecord, NotificationStore,
};
pub use crate::notify::{LocalNotification, LocalNotifier, NotifierMux};
pub use crate::storage::{FileStore, KvStore, MemoryStore};

use std::sync::Arc;

/// Monitor and notification store wired to each other over one storage
/// backend, the way the daemon runs them.
pub struct DealAlerts {
    pub monitor: DealMonitor,
    pub notifications: Arc<NotificationStore>,
}

impl DealAlerts {
    pub fn new(
        source: Arc<dyn DealSource>,
        store: Arc<dyn KvStore>,
        notifier: Arc<dyn LocalNotifier>,
    ) -> Self {
        Self {
            monitor: DealMonitor::new(source, store.clone()),
            notifications: Arc::new(NotificationStore::new(store, notifier)),
        }
    }

    /// Hydrate both stores and register the notification store as the
    /// monitor's observer. Monitoring is not started.
    pub async fn initialize(&self) {
        self.notifications.load().await;
        self.monitor
            .initialize(self.notifications.clone() as Arc<dyn DealObserver>)
            .await;
    }
}
