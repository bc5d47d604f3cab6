use anyhow::Result;
use metrics::{counter, gauge};
use serde_json::{json, Map, Value};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{watch, Mutex};

use super::ids::{Clock, IdGenerator, SystemClock, TimeRandomIds};
use super::{NewNotification, NotificationKind, NotificationRecord};
use crate::deals::Deal;
use crate::metrics::ensure_metrics_described;
use crate::monitor::DealObserver;
use crate::notify::{LocalNotification, LocalNotifier};
use crate::storage::{set_item, KvStore, NOTIFICATIONS_KEY, UNREAD_COUNT_KEY};

/// Newest-first notification log with a cached unread count.
///
/// Mutations are serialized by an async writer lock that is held until the
/// new state is persisted, so writes reach storage in the order they were
/// made. Queries read the in-memory list and never touch storage.
pub struct NotificationStore {
    store: Arc<dyn KvStore>,
    notifier: Arc<dyn LocalNotifier>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    records: RwLock<Vec<NotificationRecord>>,
    writer: Mutex<()>,
    unread_tx: watch::Sender<usize>,
}

fn count_unread(records: &[NotificationRecord]) -> usize {
    records.iter().filter(|r| !r.is_read).count()
}

/// The count has been stored both as a JSON number and as a decimal string.
fn parse_count(v: &Value) -> Option<usize> {
    match v {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Decode the stored log one record at a time so a single unreadable entry
/// does not cost the rest of the log on the next write.
fn decode_records(stored: Option<Value>) -> Vec<NotificationRecord> {
    let items = match stored {
        None => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => {
            tracing::warn!(target: "notifications", found = %other, "stored notifications are not a list");
            return Vec::new();
        }
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<NotificationRecord>(item) {
            Ok(r) => out.push(r),
            Err(e) => {
                tracing::warn!(target: "notifications", error = %e, "skipping unreadable notification")
            }
        }
    }
    out
}

impl NotificationStore {
    pub fn new(store: Arc<dyn KvStore>, notifier: Arc<dyn LocalNotifier>) -> Self {
        let (unread_tx, _) = watch::channel(0usize);
        Self {
            store,
            notifier,
            clock: Arc::new(SystemClock),
            ids: Arc::new(TimeRandomIds::new()),
            records: RwLock::new(Vec::new()),
            writer: Mutex::new(()),
            unread_tx,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    fn read_records(&self) -> RwLockReadGuard<'_, Vec<NotificationRecord>> {
        match self.records.read() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    fn write_records(&self) -> RwLockWriteGuard<'_, Vec<NotificationRecord>> {
        match self.records.write() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    /// Hydrate from storage. The persisted unread count is only trusted if it
    /// matches the persisted list; otherwise the recomputed value is written
    /// back.
    pub async fn load(&self) {
        ensure_metrics_described();
        let _w = self.writer.lock().await;

        let list = match self.store.load(NOTIFICATIONS_KEY).await {
            Ok(v) => decode_records(v),
            Err(e) => {
                tracing::warn!(target: "notifications", error = ?e, "could not load notifications");
                return;
            }
        };
        let cached = match self.store.load(UNREAD_COUNT_KEY).await {
            Ok(v) => v.as_ref().and_then(parse_count),
            Err(e) => {
                tracing::warn!(target: "notifications", error = ?e, "could not load unread count");
                None
            }
        };

        let unread = count_unread(&list);
        tracing::debug!(target: "notifications", total = list.len(), unread, "loaded notifications");
        *self.write_records() = list;

        if cached.is_some_and(|c| c != unread) {
            tracing::warn!(
                target: "notifications",
                cached = cached.unwrap_or_default(),
                actual = unread,
                "stored unread count out of date, rewriting"
            );
            self.save_unread(unread).await;
        }
        self.publish(unread);
    }

    /// Create, prepend and persist a notification, then show it.
    pub async fn add_notification(&self, input: NewNotification) -> NotificationRecord {
        ensure_metrics_described();
        let _w = self.writer.lock().await;

        let now = self.clock.now();
        let (record, snapshot) = {
            let mut records = self.write_records();
            let mut id = self.ids.next_id(now);
            while records.iter().any(|r| r.id == id) {
                id = self.ids.next_id(now);
            }
            let record = NotificationRecord {
                id,
                kind: input.kind,
                title: input.title,
                body: input.body,
                data: input.data,
                timestamp: now,
                is_read: false,
            };
            records.insert(0, record.clone());
            (record, records.clone())
        };

        self.persist(&snapshot).await;
        counter!("notifications_created_total", "type" => record.kind.as_str()).increment(1);
        tracing::info!(target: "notifications", id = %record.id, kind = %record.kind, "notification added");

        self.display(&record);
        record
    }

    /// Returns `false` (and writes nothing) when no unread record has `id`.
    pub async fn mark_as_read(&self, id: &str) -> bool {
        let _w = self.writer.lock().await;
        let snapshot = {
            let mut records = self.write_records();
            match records.iter_mut().find(|r| r.id == id && !r.is_read) {
                Some(r) => r.is_read = true,
                None => return false,
            }
            records.clone()
        };
        self.persist(&snapshot).await;
        true
    }

    /// Returns how many records flipped to read.
    pub async fn mark_all_as_read(&self) -> usize {
        let _w = self.writer.lock().await;
        let (flipped, snapshot) = {
            let mut records = self.write_records();
            let mut flipped = 0;
            for r in records.iter_mut().filter(|r| !r.is_read) {
                r.is_read = true;
                flipped += 1;
            }
            (flipped, records.clone())
        };
        if flipped > 0 {
            self.persist(&snapshot).await;
        }
        flipped
    }

    /// Returns `false` when nothing has `id`.
    pub async fn delete_notification(&self, id: &str) -> bool {
        let _w = self.writer.lock().await;
        let snapshot = {
            let mut records = self.write_records();
            let before = records.len();
            records.retain(|r| r.id != id);
            if records.len() == before {
                return false;
            }
            records.clone()
        };
        self.persist(&snapshot).await;
        true
    }

    /// Drop every record and both persisted keys.
    pub async fn clear_all_notifications(&self) {
        let _w = self.writer.lock().await;
        self.write_records().clear();
        for key in [NOTIFICATIONS_KEY, UNREAD_COUNT_KEY] {
            if let Err(e) = self.store.remove(key).await {
                tracing::warn!(target: "notifications", key, error = ?e, "could not remove stored notifications");
            }
        }
        self.publish(0);
    }

    pub async fn add_deal_notification(&self, deal: &Deal) -> NotificationRecord {
        self.add_notification(
            NewNotification::new(
                NotificationKind::Deal,
                "New Deal Available!",
                format!("Check out the new deal: {}", deal.title),
            )
            .with_data(deal_data(deal)),
        )
        .await
    }

    pub async fn add_deal_update_notification(&self, deal: &Deal) -> NotificationRecord {
        self.add_notification(
            NewNotification::new(
                NotificationKind::DealUpdate,
                "Deal Updated!",
                format!("{} has been updated with new offers", deal.title),
            )
            .with_data(deal_data(deal)),
        )
        .await
    }

    pub async fn add_promotional_notification(
        &self,
        title: impl Into<String>,
        body: impl Into<String>,
        data: Map<String, Value>,
    ) -> NotificationRecord {
        self.add_notification(
            NewNotification::new(NotificationKind::Promotional, title, body).with_data(data),
        )
        .await
    }

    /// All records, newest first.
    pub fn notifications(&self) -> Vec<NotificationRecord> {
        self.read_records().clone()
    }

    pub fn notifications_by_type(&self, kind: NotificationKind) -> Vec<NotificationRecord> {
        self.read_records()
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    pub fn unread_notifications(&self) -> Vec<NotificationRecord> {
        self.read_records()
            .iter()
            .filter(|r| !r.is_read)
            .cloned()
            .collect()
    }

    /// Cached count, updated on every mutation.
    pub fn unread_count(&self) -> usize {
        *self.unread_tx.borrow()
    }

    /// Receiver that sees every new unread count.
    pub fn subscribe_unread(&self) -> watch::Receiver<usize> {
        self.unread_tx.subscribe()
    }

    async fn persist(&self, records: &[NotificationRecord]) {
        if let Err(e) = set_item(self.store.as_ref(), NOTIFICATIONS_KEY, records).await {
            tracing::warn!(target: "notifications", error = ?e, "could not persist notifications");
        }
        let unread = count_unread(records);
        self.save_unread(unread).await;
        self.publish(unread);
    }

    async fn save_unread(&self, unread: usize) {
        if let Err(e) = set_item(self.store.as_ref(), UNREAD_COUNT_KEY, &unread).await {
            tracing::warn!(target: "notifications", error = ?e, "could not persist unread count");
        }
    }

    fn publish(&self, unread: usize) {
        gauge!("notifications_unread").set(unread as f64);
        self.unread_tx.send_replace(unread);
    }

    fn display(&self, record: &NotificationRecord) {
        let notifier = Arc::clone(&self.notifier);
        let content = LocalNotification::immediate(&record.title, &record.body, record.data.clone());
        tokio::spawn(async move {
            if let Err(e) = notifier.present(&content).await {
                counter!("notifications_display_errors_total").increment(1);
                tracing::warn!(target: "notifications", sink = notifier.name(), error = ?e, "could not display notification");
            }
        });
    }
}

fn deal_data(deal: &Deal) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("dealId".into(), json!(deal.id));
    data.insert(
        "deal".into(),
        serde_json::to_value(deal).unwrap_or(Value::Null),
    );
    data
}

#[async_trait::async_trait]
impl DealObserver for NotificationStore {
    async fn on_new_deal(&self, deal: Deal) -> Result<()> {
        self.add_deal_notification(&deal).await;
        Ok(())
    }
}
