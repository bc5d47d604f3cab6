use anyhow::Result;
use std::sync::Arc;

use super::{dedupe_by_id, Deal};
use crate::storage::{get_item, set_item, KvStore, LAST_KNOWN_DEALS_KEY};

/// Persisted copy of the deal list seen on the last successful poll.
#[derive(Clone)]
pub struct SnapshotStore {
    store: Arc<dyn KvStore>,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Nothing stored reads as an empty snapshot.
    pub async fn load(&self) -> Result<Vec<Deal>> {
        let deals: Option<Vec<Deal>> = get_item(self.store.as_ref(), LAST_KNOWN_DEALS_KEY).await?;
        Ok(dedupe_by_id(deals.unwrap_or_default()))
    }

    pub async fn save(&self, deals: &[Deal]) -> Result<()> {
        set_item(self.store.as_ref(), LAST_KNOWN_DEALS_KEY, deals).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.remove(LAST_KNOWN_DEALS_KEY).await
    }
}
