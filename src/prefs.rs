//! Small persisted user flags.

use std::sync::Arc;

use crate::storage::{get_item, set_item, KvStore, ONBOARDING_SEEN_KEY};

/// Onboarding flag over the key-value store. Storage failures read as "not
/// seen" and writes are best-effort.
#[derive(Clone)]
pub struct Onboarding {
    store: Arc<dyn KvStore>,
}

impl Onboarding {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn has_seen(&self) -> bool {
        match get_item::<bool>(self.store.as_ref(), ONBOARDING_SEEN_KEY).await {
            Ok(v) => v.unwrap_or(false),
            Err(e) => {
                tracing::warn!(target: "storage", error = ?e, "could not read onboarding flag");
                false
            }
        }
    }

    pub async fn set_seen(&self, seen: bool) {
        if let Err(e) = set_item(self.store.as_ref(), ONBOARDING_SEEN_KEY, &seen).await {
            tracing::warn!(target: "storage", error = ?e, "could not save onboarding flag");
        }
    }
}
