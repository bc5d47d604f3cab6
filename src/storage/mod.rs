//! Key-value persistence for the deal and notification stores.
//!
//! Values are JSON documents stored under short logical keys. Every caller
//! treats a storage error as non-fatal: it is logged and the in-memory state
//! stays authoritative until the next successful write.

pub mod file;
pub mod memory;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Snapshot of the deals seen on the last successful poll.
pub const LAST_KNOWN_DEALS_KEY: &str = "@last_known_deals";
/// Newest-first notification log.
pub const NOTIFICATIONS_KEY: &str = "@notifications";
/// Cached unread count, kept next to the log for a cheap cold-start read.
pub const UNREAD_COUNT_KEY: &str = "@unread_count";
pub const ONBOARDING_SEEN_KEY: &str = "hasSeenOnboarding";
pub const RECENTLY_VISITED_KEY: &str = "recently_visited_deals";

#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    /// Returns `None` when nothing is stored under `key`.
    async fn load(&self, key: &str) -> Result<Option<Value>>;
    async fn save(&self, key: &str, value: &Value) -> Result<()>;
    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Typed read on top of [`KvStore::load`].
pub async fn get_item<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match store.load(key).await? {
        Some(v) => {
            let item = serde_json::from_value(v).with_context(|| format!("decode {key}"))?;
            Ok(Some(item))
        }
        None => Ok(None),
    }
}

/// Typed write on top of [`KvStore::save`].
pub async fn set_item<T: Serialize + ?Sized>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let v = serde_json::to_value(value).with_context(|| format!("encode {key}"))?;
    store.save(key, &v).await
}
