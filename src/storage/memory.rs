use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::KvStore;

/// Process-local store. Values are kept as JSON text so reads go through the
/// same decode path as the on-disk store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every operation fails with a storage error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Raw JSON text under `key`, if any.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .expect("memory store mutex poisoned")
            .get(key)
            .cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("memory store unavailable");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        self.check_available()?;
        match self.raw(key) {
            Some(text) => {
                let v = serde_json::from_str(&text).with_context(|| format!("parse {key}"))?;
                Ok(Some(v))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, key: &str, value: &Value) -> Result<()> {
        self.check_available()?;
        let text = serde_json::to_string(value)?;
        self.entries
            .lock()
            .expect("memory store mutex poisoned")
            .insert(key.to_string(), text);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.entries
            .lock()
            .expect("memory store mutex poisoned")
            .remove(key);
        Ok(())
    }
}
