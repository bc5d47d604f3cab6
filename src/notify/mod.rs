//! Display sinks for freshly created notifications.
//!
//! The notification store hands every new record to a [`LocalNotifier`]
//! without waiting for it; a sink failing never undoes the store write.

pub mod webhook;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

pub use webhook::WebhookNotifier;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LocalNotification {
    pub title: String,
    pub body: String,
    pub data: Map<String, Value>,
    /// `None` shows the notification right away.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fire_at: Option<DateTime<Utc>>,
}

impl LocalNotification {
    pub fn immediate(title: impl Into<String>, body: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data,
            fire_at: None,
        }
    }
}

#[async_trait::async_trait]
pub trait LocalNotifier: Send + Sync {
    async fn present(&self, notification: &LocalNotification) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Writes the notification to the log; the fallback when nothing else is set up.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl LocalNotifier for LogNotifier {
    async fn present(&self, n: &LocalNotification) -> Result<()> {
        tracing::info!(target: "notify", title = %n.title, body = %n.body, "local notification");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Forwards every notification into a channel. Handy for tests and for UI
/// layers that prefer to pull.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<LocalNotification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LocalNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl LocalNotifier for ChannelNotifier {
    async fn present(&self, n: &LocalNotification) -> Result<()> {
        self.tx
            .send(n.clone())
            .map_err(|_| anyhow!("notification receiver dropped"))
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Fans a notification out to every configured sink.
#[derive(Clone, Default)]
pub struct NotifierMux {
    sinks: Vec<Arc<dyn LocalNotifier>>,
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn LocalNotifier>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Log sink always; webhook sink when `webhook_url` is set.
    pub fn from_webhook(webhook_url: Option<&str>) -> Self {
        let mut mux = Self::new().with(Arc::new(LogNotifier));
        if let Some(url) = webhook_url.filter(|u| !u.trim().is_empty()) {
            mux = mux.with(Arc::new(WebhookNotifier::new(url.trim().to_string())));
        }
        mux
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait::async_trait]
impl LocalNotifier for NotifierMux {
    /// Every sink is tried; the first error (if any) is returned afterwards.
    async fn present(&self, n: &LocalNotification) -> Result<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.present(n).await {
                tracing::warn!(target: "notify", sink = sink.name(), error = ?e, "notification sink failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "mux"
    }
}
