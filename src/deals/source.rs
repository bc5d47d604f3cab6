use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{parse_deals_response, Deal};

#[async_trait::async_trait]
pub trait DealSource: Send + Sync {
    /// Current public deal list. An `Err` means the poll cycle is aborted;
    /// an unrecognized body is an `Ok` with no deals.
    async fn fetch_deals(&self) -> Result<Vec<Deal>>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DealStatus {
    pub id: String,
    pub status: String,
}

impl DealStatus {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }
}

/// REST listing client (`GET {base}/deals/public`).
#[derive(Clone)]
pub struct HttpDealSource {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl HttpDealSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn deals_url(&self) -> String {
        format!("{}/deals/public", self.base_url)
    }

    /// Backend status (`active`, `expired`, ...) for each requested deal.
    pub async fn fetch_statuses(&self, ids: &[String]) -> Result<Vec<DealStatus>> {
        let url = format!("{}/deals/statuses", self.base_url);
        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&serde_json::json!({ "dealIds": ids }))
            .send()
            .await
            .context("post /deals/statuses")?;
        let resp = resp
            .error_for_status()
            .map_err(|e| anyhow!("deal statuses HTTP error: {e}"))?;
        resp.json::<Vec<DealStatus>>()
            .await
            .context("parse /deals/statuses JSON")
    }
}

#[async_trait::async_trait]
impl DealSource for HttpDealSource {
    async fn fetch_deals(&self) -> Result<Vec<Deal>> {
        let resp = self
            .client
            .get(self.deals_url())
            .timeout(self.timeout)
            .send()
            .await
            .context("fetch /deals/public")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("deal listing returned HTTP {status}");
        }
        let body = resp.text().await.context("read /deals/public body")?;

        let trimmed = body.trim();
        if trimmed.is_empty() {
            tracing::warn!(target: "deals", %status, "deal listing returned an empty body");
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(v) => Ok(parse_deals_response(v)),
            Err(e) => {
                tracing::warn!(target: "deals", error = %e, "deal listing is not JSON");
                Ok(Vec::new())
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// In-process source that replays queued responses, for demos and tests.
/// Once the queue is drained it keeps returning the last successful list.
#[derive(Debug, Default)]
pub struct ScriptedDealSource {
    queue: Mutex<VecDeque<Result<Vec<Deal>, String>>>,
    last_ok: Mutex<Vec<Deal>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedDealSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_ok(&self, deals: Vec<Deal>) {
        self.queue
            .lock()
            .expect("scripted source mutex poisoned")
            .push_back(Ok(deals));
    }

    pub fn push_err(&self, msg: impl Into<String>) {
        self.queue
            .lock()
            .expect("scripted source mutex poisoned")
            .push_back(Err(msg.into()));
    }

    /// Number of fetches served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DealSource for ScriptedDealSource {
    async fn fetch_deals(&self) -> Result<Vec<Deal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let next = self
            .queue
            .lock()
            .expect("scripted source mutex poisoned")
            .pop_front();
        match next {
            Some(Ok(deals)) => {
                *self.last_ok.lock().expect("scripted source mutex poisoned") = deals.clone();
                Ok(deals)
            }
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Ok(self
                .last_ok
                .lock()
                .expect("scripted source mutex poisoned")
                .clone()),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let s = HttpDealSource::new("http://localhost:5000/api/");
        assert_eq!(s.deals_url(), "http://localhost:5000/api/deals/public");
    }

    #[tokio::test]
    async fn scripted_source_replays_then_repeats() {
        let s = ScriptedDealSource::new();
        s.push_ok(vec![Deal::new("a", "A")]);
        s.push_err("boom");
        assert_eq!(s.fetch_deals().await.unwrap().len(), 1);
        assert!(s.fetch_deals().await.is_err());
        assert_eq!(s.fetch_deals().await.unwrap()[0].id, "a");
        assert_eq!(s.calls(), 3);
    }

    #[test]
    fn status_match_is_case_insensitive() {
        let st = DealStatus {
            id: "1".into(),
            status: "Active".into(),
        };
        assert!(st.is_active());
    }
}
