use super::{LocalNotification, LocalNotifier};
use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Upper bound for [`WebhookNotifier::with_retries`].
pub const MAX_WEBHOOK_RETRIES: u8 = 8;

/// Delay before retry number `attempt` (1-based): 500 ms doubling, capped at 32 s.
fn backoff_delay(attempt: u8) -> Duration {
    let exp = u32::from(attempt.saturating_sub(1)).min(6);
    Duration::from_millis(500u64 << exp)
}

/// Posts each notification as JSON to a webhook, retrying with exponential
/// backoff (500 ms, 1 s, ...).
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.clamp(1, MAX_WEBHOOK_RETRIES);
        self
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    title: &'a str,
    body: &'a str,
    data: &'a serde_json::Map<String, serde_json::Value>,
    /// RFC 3339; absent means "now".
    #[serde(skip_serializing_if = "Option::is_none")]
    fire_at: Option<String>,
}

impl<'a> From<&'a LocalNotification> for WebhookPayload<'a> {
    fn from(n: &'a LocalNotification) -> Self {
        Self {
            title: &n.title,
            body: &n.body,
            data: &n.data,
            fire_at: n.fire_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[async_trait::async_trait]
impl LocalNotifier for WebhookNotifier {
    async fn present(&self, n: &LocalNotification) -> Result<()> {
        let payload = WebhookPayload::from(n);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("notification webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("notification webhook request failed: {e}"),
            };

            if attempt >= self.max_retries {
                return Err(err);
            }
            tracing::debug!(target: "notify", attempt, error = %err, "webhook attempt failed, backing off");
            tokio::time::sleep(backoff_delay(attempt)).await;
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn payload_carries_title_body_and_data() {
        let mut data = Map::new();
        data.insert("dealId".into(), json!("d1"));
        let n = LocalNotification::immediate("New Deal Available!", "Check out the new deal: X", data);
        let v = serde_json::to_value(WebhookPayload::from(&n)).unwrap();
        assert_eq!(v["title"], "New Deal Available!");
        assert_eq!(v["data"]["dealId"], "d1");
        assert!(v.get("fire_at").is_none());
    }

    #[test]
    fn retries_are_bounded_and_backoff_is_capped() {
        let w = WebhookNotifier::new("http://127.0.0.1:9/hook".into()).with_retries(255);
        assert_eq!(w.max_retries, MAX_WEBHOOK_RETRIES);
        assert_eq!(WebhookNotifier::new(String::new()).with_retries(0).max_retries, 1);

        assert_eq!(backoff_delay(1), Duration::from_millis(500));
        assert_eq!(backoff_delay(2), Duration::from_secs(1));
        assert_eq!(backoff_delay(7), Duration::from_secs(32));
        assert_eq!(backoff_delay(u8::MAX), Duration::from_secs(32));
    }

    #[tokio::test]
    async fn unreachable_webhook_fails_after_retries() {
        // Port 9 (discard) on localhost is closed on CI machines.
        let w = WebhookNotifier::new("http://127.0.0.1:9/hook".into())
            .with_timeout(1)
            .with_retries(1);
        let n = LocalNotification::immediate("t", "b", Map::new());
        assert!(w.present(&n).await.is_err());
    }
}
