use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::net::SocketAddr;

/// One-time metric descriptions (so series show up on the first scrape).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("deal_monitor_polls_total", "Poll cycles started.");
        describe_counter!(
            "deal_monitor_polls_skipped_total",
            "Poll requests skipped because a cycle was still running."
        );
        describe_counter!(
            "deal_monitor_poll_errors_total",
            "Poll cycles aborted by a fetch error."
        );
        describe_counter!(
            "deal_monitor_new_deals_total",
            "Deals reported as new to the observer."
        );
        describe_histogram!("deal_monitor_poll_ms", "Poll cycle duration in milliseconds.");
        describe_gauge!(
            "deal_monitor_last_poll_ts",
            "Unix ts of the last completed poll cycle."
        );
        describe_gauge!("deal_monitor_known_deals", "Deals in the current snapshot.");
        describe_counter!("notifications_created_total", "Notifications added, by type.");
        describe_counter!(
            "notifications_display_errors_total",
            "Local notification displays that failed."
        );
        describe_gauge!("notifications_unread", "Current unread notification count.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install a Prometheus recorder and keep a handle for rendering.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Install a recorder that serves `/metrics` on `addr`.
    /// Must be called from within a Tokio runtime.
    pub fn serve(addr: SocketAddr) -> Result<()> {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .with_context(|| format!("prometheus: listen on {addr}"))?;
        ensure_metrics_described();
        Ok(())
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }
}
