//! Deal alerts daemon.
//! Polls the deal listing, records a notification for every new deal and
//! keeps running until Ctrl-C.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use deal_alerts::metrics::Metrics;
use deal_alerts::{AppConfig, DealAlerts, FileStore, HttpDealSource, NotifierMux};

/// `RUST_LOG` wins; otherwise info for this crate and warn elsewhere.
/// `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("deal_alerts=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load().context("load config")?;
    tracing::info!(
        base_url = %cfg.deals_base_url,
        interval_ms = cfg.poll_interval_ms,
        storage = %cfg.storage_dir.display(),
        "starting deal alerts"
    );

    if let Some(addr) = cfg.metrics_addr.as_deref() {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid METRICS_ADDR {addr}"))?;
        Metrics::serve(addr)?;
        tracing::info!(%addr, "prometheus exporter listening");
    }

    let source = HttpDealSource::new(cfg.deals_base_url.clone()).with_timeout(cfg.request_timeout_secs);
    let store = FileStore::new(cfg.storage_dir.clone());
    let notifier = NotifierMux::from_webhook(cfg.notify_webhook_url.as_deref());

    let app = DealAlerts::new(Arc::new(source), Arc::new(store), Arc::new(notifier));
    app.monitor.set_poll_interval(cfg.poll_interval());
    app.initialize().await;
    app.monitor.start_monitoring();

    let mut unread = app.notifications.subscribe_unread();
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("listen for ctrl-c")?;
                break;
            }
            changed = unread.changed() => {
                if changed.is_err() {
                    break;
                }
                let n = *unread.borrow_and_update();
                tracing::info!(unread = n, "unread notifications");
            }
        }
    }

    app.monitor.stop_monitoring();
    tracing::info!(status = ?app.monitor.status(), "shutting down");
    Ok(())
}
