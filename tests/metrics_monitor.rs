// tests/metrics_monitor.rs
#![cfg(feature = "strict-metrics")]
use std::sync::Arc;

use deal_alerts::deals::{Deal, ScriptedDealSource};
use deal_alerts::metrics::Metrics;
use deal_alerts::notify::LogNotifier;
use deal_alerts::storage::MemoryStore;
use deal_alerts::DealAlerts;

#[tokio::test]
async fn metrics_exposed_after_polls() {
    // Install a local recorder for the test
    let metrics = Metrics::init().expect("recorder");

    let source = Arc::new(ScriptedDealSource::new());
    source.push_ok(vec![Deal::new("a", "A")]);
    source.push_err("boom");
    source.push_ok(vec![Deal::new("a", "A"), Deal::new("b", "B")]);
    let app = DealAlerts::new(source, Arc::new(MemoryStore::new()), Arc::new(LogNotifier));
    app.initialize().await;
    for _ in 0..3 {
        app.monitor.check_for_new_deals().await;
    }

    // Scrape metrics text and check series presence by substring
    let out = metrics.render();
    assert!(out.contains("deal_monitor_polls_total"));
    assert!(out.contains("deal_monitor_poll_errors_total"));
    assert!(out.contains("deal_monitor_new_deals_total"));
    assert!(out.contains("notifications_created_total"));
    assert!(out.contains("notifications_unread"));
}
