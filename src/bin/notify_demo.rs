//! Walks a scripted deal feed through the monitor and the notification store
//! (in-memory storage, log output only).

use std::sync::Arc;

use deal_alerts::deals::{Deal, Restaurant, ScriptedDealSource};
use deal_alerts::notify::LogNotifier;
use deal_alerts::{DealAlerts, MemoryStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let source = Arc::new(ScriptedDealSource::new());
    source.push_ok(vec![
        Deal::new("1", "Two-for-one burgers"),
        Deal::new("2", "Free fries"),
    ]);
    source.push_ok(vec![
        Deal::new("1", "Two-for-one burgers"),
        Deal::new("2", "Free fries"),
        Deal::new("3", "Pizza Palace Special")
            .with_restaurant(Restaurant::Name("Pizza Palace".into()))
            .with_discount("50%"),
    ]);
    source.push_err("backend unavailable");

    let app = DealAlerts::new(
        source,
        Arc::new(MemoryStore::new()),
        Arc::new(LogNotifier),
    );
    app.initialize().await;

    for _ in 0..3 {
        let outcome = app.monitor.check_for_new_deals().await;
        println!("poll: {outcome:?}");
    }

    for n in app.notifications.notifications() {
        println!("[{}] {} - {}", n.kind, n.title, n.body);
    }
    println!("unread: {}", app.notifications.unread_count());
    println!("notify-demo done");
}
