// tests/pipeline_e2e.rs
//
// Monitor -> notification store, wired the way the daemon wires them.

use std::sync::Arc;
use std::time::Duration;

use deal_alerts::deals::{Deal, Restaurant, ScriptedDealSource};
use deal_alerts::notify::ChannelNotifier;
use deal_alerts::storage::MemoryStore;
use deal_alerts::{DealAlerts, NotificationKind};

#[tokio::test]
async fn new_deal_becomes_an_unread_deal_notification() {
    let source = Arc::new(ScriptedDealSource::new());
    source.push_ok(vec![Deal::new("a", "Free fries")]);
    source.push_ok(vec![
        Deal::new("a", "Free fries"),
        Deal::new("b", "Pizza Palace Special")
            .with_restaurant(Restaurant::Name("Pizza Palace".into()))
            .with_discount("50%"),
    ]);
    let (chan, mut shown) = ChannelNotifier::new();
    let app = DealAlerts::new(source, Arc::new(MemoryStore::new()), Arc::new(chan));
    app.initialize().await;

    app.monitor.check_for_new_deals().await;
    assert!(app.notifications.notifications().is_empty());

    app.monitor.check_for_new_deals().await;
    let all = app.notifications.notifications();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].kind, NotificationKind::Deal);
    assert_eq!(all[0].body, "Check out the new deal: Pizza Palace Special");
    assert_eq!(all[0].data["dealId"], "b");
    assert_eq!(app.notifications.unread_count(), 1);

    let display = tokio::time::timeout(Duration::from_secs(1), shown.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(display.title, "New Deal Available!");
}

#[tokio::test(start_paused = true)]
async fn scheduled_polls_feed_the_unread_counter() {
    let source = Arc::new(ScriptedDealSource::new());
    source.push_ok(vec![Deal::new("a", "A")]);
    source.push_ok(vec![Deal::new("a", "A"), Deal::new("b", "B")]);
    source.push_ok(vec![
        Deal::new("a", "A"),
        Deal::new("b", "B"),
        Deal::new("c", "C"),
        Deal::new("d", "D"),
    ]);
    let (chan, _shown) = ChannelNotifier::new();
    let app = DealAlerts::new(source, Arc::new(MemoryStore::new()), Arc::new(chan));
    app.initialize().await;
    app.monitor.set_poll_interval(Duration::from_millis(1_000));
    let mut unread = app.notifications.subscribe_unread();

    app.monitor.start_monitoring();
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    app.monitor.stop_monitoring();

    assert_eq!(*unread.borrow_and_update(), 3);
    let titles: Vec<String> = app
        .notifications
        .notifications()
        .into_iter()
        .map(|n| n.body)
        .collect();
    // Newest first: d after c, both after b.
    assert_eq!(
        titles,
        vec![
            "Check out the new deal: D",
            "Check out the new deal: C",
            "Check out the new deal: B",
        ]
    );
}
