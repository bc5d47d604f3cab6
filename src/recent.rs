//! Recently visited deals: newest first, capped, deduplicated by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

use crate::deals::{Deal, DealStatus, Restaurant};
use crate::storage::{get_item, set_item, KvStore, RECENTLY_VISITED_KEY};

pub const MAX_RECENT_ITEMS: usize = 10;

/// Trimmed copy of a deal kept for the "recently visited" strip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitedDeal {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restaurant: Option<Restaurant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<String>,
    /// description, image, rating, distance, restaurantId when present.
    #[serde(flatten)]
    pub details: Map<String, Value>,
    pub visited_at: DateTime<Utc>,
}

const KEPT_DETAILS: [&str; 5] = ["restaurantId", "description", "rating", "distance", "image"];

impl VisitedDeal {
    pub fn from_deal(deal: &Deal, visited_at: DateTime<Utc>) -> Self {
        let details = deal
            .extra
            .iter()
            .filter(|(k, _)| KEPT_DETAILS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            id: deal.id.clone(),
            title: deal.title.clone(),
            restaurant: deal.restaurant.clone(),
            discount: deal.discount.clone(),
            details,
            visited_at,
        }
    }
}

#[derive(Clone)]
pub struct RecentlyVisited {
    store: Arc<dyn KvStore>,
}

impl RecentlyVisited {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Newest first. Read errors yield an empty list.
    pub async fn list(&self) -> Vec<VisitedDeal> {
        match get_item::<Vec<VisitedDeal>>(self.store.as_ref(), RECENTLY_VISITED_KEY).await {
            Ok(v) => v.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(target: "storage", error = ?e, "could not read recently visited deals");
                Vec::new()
            }
        }
    }

    /// Move (or insert) `deal` to the front, keeping at most
    /// [`MAX_RECENT_ITEMS`] entries.
    pub async fn add(&self, deal: &Deal, visited_at: DateTime<Utc>) {
        let mut items = self.list().await;
        items.retain(|d| d.id != deal.id);
        items.insert(0, VisitedDeal::from_deal(deal, visited_at));
        items.truncate(MAX_RECENT_ITEMS);
        self.write(&items).await;
    }

    pub async fn remove(&self, deal_id: &str) {
        let mut items = self.list().await;
        let before = items.len();
        items.retain(|d| d.id != deal_id);
        if items.len() != before {
            self.write(&items).await;
        }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.store.remove(RECENTLY_VISITED_KEY).await {
            tracing::warn!(target: "storage", error = ?e, "could not clear recently visited deals");
        }
    }

    pub async fn contains(&self, deal_id: &str) -> bool {
        self.list().await.iter().any(|d| d.id == deal_id)
    }

    pub async fn count(&self) -> usize {
        self.list().await.len()
    }

    /// Drop entries whose backend status is not `active`. Entries missing
    /// from `statuses` count as inactive. Returns how many were removed.
    pub async fn retain_active(&self, statuses: &[DealStatus]) -> usize {
        let items = self.list().await;
        if items.is_empty() {
            return 0;
        }
        let active: HashSet<&str> = statuses
            .iter()
            .filter(|s| s.is_active())
            .map(|s| s.id.as_str())
            .collect();
        let before = items.len();
        let kept: Vec<VisitedDeal> = items
            .into_iter()
            .filter(|d| active.contains(d.id.as_str()))
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.write(&kept).await;
        }
        removed
    }

    async fn write(&self, items: &[VisitedDeal]) {
        if let Err(e) = set_item(self.store.as_ref(), RECENTLY_VISITED_KEY, items).await {
            tracing::warn!(target: "storage", error = ?e, "could not save recently visited deals");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;
    use serde_json::json;

    fn t(sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, sec).unwrap()
    }

    #[tokio::test]
    async fn revisit_moves_to_front_without_duplicates() {
        let rv = RecentlyVisited::new(Arc::new(MemoryStore::new()));
        rv.add(&Deal::new("a", "A"), t(0)).await;
        rv.add(&Deal::new("b", "B"), t(1)).await;
        rv.add(&Deal::new("a", "A"), t(2)).await;

        let ids: Vec<String> = rv.list().await.into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(rv.list().await[0].visited_at, t(2));
    }

    #[tokio::test]
    async fn list_is_capped() {
        let rv = RecentlyVisited::new(Arc::new(MemoryStore::new()));
        for i in 0..(MAX_RECENT_ITEMS as u32 + 3) {
            rv.add(&Deal::new(format!("d{i}"), "x"), t(i)).await;
        }
        let items = rv.list().await;
        assert_eq!(items.len(), MAX_RECENT_ITEMS);
        assert_eq!(items[0].id, format!("d{}", MAX_RECENT_ITEMS + 2));
    }

    #[tokio::test]
    async fn only_display_details_are_kept() {
        let deal: Deal = serde_json::from_value(json!({
            "id": "a", "title": "A", "image": "a.png", "internalScore": 9
        }))
        .unwrap();
        let v = VisitedDeal::from_deal(&deal, t(0));
        assert_eq!(v.details.get("image"), Some(&json!("a.png")));
        assert!(v.details.get("internalScore").is_none());
    }

    #[tokio::test]
    async fn inactive_and_unknown_entries_are_pruned() {
        let rv = RecentlyVisited::new(Arc::new(MemoryStore::new()));
        for id in ["a", "b", "c"] {
            rv.add(&Deal::new(id, id), t(0)).await;
        }
        let statuses = vec![
            DealStatus { id: "a".into(), status: "active".into() },
            DealStatus { id: "b".into(), status: "expired".into() },
        ];
        assert_eq!(rv.retain_active(&statuses).await, 2);
        assert!(rv.contains("a").await);
        assert_eq!(rv.count().await, 1);

        rv.remove("a").await;
        assert_eq!(rv.count().await, 0);
        rv.clear().await;
    }
}
