//! Deal shapes as returned by the listing endpoint, plus the tolerant
//! response parser shared by every `DealSource`.

pub mod snapshot;
pub mod source;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

pub use snapshot::SnapshotStore;
pub use source::{DealSource, DealStatus, HttpDealSource, ScriptedDealSource};

/// Fallback display name when a deal carries no usable restaurant.
pub const UNKNOWN_RESTAURANT: &str = "Restaurant";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deal {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_text")]
    pub title: String,
    #[serde(
        default,
        deserialize_with = "de_restaurant",
        skip_serializing_if = "Option::is_none"
    )]
    pub restaurant: Option<Restaurant>,
    #[serde(
        default,
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub discount: Option<String>,
    /// Everything else the backend sends (description, image, prices...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The listing endpoint sends either a plain name or an embedded object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Restaurant {
    Name(String),
    Info {
        #[serde(default, deserialize_with = "de_opt_text")]
        name: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

impl Restaurant {
    pub fn display_name(&self) -> &str {
        match self {
            Restaurant::Name(n) => n,
            Restaurant::Info { name, .. } => name
                .as_deref()
                .filter(|n| !n.is_empty())
                .unwrap_or(UNKNOWN_RESTAURANT),
        }
    }
}

impl Deal {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            restaurant: None,
            discount: None,
            extra: Map::new(),
        }
    }

    pub fn with_restaurant(mut self, restaurant: Restaurant) -> Self {
        self.restaurant = Some(restaurant);
        self
    }

    pub fn with_discount(mut self, discount: impl Into<String>) -> Self {
        self.discount = Some(discount.into());
        self
    }

    pub fn restaurant_name(&self) -> &str {
        self.restaurant
            .as_ref()
            .map(Restaurant::display_name)
            .unwrap_or(UNKNOWN_RESTAURANT)
    }

    /// Copy of the deal with `restaurant` flattened to its display name.
    /// This is the shape handed to new-deal observers.
    pub fn normalized(&self) -> Deal {
        let mut d = self.clone();
        d.restaurant = Some(Restaurant::Name(self.restaurant_name().to_string()));
        d
    }
}

fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Str(String),
        Num(serde_json::Number),
    }
    Ok(match IdRepr::deserialize(d)? {
        IdRepr::Str(s) => s,
        IdRepr::Num(n) => n.to_string(),
    })
}

// Display fields are best effort: numbers and booleans are rendered as text,
// null or structured values count as absent. Only `id` can reject a deal.
fn scalar_text(v: Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn de_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?).unwrap_or_default())
}

fn de_opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?))
}

fn de_restaurant<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Restaurant>, D::Error> {
    Ok(match Value::deserialize(d)? {
        obj @ Value::Object(_) => serde_json::from_value(obj).ok(),
        other => scalar_text(other).map(Restaurant::Name),
    })
}

// --- tolerant response shapes ---

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DealsResponse {
    /// Canonical: `{ "deals": [...] }`.
    Wrapped { deals: Vec<Value> },
    /// Compatibility: a bare array.
    Bare(Vec<Value>),
    Other(serde::de::IgnoredAny),
}

/// Extract the deal list from a listing response.
///
/// `{deals: [...]}` is used when `deals` is an array, a bare array is used as
/// is, anything else yields an empty list. Entries that do not parse as a
/// deal are dropped.
pub fn parse_deals_response(body: Value) -> Vec<Deal> {
    let items = match serde_json::from_value::<DealsResponse>(body) {
        Ok(DealsResponse::Wrapped { deals }) => deals,
        Ok(DealsResponse::Bare(items)) => items,
        Ok(DealsResponse::Other(_)) | Err(_) => {
            tracing::debug!(target: "deals", "response carries no deal list");
            return Vec::new();
        }
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<Deal>(item) {
            Ok(d) => out.push(d),
            Err(e) => tracing::warn!(target: "deals", error = %e, "skipping malformed deal"),
        }
    }
    out
}

/// Keep the first occurrence of each id, preserving order.
pub fn dedupe_by_id(deals: Vec<Deal>) -> Vec<Deal> {
    let mut seen = HashSet::with_capacity(deals.len());
    deals
        .into_iter()
        .filter(|d| seen.insert(d.id.clone()))
        .collect()
}

/// Deals in `current` whose id is not present in `known`, in `current` order.
pub fn new_deals<'a>(known: &[Deal], current: &'a [Deal]) -> Vec<&'a Deal> {
    let known_ids: HashSet<&str> = known.iter().map(|d| d.id.as_str()).collect();
    current
        .iter()
        .filter(|d| !known_ids.contains(d.id.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrapped_and_bare_shapes_parse() {
        let wrapped = json!({"deals": [{"id": "a", "title": "A"}], "total": 1});
        let bare = json!([{"id": "b", "title": "B"}]);
        assert_eq!(parse_deals_response(wrapped)[0].id, "a");
        assert_eq!(parse_deals_response(bare)[0].id, "b");
    }

    #[test]
    fn unexpected_shapes_yield_nothing() {
        assert!(parse_deals_response(json!({"deals": "nope"})).is_empty());
        assert!(parse_deals_response(json!({"items": []})).is_empty());
        assert!(parse_deals_response(json!(null)).is_empty());
        assert!(parse_deals_response(json!("text")).is_empty());
    }

    #[test]
    fn numeric_ids_become_strings_and_bad_entries_drop() {
        let body = json!({"deals": [{"id": 42, "title": "x"}, {"title": "no id"}]});
        let deals = parse_deals_response(body);
        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].id, "42");
    }

    #[test]
    fn loosely_typed_display_fields_keep_the_deal() {
        let body = json!({"deals": [
            {"id": "a", "title": "ok"},
            {"id": "b", "title": null},
            {"id": "c", "title": "x", "discount": 50},
            {"id": "d", "title": 7, "restaurant": {"name": 12, "city": "Austin"}},
            {"id": "e", "restaurant": null, "discount": null},
            {"id": "f", "title": ["x"], "restaurant": 404}
        ]});
        let deals = parse_deals_response(body);
        let ids: Vec<&str> = deals.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e", "f"]);

        assert_eq!(deals[1].title, "");
        assert_eq!(deals[2].discount.as_deref(), Some("50"));
        assert_eq!(deals[3].title, "7");
        assert_eq!(deals[3].restaurant_name(), "12");
        assert_eq!(deals[4].restaurant, None);
        assert_eq!(deals[4].discount, None);
        assert_eq!(deals[5].title, "");
        assert_eq!(deals[5].normalized().restaurant_name(), "404");
    }

    #[test]
    fn restaurant_is_flattened_for_observers() {
        let obj: Deal = serde_json::from_value(json!({
            "id": "1", "title": "t", "restaurant": {"name": "Pizza Palace", "id": "r9"}
        }))
        .unwrap();
        let plain: Deal =
            serde_json::from_value(json!({"id": "2", "title": "t", "restaurant": "Taco Hut"}))
                .unwrap();
        let nameless: Deal =
            serde_json::from_value(json!({"id": "3", "title": "t", "restaurant": {"id": "r1"}}))
                .unwrap();
        let missing = Deal::new("4", "t");

        assert_eq!(
            obj.normalized().restaurant,
            Some(Restaurant::Name("Pizza Palace".into()))
        );
        assert_eq!(plain.normalized().restaurant_name(), "Taco Hut");
        assert_eq!(nameless.normalized().restaurant_name(), UNKNOWN_RESTAURANT);
        assert_eq!(missing.normalized().restaurant_name(), UNKNOWN_RESTAURANT);
    }

    #[test]
    fn extra_fields_survive_a_round_trip() {
        let v = json!({"id": "1", "title": "t", "description": "half off", "rating": 4.5});
        let d: Deal = serde_json::from_value(v).unwrap();
        assert_eq!(d.extra.get("description"), Some(&json!("half off")));
        let back = serde_json::to_value(&d).unwrap();
        assert_eq!(back["rating"], json!(4.5));
    }

    #[test]
    fn diff_keeps_fetch_order() {
        let known = vec![Deal::new("a", ""), Deal::new("b", "")];
        let current = vec![
            Deal::new("c", ""),
            Deal::new("a", ""),
            Deal::new("d", ""),
            Deal::new("b", ""),
        ];
        let ids: Vec<&str> = new_deals(&known, &current)
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "d"]);
    }

    #[test]
    fn dedupe_keeps_first() {
        let deals = vec![
            Deal::new("a", "first"),
            Deal::new("b", ""),
            Deal::new("a", "second"),
        ];
        let out = dedupe_by_id(deals);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "first");
    }
}
