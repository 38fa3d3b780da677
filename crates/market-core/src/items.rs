//! # Item Aggregation
//!
//! Pure logic behind `GET /items`: merging the tradable and non-tradable
//! price lists, sorting, and paging.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for appId in query.app_ids, tradable in [true, false]:                │
//! │      ItemGroup { app_id, tradable, items: Vec<SkinportItem> }          │
//! │                              │                                          │
//! │                              ▼                                          │
//! │  aggregate()   key "<appId>:<market_hash_name>"                         │
//! │                tradable group      → trade_min_price                    │
//! │                non-tradable group  → min_price       (null → 0)         │
//! │                              │                                          │
//! │                              ▼                                          │
//! │  sort_items()  by ItemSortKey, asc/desc (stable)                        │
//! │                              │                                          │
//! │                              ▼                                          │
//! │  paginate()    items[skip .. skip + limit]                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::query::SortDirection;
use crate::types::{Currency, MarketItem, SkinportItem};

/// Counter-Strike 2 on the pricing API.
pub const DEFAULT_APP_ID: u32 = 730;

/// One upstream price list: all items of an app in one tradable state.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemGroup {
    pub app_id: u32,
    pub tradable: bool,
    pub items: Vec<SkinportItem>,
}

/// Cache key of one [`ItemGroup`].
///
/// ## Example
/// ```rust
/// use market_core::items::cache_key;
/// use market_core::types::Currency;
///
/// assert_eq!(cache_key(730, Currency::Eur, true), "items:730:EUR:true");
/// ```
pub fn cache_key(app_id: u32, currency: Currency, tradable: bool) -> String {
    format!("items:{app_id}:{currency}:{tradable}")
}

// =============================================================================
// Query
// =============================================================================

/// Field `GET /items` can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemSortKey {
    AppId,
    #[default]
    MarketName,
    Currency,
    TradeMinPrice,
    MinPrice,
}

impl FromStr for ItemSortKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "appId" => Ok(ItemSortKey::AppId),
            "marketName" => Ok(ItemSortKey::MarketName),
            "currency" => Ok(ItemSortKey::Currency),
            "tradeMinPrice" => Ok(ItemSortKey::TradeMinPrice),
            "minPrice" => Ok(ItemSortKey::MinPrice),
            _ => Err(ValidationError::NotAllowed {
                field: "sortBy".to_string(),
                allowed: ["appId", "marketName", "currency", "tradeMinPrice", "minPrice"]
                    .map(String::from)
                    .to_vec(),
            }),
        }
    }
}

/// Parsed `GET /items` parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemsQuery {
    pub app_ids: Vec<u32>,
    pub currency: Currency,
    pub skip: usize,
    pub limit: usize,
    pub sort_by: ItemSortKey,
    pub order: SortDirection,
}

impl Default for ItemsQuery {
    fn default() -> Self {
        ItemsQuery {
            app_ids: vec![DEFAULT_APP_ID],
            currency: Currency::default(),
            skip: 0,
            limit: 0,
            sort_by: ItemSortKey::default(),
            order: SortDirection::Asc,
        }
    }
}

/// Parses `appId` as either a single id or a comma-separated list.
pub fn parse_app_ids(raw: &str) -> Result<Vec<u32>, ValidationError> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| ValidationError::InvalidFormat {
                    field: "appId".to_string(),
                    reason: format!("'{}' is not a number", part.trim()),
                })
        })
        .collect()
}

// =============================================================================
// Aggregation
// =============================================================================

/// Merges groups into one item per `<appId>:<market_hash_name>`.
///
/// Items keep the order in which they were first seen.
pub fn aggregate(groups: &[ItemGroup], currency: Currency) -> Vec<MarketItem> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut items: Vec<MarketItem> = Vec::new();

    for group in groups {
        for item in &group.items {
            let key = format!("{}:{}", group.app_id, item.market_hash_name);
            let slot = *index.entry(key).or_insert_with(|| {
                items.push(MarketItem {
                    app_id: group.app_id,
                    market_name: item.market_hash_name.clone(),
                    currency,
                    trade_min_price: None,
                    min_price: None,
                });
                items.len() - 1
            });

            let price = Some(item.min_price.unwrap_or(0.0));
            if group.tradable {
                items[slot].trade_min_price = price;
            } else {
                items[slot].min_price = price;
            }
        }
    }

    items
}

/// Stable sort; items with an absent price sort before any price.
pub fn sort_items(items: &mut [MarketItem], sort_by: ItemSortKey, order: SortDirection) {
    items.sort_by(|a, b| {
        let ordering = compare_by(a, b, sort_by);
        match order {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

fn compare_by(a: &MarketItem, b: &MarketItem, key: ItemSortKey) -> Ordering {
    match key {
        ItemSortKey::AppId => a.app_id.cmp(&b.app_id),
        ItemSortKey::MarketName => a.market_name.cmp(&b.market_name),
        ItemSortKey::Currency => a.currency.code().cmp(b.currency.code()),
        ItemSortKey::TradeMinPrice => compare_price(a.trade_min_price, b.trade_min_price),
        ItemSortKey::MinPrice => compare_price(a.min_price, b.min_price),
    }
}

fn compare_price(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// `items[skip .. skip + limit]`, clamped to the slice. A zero limit yields
/// an empty page.
pub fn paginate<T>(items: Vec<T>, skip: usize, limit: usize) -> Vec<T> {
    items.into_iter().skip(skip).take(limit).collect()
}

/// Aggregate, sort and page in one go.
pub fn assemble(groups: &[ItemGroup], query: &ItemsQuery) -> Vec<MarketItem> {
    let mut items = aggregate(groups, query.currency);
    sort_items(&mut items, query.sort_by, query.order);
    paginate(items, query.skip, query.limit)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, price: Option<f64>) -> SkinportItem {
        SkinportItem {
            market_hash_name: name.to_string(),
            currency: Currency::Eur,
            min_price: price,
        }
    }

    fn groups() -> Vec<ItemGroup> {
        vec![
            ItemGroup {
                app_id: 730,
                tradable: true,
                items: vec![item("B", Some(2.5)), item("A", Some(1.0))],
            },
            ItemGroup {
                app_id: 730,
                tradable: false,
                items: vec![item("A", Some(0.8)), item("C", None)],
            },
        ]
    }

    #[test]
    fn test_aggregate_merges_groups() {
        let items = aggregate(&groups(), Currency::Eur);

        assert_eq!(items.len(), 3);
        let a = items.iter().find(|i| i.market_name == "A").unwrap();
        assert_eq!(a.trade_min_price, Some(1.0));
        assert_eq!(a.min_price, Some(0.8));

        let c = items.iter().find(|i| i.market_name == "C").unwrap();
        assert_eq!(c.min_price, Some(0.0));
        assert_eq!(c.trade_min_price, None);
    }

    #[test]
    fn test_aggregate_keys_by_app() {
        let groups = vec![
            ItemGroup {
                app_id: 730,
                tradable: true,
                items: vec![item("Key", Some(2.0))],
            },
            ItemGroup {
                app_id: 570,
                tradable: true,
                items: vec![item("Key", Some(3.0))],
            },
        ];

        assert_eq!(aggregate(&groups, Currency::Usd).len(), 2);
    }

    #[test]
    fn test_sort_by_name_and_price() {
        let mut items = aggregate(&groups(), Currency::Eur);

        sort_items(&mut items, ItemSortKey::MarketName, SortDirection::Asc);
        let names: Vec<_> = items.iter().map(|i| i.market_name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);

        sort_items(&mut items, ItemSortKey::TradeMinPrice, SortDirection::Desc);
        let names: Vec<_> = items.iter().map(|i| i.market_name.as_str()).collect();
        assert_eq!(names, ["B", "A", "C"]);
    }

    #[test]
    fn test_paginate() {
        let data: Vec<u32> = (0..10).collect();

        assert_eq!(paginate(data.clone(), 2, 3), vec![2, 3, 4]);
        assert_eq!(paginate(data.clone(), 8, 5), vec![8, 9]);
        assert!(paginate(data.clone(), 0, 0).is_empty());
        assert!(paginate(data, 20, 5).is_empty());
    }

    #[test]
    fn test_assemble() {
        let query = ItemsQuery {
            skip: 1,
            limit: 1,
            ..ItemsQuery::default()
        };

        let page = assemble(&groups(), &query);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].market_name, "B");
    }

    #[test]
    fn test_parse_app_ids() {
        assert_eq!(parse_app_ids("730").unwrap(), vec![730]);
        assert_eq!(parse_app_ids("730, 570").unwrap(), vec![730, 570]);
        assert!(parse_app_ids("730,abc").is_err());
    }

    #[test]
    fn test_sort_key_parse() {
        assert_eq!(
            "tradeMinPrice".parse::<ItemSortKey>().unwrap(),
            ItemSortKey::TradeMinPrice
        );
        assert!("price".parse::<ItemSortKey>().is_err());
    }
}
