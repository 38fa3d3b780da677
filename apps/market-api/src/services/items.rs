//! # Items Service
//!
//! Serves `GET /items` from cached pricing API lists.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for appId in query.app_ids, tradable in [true, false]  (concurrently) │
//! │      cache.get("items:<appId>:<currency>:<tradable>")                   │
//! │          hit  → ItemGroup                                               │
//! │          miss → pricing API → cache.set(.., PX ttl) → ItemGroup         │
//! │                              │                                          │
//! │                              ▼                                          │
//! │  items::assemble()   aggregate → sort → paginate                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cache is best effort: a failed read is treated as a miss and a failed
//! write is only logged. A failed pricing API call fails the request.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use market_core::items::{self, cache_key, ItemGroup, ItemsQuery};
use market_core::types::{Currency, MarketItem};
use tracing::{debug, info, warn};

use crate::error::ApiResult;
use crate::services::{ItemCache, PriceSource};

/// Item listing backed by a [`PriceSource`] and an [`ItemCache`].
#[derive(Clone)]
pub struct ItemsService {
    source: Arc<dyn PriceSource>,
    cache: Arc<dyn ItemCache>,
    cache_ttl: Duration,
}

impl ItemsService {
    pub fn new(source: Arc<dyn PriceSource>, cache: Arc<dyn ItemCache>, cache_ttl: Duration) -> Self {
        ItemsService {
            source,
            cache,
            cache_ttl,
        }
    }

    pub async fn get_items(&self, query: &ItemsQuery) -> ApiResult<Vec<MarketItem>> {
        if query.app_ids.is_empty() {
            return Ok(Vec::new());
        }
        debug!(?query, "Items search parameters");

        let loads = query.app_ids.iter().flat_map(|&app_id| {
            [true, false]
                .into_iter()
                .map(move |tradable| self.load_group(app_id, query.currency, tradable))
        });
        let groups = try_join_all(loads).await?;

        Ok(items::assemble(&groups, query))
    }

    async fn load_group(
        &self,
        app_id: u32,
        currency: Currency,
        tradable: bool,
    ) -> ApiResult<ItemGroup> {
        let key = cache_key(app_id, currency, tradable);

        match self.cache.get(&key).await {
            Ok(Some(items)) => {
                debug!(%key, count = items.len(), "Cache hit");
                return Ok(ItemGroup {
                    app_id,
                    tradable,
                    items,
                });
            }
            Ok(None) => {}
            Err(err) => warn!(%key, error = %err, "Cache read failed, loading from pricing API"),
        }

        info!(%key, "Cache miss, loading items from pricing API");
        let items = self.source.fetch_items(app_id, currency, tradable).await?;

        if let Err(err) = self.cache.set(&key, &items, self.cache_ttl).await {
            warn!(%key, error = %err, "Cache write failed");
        }

        Ok(ItemGroup {
            app_id,
            tradable,
            items,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
