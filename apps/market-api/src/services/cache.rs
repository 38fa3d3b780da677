//! Item list cache.
//!
//! Price lists are stored as JSON strings under
//! `items:<appId>:<currency>:<tradable>` with a millisecond expiry
//! (`SET key value PX ttl`).

use std::time::Duration;

use async_trait::async_trait;
use market_core::types::SkinportItem;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{info, instrument};

/// Cache failures.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value store for upstream price lists.
#[async_trait]
pub trait ItemCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<SkinportItem>>, CacheError>;

    async fn set(&self, key: &str, items: &[SkinportItem], ttl: Duration)
        -> Result<(), CacheError>;
}

/// Redis-backed [`ItemCache`]. Cheap to clone; the connection manager
/// reconnects on its own.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Redis");
        Ok(RedisCache { conn })
    }

    pub async fn health_check(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}

#[async_trait]
impl ItemCache for RedisCache {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Vec<SkinportItem>>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;

        match value {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, items))]
    async fn set(
        &self,
        key: &str,
        items: &[SkinportItem],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(items)?;
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);

        redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}
