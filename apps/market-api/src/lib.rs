//! # Market API
//!
//! HTTP server for user balances and the item price catalogue.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Market API Services                            │
//! │                                                                         │
//! │  ┌────────────────────────────┐  ┌────────────────────────────────────┐│
//! │  │  UsersService              │  │  ItemsService                      ││
//! │  │                            │  │                                    ││
//! │  │ • get_user                 │  │ • get_items                        ││
//! │  │ • add_user                 │  │   cache → pricing API → aggregate  ││
//! │  │ • deposit  (READ COMMITTED)│  │   → sort → paginate                ││
//! │  │ • buy      (SERIALIZABLE)  │  │                                    ││
//! │  └─────────────┬──────────────┘  └───────────┬──────────────┬─────────┘│
//! │                │                             │              │          │
//! │  ┌─────────────▼──────────────┐  ┌───────────▼────┐ ┌───────▼─────────┐│
//! │  │  market-db DbClient        │  │  Redis         │ │  Skinport API   ││
//! │  │  (one per request)         │  │  SET .. PX ttl │ │  GET /items     ││
//! │  └────────────────────────────┘  └────────────────┘ └─────────────────┘│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! Environment variables (a `.env` file is loaded if present):
//! - `HOST` / `PORT` - bind address (default: 0.0.0.0:3000)
//! - `GRACE_CLOSE_DELAY` - shutdown grace period in ms (default: 500)
//! - `REQUEST_TIMEOUT_SECS` - per-request timeout (default: 30)
//! - `LOG_LEVEL` - log filter when `RUST_LOG` is unset (default: info)
//! - `SKINPORT_API_URL` - pricing API base URL
//! - `PLUGIN_TIMEOUT` - pricing API timeout in ms (default: 10000)
//! - `REQUEST_CACHE_TTL_SEC` - `Cache-Control` max-age of `GET /items` (default: 60)
//! - `SKINPORT_CACHE_TTL_MS` - expiry of cached price lists (default: 300000)
//! - `REDIS_HOST` / `REDIS_PORT` / `REDIS_DB`
//! - `PSQL_HOST` / `PSQL_PORT` / `PSQL_USERNAME` / `PSQL_PASSWORD` / `PSQL_DATABASE`
//! - `PSQL_MAX_CONNECTIONS` - pool size (default: 10)
//! - `RUN_MIGRATIONS` - apply pending migrations on startup (default: false)

use std::time::Duration;

pub mod config;
pub mod error;
pub mod routes;
pub mod services;

#[cfg(test)]
mod testing;

// Re-exports
pub use config::{AppConfig, ConfigError};
pub use error::{ApiError, ApiResult};
pub use routes::router;

use services::{ItemsService, UsersService};

/// Shared application state.
pub struct AppState<P> {
    pub users: UsersService<P>,
    pub items: ItemsService,
    /// `max-age` sent with `GET /items`
    pub request_cache_ttl: Duration,
}
