//! Service layer between the HTTP routes and the data/cache/pricing backends.

pub mod cache;
pub mod items;
pub mod pricing;
pub mod users;

pub use cache::{CacheError, ItemCache, RedisCache};
pub use items::ItemsService;
pub use pricing::{PriceSource, PriceSourceError, SkinportClient};
pub use users::UsersService;
