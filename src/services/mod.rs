pub mod cache;

pub use cache::{
    CacheConfig, CacheError, CachePath, ConfigManager, DeliveryQueue, ImageCacheService,
    RequestContext,
};
