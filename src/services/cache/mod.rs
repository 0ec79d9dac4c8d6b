// 缓存模块 - 网络图片磁盘缓存
//
// 本模块提供网络图片的磁盘缓存功能，包括：
// - 由资源标识派生缓存键
// - 磁盘存储与目录统计
// - 启动时按容量上限清空
// - 图片解码、等比缩放与 WebP 编码
// - 图片下载与重复请求去重
// - 结果投递

pub mod cache_manager;
pub mod cache_service;
pub mod codec;
pub mod config;
pub mod config_manager;
pub mod coordinator;
pub mod delivery;
pub mod disk_store;
pub mod error;
pub mod fetcher;
pub mod key;
pub mod path;

pub use cache_manager::{CacheManager, ImageResource};
pub use cache_service::ImageCacheService;
pub use codec::{Codec, WebPCodec};
pub use config::{CacheConfig, DuplicatePolicy, ResizePolicy};
pub use config_manager::ConfigManager;
pub use coordinator::{CoordinatorStats, DownloadCoordinator, RequestDisposition};
pub use delivery::{
    BindingSlot, DeliveryLoop, DeliveryQueue, ImageDelivery, RequestContext, RequestOutcome,
    ResultCallback, ResultSource, UpdateInfo, UpdateKind,
};
pub use disk_store::{CacheEntryInfo, DirectorySizeInfo, DiskStore};
pub use error::{CacheError, ConversionError, DownloadError, FileSystemError};
pub use fetcher::{DownloadProgress, Fetcher, HttpFetcher};
pub use key::{derive_key, CacheKey};
pub use path::CachePath;
