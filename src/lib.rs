// 网络图片缓存库
//
// 本库提供网络图片的磁盘缓存，包括：
// - 缓存键派生与磁盘存储
// - 启动时容量检查
// - 图片下载、缩放与重新编码
// - 同一资源的下载去重与结果投递

pub mod services;

pub use services::cache::{
    derive_key, CacheConfig, CacheError, CacheKey, DeliveryQueue, DuplicatePolicy,
    ImageCacheService, RequestContext, RequestDisposition, ResizePolicy,
};
