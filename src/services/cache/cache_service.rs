// 图片缓存服务 - 组合缓存管理器与下载协调器，提供统一的对外接口
//
// 本模块是缓存功能的入口，负责：
// - 启动时初始化缓存目录（超过上限时清空）
// - 更新缓存配置
// - 请求图片（缓存命中 / 去重下载）
// - 提供缓存目录统计

use crate::services::cache::{
    CacheConfig, CacheError, CacheManager, Codec, ConfigManager, CoordinatorStats, DeliveryQueue,
    DirectorySizeInfo, DownloadCoordinator, Fetcher, RequestContext, RequestDisposition,
    RequestOutcome, ResizePolicy,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// 图片缓存服务
///
/// 克隆后共享同一份缓存与下载状态
#[derive(Clone)]
pub struct ImageCacheService {
    /// 缓存管理器
    cache: Arc<CacheManager>,

    /// 下载协调器
    coordinator: DownloadCoordinator,

    /// 配置管理器（可选，设置后配置变更会持久化）
    config_manager: Option<Arc<ConfigManager>>,
}

impl ImageCacheService {
    /// 创建新的图片缓存服务
    ///
    /// 不会触碰磁盘，需要再调用 [`ImageCacheService::initialize`]
    ///
    /// # 参数
    /// - `cache_dir`: 缓存目录路径（相对或绝对路径）
    /// - `config`: 初始缓存配置
    /// - `fetcher`: 下载能力
    /// - `codec`: 图片编解码能力
    /// - `delivery`: 结果投递队列
    pub fn new(
        cache_dir: PathBuf,
        config: CacheConfig,
        fetcher: Arc<dyn Fetcher>,
        codec: Arc<dyn Codec>,
        delivery: DeliveryQueue,
    ) -> Self {
        let cache = Arc::new(CacheManager::new(cache_dir, config, codec));
        let coordinator = DownloadCoordinator::new(Arc::clone(&cache), fetcher, delivery);

        Self {
            cache,
            coordinator,
            config_manager: None,
        }
    }

    /// 从配置管理器创建服务，之后的配置变更会写回配置文件
    pub async fn with_config_manager(
        cache_dir: PathBuf,
        config_manager: Arc<ConfigManager>,
        fetcher: Arc<dyn Fetcher>,
        codec: Arc<dyn Codec>,
        delivery: DeliveryQueue,
    ) -> Self {
        let config = config_manager.get_config().await;
        let mut service = Self::new(cache_dir, config, fetcher, codec, delivery);
        service.config_manager = Some(config_manager);
        service
    }

    /// 初始化缓存目录
    ///
    /// 应在第一次请求之前调用一次
    ///
    /// # 返回
    /// - `Ok(true)`: 缓存超过上限，已清空
    /// - `Ok(false)`: 缓存未超过上限
    /// - `Err(CacheError)`: 目录无法创建或清空
    pub async fn initialize(&self) -> Result<bool, CacheError> {
        info!("初始化图片缓存: {:?}", self.cache.cache_dir());
        self.cache.initialize().await
    }

    /// 更新缓存配置
    ///
    /// 只影响之后写入的缓存文件；上限在下次初始化时生效。
    /// 重复请求策略保持不变。
    ///
    /// # 参数
    /// - `max_cache_bytes`: 缓存目录大小上限（字节）
    /// - `compression_quality`: 压缩质量（0.0 ~ 1.0）
    /// - `resize_policy`: 缩放策略
    pub async fn configure(
        &self,
        max_cache_bytes: u64,
        compression_quality: f32,
        resize_policy: Option<ResizePolicy>,
    ) -> Result<(), CacheError> {
        let current = self.cache.config().await;
        let config = CacheConfig::new(max_cache_bytes, compression_quality, resize_policy)
            .with_duplicate_requests(current.duplicate_requests);

        self.configure_with(config).await
    }

    /// 以完整配置替换当前配置
    pub async fn configure_with(&self, config: CacheConfig) -> Result<(), CacheError> {
        if let Some(config_manager) = &self.config_manager {
            config_manager.update_config(config.clone()).await?;
        }

        self.cache.configure(config).await;
        Ok(())
    }

    /// 当前缓存配置
    pub async fn config(&self) -> CacheConfig {
        self.cache.config().await
    }

    /// 缓存目录统计（文件数与总字节数）
    pub async fn cache_directory_size_info(&self) -> Result<DirectorySizeInfo, CacheError> {
        let info = self.cache.size_info().await?;
        debug!("缓存目录统计: 文件数={}, 总大小={} 字节", info.count, info.total_bytes);
        Ok(info)
    }

    /// 请求图片
    ///
    /// 参见 [`DownloadCoordinator::request`]
    ///
    /// # 示例
    /// ```no_run
    /// use std::sync::Arc;
    /// use web_image_cache::services::cache::{
    ///     CacheConfig, CachePath, DeliveryQueue, HttpFetcher, ImageCacheService,
    ///     RequestContext, WebPCodec,
    /// };
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let (queue, delivery_loop) = DeliveryQueue::channel();
    /// let service = ImageCacheService::new(
    ///     CachePath::default_dir(),
    ///     CacheConfig::default(),
    ///     Arc::new(HttpFetcher::new()?),
    ///     Arc::new(WebPCodec),
    ///     queue,
    /// );
    /// service.initialize().await?;
    ///
    /// service
    ///     .request("https://example.com/a.jpg", RequestContext::new(), |outcome| {
    ///         if let Ok(delivery) = outcome {
    ///             println!("来源: {:?}", delivery.source);
    ///         }
    ///     })
    ///     .await;
    ///
    /// tokio::spawn(delivery_loop.run());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn request<F>(
        &self,
        identifier: &str,
        context: RequestContext,
        on_result: F,
    ) -> RequestDisposition
    where
        F: FnOnce(RequestOutcome) + Send + 'static,
    {
        self.coordinator.request(identifier, context, on_result).await
    }

    /// 下载协调器统计
    pub fn stats(&self) -> CoordinatorStats {
        self.coordinator.stats()
    }

    /// 缓存管理器
    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// 下载协调器
    pub fn coordinator(&self) -> &DownloadCoordinator {
        &self.coordinator
    }
}
