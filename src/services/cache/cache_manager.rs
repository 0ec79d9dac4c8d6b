// 缓存管理器 - 缓存配置与磁盘存储的唯一持有者
//
// 本模块负责：
// - 启动时检查缓存目录大小并按需整体清空
// - 写入缓存（按配置缩放、压缩）
// - 读取缓存（读取失败或解码失败都视为未命中）
// - 缓存目录统计

use crate::services::cache::codec::{self, Codec};
use crate::services::cache::disk_store::{DirectorySizeInfo, DiskStore};
use crate::services::cache::key::{derive_key, CacheKey};
use crate::services::cache::{CacheConfig, CacheError};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 已解码的图片资源
///
/// 内部使用 Arc，克隆代价很低，便于把同一结果分发给多个等待者
#[derive(Debug, Clone)]
pub struct ImageResource {
    /// 缓存键
    pub key: CacheKey,

    /// 原始数据（下载得到的或缓存文件中的）
    pub bytes: Arc<[u8]>,

    /// 解码后的图片
    pub image: Arc<DynamicImage>,
}

impl ImageResource {
    /// 图片尺寸
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

/// 缓存管理器
pub struct CacheManager {
    /// 缓存配置
    config: RwLock<CacheConfig>,

    /// 磁盘存储
    store: DiskStore,

    /// 图片编解码器
    codec: Arc<dyn Codec>,
}

impl CacheManager {
    /// 创建缓存管理器
    ///
    /// 不会触碰磁盘，需要再调用 [`CacheManager::initialize`]
    pub fn new(cache_dir: PathBuf, config: CacheConfig, codec: Arc<dyn Codec>) -> Self {
        Self {
            config: RwLock::new(config),
            store: DiskStore::new(cache_dir),
            codec,
        }
    }

    /// 缓存目录
    pub fn cache_dir(&self) -> &Path {
        self.store.dir()
    }

    /// 编解码器
    pub fn codec(&self) -> Arc<dyn Codec> {
        Arc::clone(&self.codec)
    }

    /// 更新缓存配置
    ///
    /// 不会重新编码已有的缓存文件
    pub async fn configure(&self, config: CacheConfig) {
        info!("更新缓存配置: {:?}", config);
        *self.config.write().await = config;
    }

    /// 当前缓存配置（克隆）
    pub async fn config(&self) -> CacheConfig {
        self.config.read().await.clone()
    }

    /// 初始化缓存目录
    ///
    /// 确保目录存在；如果目录总大小超过 `max_cache_bytes`，整体删除后重建。
    /// 这是唯一的淘汰时机，写入时不做容量检查。
    ///
    /// # 返回
    /// - `Ok(true)`: 执行了清空
    /// - `Ok(false)`: 未超过上限
    /// - `Err(CacheError)`: 目录创建、统计或删除失败
    pub async fn initialize(&self) -> Result<bool, CacheError> {
        self.store.ensure_dir().await?;

        let info = self.store.total_size().await?;
        let max_cache_bytes = self.config.read().await.max_cache_bytes;

        debug!(
            "缓存目录: {:?}, 文件数={}, 总大小={} 字节, 上限={} 字节",
            self.store.dir(),
            info.count,
            info.total_bytes,
            max_cache_bytes
        );

        if info.total_bytes <= max_cache_bytes {
            return Ok(false);
        }

        info!(
            "缓存超过上限，清空缓存目录: {} > {} 字节 (文件数={})",
            info.total_bytes, max_cache_bytes, info.count
        );

        self.store.remove_all().await?;
        self.store.ensure_dir().await?;

        Ok(true)
    }

    /// 写入缓存
    ///
    /// 配置了缩放策略或有损压缩时先重新编码，否则直接保存原始数据。
    ///
    /// # 参数
    /// - `identifier`: 资源标识
    /// - `resource`: 已解码的资源
    ///
    /// # 返回
    /// 写入的缓存键
    pub async fn store(
        &self,
        identifier: &str,
        resource: &ImageResource,
    ) -> Result<CacheKey, CacheError> {
        let key = derive_key(identifier);
        let config = self.config().await;

        if config.needs_reencode() {
            let encoded = codec::reencode_blocking(
                Arc::clone(&self.codec),
                Arc::clone(&resource.image),
                config.resize_policy,
                config.effective_quality(),
            )
            .await?;

            self.store.write(&key, &encoded).await?;
        } else {
            self.store.write(&key, &resource.bytes).await?;
        }

        debug!("已缓存图片: {} -> {}", identifier, key);
        Ok(key)
    }

    /// 读取缓存
    ///
    /// 文件不存在、读取失败、解码失败都返回 None
    pub async fn retrieve(&self, identifier: &str) -> Option<ImageResource> {
        let key = derive_key(identifier);

        let bytes: Arc<[u8]> = match self.store.read(&key).await {
            Ok(Some(bytes)) => bytes.into(),
            Ok(None) => return None,
            Err(e) => {
                warn!("读取缓存失败，视为未命中: {} - 错误: {:?}", identifier, e);
                return None;
            }
        };

        match codec::decode_blocking(Arc::clone(&self.codec), Arc::clone(&bytes)).await {
            Ok(image) => Some(ImageResource {
                key,
                bytes,
                image: Arc::new(image),
            }),
            Err(e) => {
                debug!("缓存文件解码失败，视为未命中: {} - 错误: {:?}", identifier, e);
                None
            }
        }
    }

    /// 缓存目录统计
    pub async fn size_info(&self) -> Result<DirectorySizeInfo, CacheError> {
        self.store.total_size().await
    }
}
