// 缓存配置数据结构
//
// 定义了图片缓存配置的核心数据结构，包括：
// - 缓存目录的最大容量
// - 压缩质量
// - 等比缩放策略
// - 重复请求的处理策略

use serde::{Deserialize, Serialize};

/// 缓存配置（存储在 cache_config.json）
///
/// 进程内只应在首次使用前设置一次；修改后不会重新编码已有的缓存文件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// 缓存目录最大容量（字节）
    /// 启动时超过该值会整体清空缓存目录
    #[serde(default = "CacheConfig::default_max_cache_bytes")]
    pub max_cache_bytes: u64,

    /// 压缩质量（0.0 ~ 1.0）
    /// 1.0 表示无损
    #[serde(default = "CacheConfig::default_compression_quality")]
    pub compression_quality: f32,

    /// 等比缩放策略
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resize_policy: Option<ResizePolicy>,

    /// 同一资源已在下载中时，后续请求的处理方式
    #[serde(default)]
    pub duplicate_requests: DuplicatePolicy,
}

/// 等比缩放策略
///
/// 以宽度或高度为准，另一边按比例计算
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResizePolicy {
    /// 目标宽度
    Width(u32),

    /// 目标高度
    Height(u32),
}

/// 重复请求策略
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// 丢弃：后到的请求不登记回调，也不会收到结果
    #[default]
    Drop,

    /// 合并：后到的请求登记为等待者，下载完成后一起通知
    Coalesce,
}

impl CacheConfig {
    /// 默认最大容量：1 GB
    pub const DEFAULT_MAX_CACHE_BYTES: u64 = 1_000_000_000;

    fn default_max_cache_bytes() -> u64 {
        Self::DEFAULT_MAX_CACHE_BYTES
    }

    fn default_compression_quality() -> f32 {
        1.0
    }

    /// 创建配置
    pub fn new(
        max_cache_bytes: u64,
        compression_quality: f32,
        resize_policy: Option<ResizePolicy>,
    ) -> Self {
        Self {
            max_cache_bytes,
            compression_quality,
            resize_policy,
            ..Self::default()
        }
    }

    /// 设置重复请求策略
    pub fn with_duplicate_requests(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_requests = policy;
        self
    }

    /// 编码时使用的压缩质量（限制在 0.0 ~ 1.0）
    pub fn effective_quality(&self) -> f32 {
        if self.compression_quality.is_nan() {
            return 1.0;
        }
        self.compression_quality.clamp(0.0, 1.0)
    }

    /// 写入缓存前是否需要重新编码
    ///
    /// 无缩放且无损时直接保存下载到的原始数据
    pub fn needs_reencode(&self) -> bool {
        self.resize_policy.is_some() || self.effective_quality() < 1.0
    }
}

impl Default for CacheConfig {
    /// 默认配置：1 GB 上限，无损，不缩放，丢弃重复请求
    fn default() -> Self {
        Self {
            max_cache_bytes: Self::DEFAULT_MAX_CACHE_BYTES,
            compression_quality: 1.0,
            resize_policy: None,
            duplicate_requests: DuplicatePolicy::Drop,
        }
    }
}

impl ResizePolicy {
    /// 计算缩放后的尺寸
    ///
    /// # 参数
    /// - `width`, `height`: 原始尺寸
    ///
    /// # 返回
    /// 目标边为配置值，另一边四舍五入，最小为 1
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let width = width.max(1) as f64;
        let height = height.max(1) as f64;

        match *self {
            ResizePolicy::Width(target) => {
                let target = target.max(1);
                let scaled = (height * target as f64 / width).round() as u32;
                (target, scaled.max(1))
            }
            ResizePolicy::Height(target) => {
                let target = target.max(1);
                let scaled = (width * target as f64 / height).round() as u32;
                (scaled.max(1), target)
            }
        }
    }
}
