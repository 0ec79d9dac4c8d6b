// 缓存路径管理
//
// 提供统一的缓存目录与缓存文件路径生成规则

use crate::services::cache::key::CacheKey;
use std::path::{Path, PathBuf};

/// 缓存路径生成器
///
/// 缓存目录是扁平的：每个缓存文件直接以缓存键命名，目录列表即索引
pub struct CachePath;

impl CachePath {
    /// 缓存根目录
    const CACHE_ROOT: &'static str = "cache";

    /// 图片缓存目录
    const IMAGES_DIR: &'static str = "images";

    /// 网络图片子目录
    const WEB_DIR: &'static str = "web";

    /// 默认的网络图片缓存目录
    ///
    /// # 返回
    /// `cache/images/web`
    pub fn default_dir() -> PathBuf {
        PathBuf::from(Self::CACHE_ROOT)
            .join(Self::IMAGES_DIR)
            .join(Self::WEB_DIR)
    }

    /// 生成缓存文件路径
    ///
    /// # 示例
    /// ```
    /// use std::path::Path;
    /// use web_image_cache::services::cache::{derive_key, CachePath};
    ///
    /// let key = derive_key("https://example.com/a.jpg");
    /// let path = CachePath::entry_path(Path::new("cache"), &key);
    /// assert_eq!(path.file_name().unwrap().to_str().unwrap(), key.as_str());
    /// ```
    pub fn entry_path(dir: &Path, key: &CacheKey) -> PathBuf {
        dir.join(key.as_str())
    }

    /// 从缓存文件路径还原缓存键
    pub fn key_of(path: &Path) -> Option<CacheKey> {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(CacheKey::from_file_name)
    }
}
