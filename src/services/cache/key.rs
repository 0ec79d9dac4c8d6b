// 缓存键生成
//
// 将资源标识（通常是图片 URL）转换为稳定的、可直接作为文件名的缓存键

use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// 缓存键
///
/// SHA-256 摘要的小写十六进制形式（64 个字符），同时也是磁盘上的文件名
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// 十六进制摘要长度
    pub const LEN: usize = 64;

    /// 获取字符串形式
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 从文件名解析缓存键
    ///
    /// 只接受 64 位小写十六进制文件名，其余返回 None
    pub fn from_file_name(name: &str) -> Option<Self> {
        let valid = name.len() == Self::LEN
            && name
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

        valid.then(|| CacheKey(name.to_string()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// 由资源标识生成缓存键
///
/// 能解析为绝对 URL 的标识先规范化（如 `HTTP://Example.com` => `http://example.com/`），
/// 其余标识按原样计算摘要。
///
/// # 示例
/// ```
/// use web_image_cache::services::cache::derive_key;
///
/// let a = derive_key("https://via.placeholder.com/200/1A20CE");
/// let b = derive_key("https://via.placeholder.com/200/1A20CE");
/// assert_eq!(a, b);
/// assert_eq!(a.as_str().len(), 64);
/// ```
pub fn derive_key(identifier: &str) -> CacheKey {
    let canonical = match Url::parse(identifier) {
        Ok(url) => url.to_string(),
        Err(_) => identifier.to_string(),
    };

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hasher.finalize();

    CacheKey(format!("{:x}", hash))
}
