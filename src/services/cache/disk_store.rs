// 磁盘存储 - 单个缓存目录内的基础文件操作
//
// 本模块提供：
// - 写入 / 读取 / 删除单个缓存文件
// - 删除整个缓存目录（唯一的淘汰手段）
// - 列出缓存文件及统计目录大小
//
// 单文件操作之间可以并行；目录级操作（整体删除、创建目录）与单文件操作互斥。

use crate::services::cache::error::{CacheError, FileSystemError};
use crate::services::cache::key::CacheKey;
use crate::services::cache::path::CachePath;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 单个缓存文件信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntryInfo {
    /// 文件名（正常情况下即缓存键）
    pub name: String,

    /// 文件大小（字节）
    pub size_bytes: u64,
}

impl CacheEntryInfo {
    /// 文件名对应的缓存键，非缓存键命名的文件返回 None
    pub fn key(&self) -> Option<CacheKey> {
        CacheKey::from_file_name(&self.name)
    }
}

/// 缓存目录统计信息
///
/// 每次都从目录重新计算，不做持久化
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySizeInfo {
    /// 文件数
    pub count: usize,

    /// 总大小（字节）
    pub total_bytes: u64,
}

/// 磁盘存储
pub struct DiskStore {
    /// 缓存目录
    dir: PathBuf,

    /// 目录锁：单文件操作持有读锁，目录级操作持有写锁
    dir_lock: RwLock<()>,
}

impl DiskStore {
    /// 创建磁盘存储（目录在首次使用时才创建）
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            dir_lock: RwLock::new(()),
        }
    }

    /// 缓存目录
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 确保缓存目录存在
    pub async fn ensure_dir(&self) -> Result<(), CacheError> {
        let _guard = self.dir_lock.write().await;
        self.create_dir().await
    }

    /// 写入缓存文件
    ///
    /// # 参数
    /// - `key`: 缓存键
    /// - `bytes`: 编码后的图片数据
    pub async fn write(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        let _guard = self.dir_lock.read().await;

        // 目录可能尚未创建或已被整体删除
        self.create_dir().await?;

        let path = CachePath::entry_path(&self.dir, key);
        fs::write(&path, bytes).await.map_err(|e| {
            FileSystemError::WriteFileFailed(format!("{}: {}", path.display(), e))
        })?;

        debug!("缓存文件已写入: {:?} ({} 字节)", path, bytes.len());
        Ok(())
    }

    /// 读取缓存文件
    ///
    /// # 返回
    /// - `Ok(Some(bytes))`: 文件存在
    /// - `Ok(None)`: 文件不存在（不是错误）
    /// - `Err(CacheError)`: 文件存在但读取失败
    pub async fn read(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        let _guard = self.dir_lock.read().await;

        let path = CachePath::entry_path(&self.dir, key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FileSystemError::ReadFileFailed(format!("{}: {}", path.display(), e)).into()),
        }
    }

    /// 删除单个缓存文件
    ///
    /// # 返回
    /// - `Ok(true)`: 已删除
    /// - `Ok(false)`: 文件本来就不存在
    pub async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let _guard = self.dir_lock.read().await;

        let path = CachePath::entry_path(&self.dir, key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FileSystemError::RemoveFailed(format!("{}: {}", path.display(), e)).into()),
        }
    }

    /// 删除整个缓存目录
    ///
    /// # 返回
    /// - `Ok(true)`: 已删除
    /// - `Ok(false)`: 目录本来就不存在
    pub async fn remove_all(&self) -> Result<bool, CacheError> {
        let _guard = self.dir_lock.write().await;

        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                info!("已删除缓存目录: {:?}", self.dir);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FileSystemError::RemoveFailed(format!("{}: {}", self.dir.display(), e)).into()),
        }
    }

    /// 列出缓存文件（按文件名排序，跳过子目录）
    ///
    /// 目录不存在时返回空列表
    pub async fn list(&self) -> Result<Vec<CacheEntryInfo>, CacheError> {
        let _guard = self.dir_lock.read().await;

        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FileSystemError::IoError(e).into()),
        };

        let mut list = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(FileSystemError::IoError)? {
            let metadata = entry.metadata().await.map_err(FileSystemError::IoError)?;
            if !metadata.is_file() {
                continue;
            }

            list.push(CacheEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                size_bytes: metadata.len(),
            });
        }

        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    /// 统计缓存目录的文件数与总大小
    pub async fn total_size(&self) -> Result<DirectorySizeInfo, CacheError> {
        let list = self.list().await?;

        Ok(DirectorySizeInfo {
            count: list.len(),
            total_bytes: list.iter().map(|entry| entry.size_bytes).sum(),
        })
    }

    /// 创建缓存目录（调用方负责持锁）
    async fn create_dir(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            FileSystemError::CreateDirFailed(format!("{}: {}", self.dir.display(), e)).into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::key::derive_key;
    use tempfile::TempDir;

    fn create_test_store() -> (DiskStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::new(temp_dir.path().join("images"));
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_write_creates_dir_lazily() {
        let (store, _temp_dir) = create_test_store();
        assert!(!store.dir().exists());

        let key = derive_key("https://example.com/a.jpg");
        store.write(&key, b"abc").await.unwrap();

        assert!(store.dir().exists());
        assert_eq!(store.read(&key).await.unwrap(), Some(b"abc".to_vec()));
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let (store, _temp_dir) = create_test_store();
        let key = derive_key("https://example.com/missing.jpg");

        assert_eq!(store.read(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove() {
        let (store, _temp_dir) = create_test_store();
        let key = derive_key("https://example.com/a.jpg");

        store.write(&key, b"abc").await.unwrap();
        assert!(store.remove(&key).await.unwrap());
        assert!(!store.remove(&key).await.unwrap());
        assert_eq!(store.read(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_sorted_and_sizes() {
        let (store, _temp_dir) = create_test_store();

        let keys: Vec<_> = (0..5)
            .map(|i| derive_key(&format!("https://example.com/{}.jpg", i)))
            .collect();
        for (i, key) in keys.iter().enumerate() {
            store.write(key, &vec![0u8; i + 1]).await.unwrap();
        }

        // 子目录不计入
        std::fs::create_dir_all(store.dir().join("nested")).unwrap();

        let list = store.list().await.unwrap();
        assert_eq!(list.len(), 5);
        assert!(list.windows(2).all(|w| w[0].name < w[1].name));
        assert!(list.iter().all(|entry| entry.key().is_some()));

        let info = store.total_size().await.unwrap();
        assert_eq!(info.count, 5);
        assert_eq!(info.total_bytes, 1 + 2 + 3 + 4 + 5);
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let (store, _temp_dir) = create_test_store();

        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(store.total_size().await.unwrap(), DirectorySizeInfo::default());
    }

    #[tokio::test]
    async fn test_remove_all() {
        let (store, _temp_dir) = create_test_store();
        let key = derive_key("https://example.com/a.jpg");

        store.write(&key, b"abc").await.unwrap();
        assert!(store.remove_all().await.unwrap());
        assert!(!store.dir().exists());
        assert!(!store.remove_all().await.unwrap());

        store.ensure_dir().await.unwrap();
        assert!(store.dir().exists());
        assert_eq!(store.total_size().await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_ensure_dir_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();

        // 父路径是普通文件，无法创建目录
        let store = DiskStore::new(blocker.join("images"));
        let result = store.ensure_dir().await;

        assert!(matches!(
            result,
            Err(CacheError::FileSystem(FileSystemError::CreateDirFailed(_)))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_writes() {
        let (store, _temp_dir) = create_test_store();
        let store = std::sync::Arc::new(store);

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                tokio::spawn(async move {
                    let key = derive_key(&format!("https://example.com/{}.jpg", i));
                    store.write(&key, &[i as u8; 16]).await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let info = store.total_size().await.unwrap();
        assert_eq!(info.count, 10);
        assert_eq!(info.total_bytes, 160);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_remove_all_during_writes() {
        let (store, _temp_dir) = create_test_store();
        let store = std::sync::Arc::new(store);
        store.ensure_dir().await.unwrap();

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = std::sync::Arc::clone(&store);
                tokio::spawn(async move {
                    let mut written = Vec::new();
                    for i in 0..50 {
                        let key = derive_key(&format!("https://example.com/{}/{}.jpg", w, i));
                        if store.write(&key, &[w as u8; 32]).await.is_ok() {
                            written.push(key);
                        }
                    }
                    written
                })
            })
            .collect();

        let wiper = {
            let store = std::sync::Arc::clone(&store);
            tokio::spawn(async move {
                for _ in 0..20 {
                    store.remove_all().await.unwrap();
                    store.ensure_dir().await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        wiper.await.unwrap();
        let mut written = Vec::new();
        for writer in writers {
            written.extend(writer.await.unwrap());
        }

        // 写入要么成功，要么被整体删除清掉；不会留下半写的文件
        assert!(store.dir().is_dir());
        for entry in store.list().await.unwrap() {
            assert_eq!(entry.size_bytes, 32);
            assert!(written.contains(&entry.key().unwrap()));
        }
    }
}
