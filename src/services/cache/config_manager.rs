// 缓存配置持久化
//
// cache_config.json 中保存一份 CacheConfig：
// - 文件缺失时写入默认配置
// - 文件无法解析时改名为 *.json.backup 并回退到默认配置
// - 写入先落到临时文件再改名，避免留下半写的配置

use crate::services::cache::error::FileSystemError;
use crate::services::cache::{CacheConfig, CacheError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 配置文件的读取结果
enum ConfigFile {
    /// 文件不存在
    Missing,

    /// 解析成功
    Parsed(CacheConfig),

    /// 内容不是合法的配置
    Corrupted(serde_json::Error),

    /// 文件存在但读取失败
    Unreadable(std::io::Error),
}

/// 配置管理器
///
/// 内存中的配置与配置文件保持一致；更新只有在写入文件成功后才生效
pub struct ConfigManager {
    /// 配置文件路径
    config_path: PathBuf,

    /// 当前配置
    config: Arc<RwLock<CacheConfig>>,
}

impl ConfigManager {
    /// 默认配置文件路径
    const DEFAULT_CONFIG_PATH: &'static str = "cache_config.json";

    /// 加载配置
    ///
    /// # 参数
    /// - `config_path`: 配置文件路径，None 时使用 `cache_config.json`
    ///
    /// # 返回
    /// 只有在需要写入默认配置而写入失败时返回错误
    ///
    /// # 示例
    /// ```no_run
    /// use web_image_cache::services::cache::ConfigManager;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let manager = ConfigManager::load(None).await?;
    /// let config = manager.get_config().await;
    /// println!("最大缓存: {} 字节", config.max_cache_bytes);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn load(config_path: Option<PathBuf>) -> Result<Self, CacheError> {
        let config_path =
            config_path.unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_PATH));

        let (config, write_defaults) = match Self::read_config_file(&config_path).await {
            ConfigFile::Parsed(config) => {
                info!("已加载缓存配置: {:?}", config_path);
                (config, false)
            }
            ConfigFile::Missing => {
                info!("配置文件不存在，写入默认配置: {:?}", config_path);
                (CacheConfig::default(), true)
            }
            ConfigFile::Corrupted(e) => {
                warn!("配置文件无法解析，回退到默认配置: {:?} - 错误: {}", config_path, e);
                let backed_up = Self::backup_corrupted_config(&config_path).await;
                (CacheConfig::default(), backed_up)
            }
            ConfigFile::Unreadable(e) => {
                // 不覆盖无法读取的文件
                warn!("读取配置文件失败，使用默认配置: {:?} - 错误: {}", config_path, e);
                (CacheConfig::default(), false)
            }
        };

        if write_defaults {
            Self::write_config_file(&config_path, &config).await?;
        }

        Ok(Self {
            config_path,
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// 将当前配置写入文件
    pub async fn save(&self) -> Result<(), CacheError> {
        let config = self.config.read().await.clone();
        Self::write_config_file(&self.config_path, &config).await
    }

    /// 替换配置
    ///
    /// 先写入文件，成功后再替换内存中的配置；写入失败时保持原配置
    pub async fn update_config(&self, new_config: CacheConfig) -> Result<(), CacheError> {
        let mut config = self.config.write().await;
        Self::write_config_file(&self.config_path, &new_config).await?;

        debug!("缓存配置已更新: {:?} -> {:?}", *config, new_config);
        *config = new_config;
        Ok(())
    }

    /// 当前配置（克隆）
    pub async fn get_config(&self) -> CacheConfig {
        self.config.read().await.clone()
    }

    /// 配置文件路径
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    async fn read_config_file(path: &Path) -> ConfigFile {
        match fs::read_to_string(path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => ConfigFile::Parsed(config),
                Err(e) => ConfigFile::Corrupted(e),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => ConfigFile::Missing,
            Err(e) => ConfigFile::Unreadable(e),
        }
    }

    /// 写入配置文件（临时文件 + 改名）
    async fn write_config_file(path: &Path, config: &CacheConfig) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(config)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                FileSystemError::CreateDirFailed(format!("{}: {}", parent.display(), e))
            })?;
        }

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).await.map_err(|e| {
            FileSystemError::WriteFileFailed(format!("{}: {}", tmp_path.display(), e))
        })?;
        fs::rename(&tmp_path, path).await.map_err(|e| {
            FileSystemError::WriteFileFailed(format!("{}: {}", path.display(), e))
        })?;

        info!("已保存缓存配置: {:?}", path);
        Ok(())
    }

    /// 将损坏的配置文件改名为 *.json.backup
    ///
    /// # 返回
    /// 是否已移走原文件（移走后才能写入默认配置）
    async fn backup_corrupted_config(path: &Path) -> bool {
        let backup_path = path.with_extension("json.backup");

        match fs::rename(path, &backup_path).await {
            Ok(()) => {
                info!("已备份损坏的配置文件: {:?}", backup_path);
                true
            }
            Err(e) => {
                warn!("备份损坏的配置文件失败: {:?} - 错误: {}", path, e);
                false
            }
        }
    }
}
