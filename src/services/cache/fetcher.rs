// 图片下载器 - 异步下载网络图片
//
// 本模块提供：
// - Fetcher 抽象（给定标识，异步返回原始数据或错误）
// - 基于 reqwest 的 HTTP 实现：
//   - URL 校验
//   - 超时控制
//   - 失败重试
//   - 并发数限制
//   - 下载进度回调

use crate::services::cache::error::{CacheError, DownloadError};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};
use url::Url;

/// 下载进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// 已接收字节数
    pub received: u64,

    /// 总字节数（服务器未提供 Content-Length 时为 None）
    pub total: Option<u64>,
}

/// 下载能力
///
/// 实现必须线程安全；下载在后台任务中执行，不会阻塞调用方
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// 下载资源
    async fn download(&self, identifier: &str) -> Result<Vec<u8>, DownloadError>;

    /// 下载资源并报告进度
    ///
    /// 默认实现忽略进度
    async fn download_with_progress(
        &self,
        identifier: &str,
        _progress: &(dyn Fn(DownloadProgress) + Send + Sync),
    ) -> Result<Vec<u8>, DownloadError> {
        self.download(identifier).await
    }
}

/// HTTP 图片下载器
pub struct HttpFetcher {
    /// HTTP 客户端（连接池）
    client: Client,

    /// 单次下载超时
    timeout: Duration,

    /// 最多尝试次数（含首次）
    max_attempts: u32,

    /// 重试间隔
    retry_delay: Duration,

    /// 下载并发控制
    download_semaphore: Arc<Semaphore>,

    /// 响应体大小上限（字节）
    max_body_bytes: u64,
}

impl HttpFetcher {
    /// 默认超时：30 秒
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// 默认最多尝试 3 次（1 次初始 + 2 次重试）
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// 默认最多 5 个同时下载
    pub const DEFAULT_MAX_CONCURRENT: usize = 5;

    /// 默认响应体上限：64 MB
    pub const DEFAULT_MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

    /// 按 Content-Length 预分配的上限：1 MB
    const MAX_PREALLOC_BYTES: u64 = 1024 * 1024;

    /// 创建新的下载器
    ///
    /// # 示例
    /// ```no_run
    /// use web_image_cache::services::cache::{Fetcher, HttpFetcher};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let fetcher = HttpFetcher::new()?;
    /// let bytes = fetcher.download("https://example.com/image.jpg").await?;
    /// println!("下载了 {} 字节", bytes.len());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new() -> Result<Self, CacheError> {
        let client = Client::builder()
            .pool_max_idle_per_host(10) // 每个主机最多保持 10 个空闲连接
            .pool_idle_timeout(Duration::from_secs(90)) // 空闲连接超时 90 秒
            .build()
            .map_err(|e| CacheError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            client,
            timeout: Self::DEFAULT_TIMEOUT,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_secs(1),
            download_semaphore: Arc::new(Semaphore::new(Self::DEFAULT_MAX_CONCURRENT)),
            max_body_bytes: Self::DEFAULT_MAX_BODY_BYTES,
        })
    }

    /// 设置单次下载超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 设置重试策略
    ///
    /// # 参数
    /// - `max_attempts`: 最多尝试次数（至少 1 次）
    /// - `retry_delay`: 重试间隔
    pub fn with_retries(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// 设置最大并发下载数
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.download_semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        self
    }

    /// 设置响应体大小上限
    pub fn with_max_body_bytes(mut self, max_body_bytes: u64) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// 校验标识是否为 http(s) URL
    fn parse_url(identifier: &str) -> Result<Url, DownloadError> {
        let url = Url::parse(identifier)
            .map_err(|e| DownloadError::InvalidUrl(format!("{}: {}", identifier, e)))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(DownloadError::InvalidUrl(format!(
                "{}: 不支持的协议 {}",
                identifier, scheme
            ))),
        }
    }

    /// 执行一次下载（内部方法）
    async fn download_once(
        &self,
        url: &Url,
        progress: &(dyn Fn(DownloadProgress) + Send + Sync),
    ) -> Result<Vec<u8>, DownloadError> {
        let _permit = self
            .download_semaphore
            .acquire()
            .await
            .map_err(|e| DownloadError::RequestError(format!("获取下载许可失败: {}", e)))?;

        match timeout(self.timeout, self.fetch_body(url, progress)).await {
            Ok(result) => result,
            Err(_) => Err(DownloadError::Timeout),
        }
    }

    /// 发送请求并分块读取响应体
    async fn fetch_body(
        &self,
        url: &Url,
        progress: &(dyn Fn(DownloadProgress) + Send + Sync),
    ) -> Result<Vec<u8>, DownloadError> {
        let mut response = self.client.get(url.clone()).send().await?;

        // 检查 HTTP 状态码
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpError(status.as_u16()));
        }

        // Content-Length 由服务器提供，不可信
        let total = response.content_length();
        if let Some(total) = total {
            if total > self.max_body_bytes {
                return Err(DownloadError::BodyTooLarge(total));
            }
        }

        let prealloc = total.map_or(0, |t| t.min(Self::MAX_PREALLOC_BYTES));
        let mut body = Vec::with_capacity(prealloc as usize);

        while let Some(chunk) = response.chunk().await? {
            let received = (body.len() + chunk.len()) as u64;
            if received > self.max_body_bytes {
                return Err(DownloadError::BodyTooLarge(received));
            }

            body.extend_from_slice(&chunk);
            trace!("下载进度: {} {}/{:?}", url, received, total);
            progress(DownloadProgress { received, total });
        }

        Ok(body)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn download(&self, identifier: &str) -> Result<Vec<u8>, DownloadError> {
        self.download_with_progress(identifier, &|_| {}).await
    }

    async fn download_with_progress(
        &self,
        identifier: &str,
        progress: &(dyn Fn(DownloadProgress) + Send + Sync),
    ) -> Result<Vec<u8>, DownloadError> {
        let url = Self::parse_url(identifier)?;
        debug!("开始下载图片: {}", url);

        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match self.download_once(&url, progress).await {
                Ok(bytes) => {
                    info!(
                        "图片下载成功: {} ({} 字节, 尝试 {}/{})",
                        url,
                        bytes.len(),
                        attempt,
                        self.max_attempts
                    );
                    return Ok(bytes);
                }
                Err(e) => {
                    warn!(
                        "图片下载失败 (尝试 {}/{}): {} - 错误: {:?}",
                        attempt, self.max_attempts, url, e
                    );

                    let retryable = e.is_retryable();
                    last_error = Some(e);

                    if !retryable {
                        break;
                    }

                    // 如果不是最后一次尝试，等待后重试
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| DownloadError::NetworkError("未知错误".to_string()));

        error!("图片下载失败: {} - 错误: {:?}", url, error);
        Err(error)
    }
}
