// 下载协调器 - 缓存命中判断、重复请求去重、后台下载与结果投递
//
// 每个缓存键的状态：
// - 未请求：既不在下载中，也没有缓存文件
// - 下载中：键在 in_flight 表中，恰有一个下载任务在执行
// - 已缓存：缓存文件存在
// 下载失败后回到未请求状态，下次请求会重新下载。
//
// in_flight 表的“检查并插入”与“移除并取出等待者”各自在同一个临界区内完成。

use crate::services::cache::cache_manager::{CacheManager, ImageResource};
use crate::services::cache::codec;
use crate::services::cache::config::DuplicatePolicy;
use crate::services::cache::delivery::{
    Delivery, DeliveryQueue, RequestContext, RequestOutcome, ResultSource,
};
use crate::services::cache::error::{CacheError, ConversionError, DownloadError};
use crate::services::cache::fetcher::Fetcher;
use crate::services::cache::key::{derive_key, CacheKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// 单次请求的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDisposition {
    /// 缓存命中，结果已投递
    CacheHit,

    /// 已开始下载，完成后投递
    Fetching,

    /// 同一资源已在下载中，已登记为等待者
    Coalesced,

    /// 同一资源已在下载中，本次请求被丢弃，回调不会被调用
    Dropped,
}

/// 协调器统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// 收到的请求总数
    pub total_requests: u64,

    /// 缓存命中数
    pub cache_hits: u64,

    /// 发起的下载数
    pub fetches_started: u64,

    /// 合并到已有下载的请求数
    pub coalesced_requests: u64,

    /// 被丢弃的请求数
    pub dropped_requests: u64,

    /// 失败的下载数（下载失败或不是图片）
    pub failed_fetches: u64,
}

#[derive(Default)]
struct Counters {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    fetches_started: AtomicU64,
    coalesced_requests: AtomicU64,
    dropped_requests: AtomicU64,
    failed_fetches: AtomicU64,
}

/// 等待结果的请求方
struct Waiter {
    context: RequestContext,
    callback: Box<dyn FnOnce(RequestOutcome) + Send + 'static>,
}

/// 下载协调器
///
/// 克隆后共享同一个 in_flight 表
#[derive(Clone)]
pub struct DownloadCoordinator {
    /// 缓存管理器（共享引用）
    cache: Arc<CacheManager>,

    /// 下载能力
    fetcher: Arc<dyn Fetcher>,

    /// 下载中的缓存键及其等待者
    in_flight: Arc<Mutex<HashMap<CacheKey, Vec<Waiter>>>>,

    /// 结果投递队列
    delivery: DeliveryQueue,

    /// 统计计数
    counters: Arc<Counters>,
}

impl DownloadCoordinator {
    /// 创建下载协调器
    pub fn new(cache: Arc<CacheManager>, fetcher: Arc<dyn Fetcher>, delivery: DeliveryQueue) -> Self {
        Self {
            cache,
            fetcher,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            delivery,
            counters: Arc::new(Counters::default()),
        }
    }

    /// 请求图片
    ///
    /// 1. 缓存命中：投递缓存结果
    /// 2. 同一资源已在下载中：按重复请求策略丢弃或登记为等待者
    /// 3. 否则登记到 in_flight 表并在后台任务中下载
    ///
    /// 下载在后台任务中执行，本方法不会等待下载完成。
    ///
    /// # 参数
    /// - `identifier`: 资源标识（图片 URL）
    /// - `context`: 请求上下文
    /// - `on_result`: 结果回调，在投递队列对应的上下文中执行
    ///
    /// # 示例
    /// ```no_run
    /// use std::sync::Arc;
    /// use web_image_cache::services::cache::{
    ///     CacheConfig, CacheManager, DeliveryQueue, DownloadCoordinator, HttpFetcher,
    ///     RequestContext, WebPCodec,
    /// };
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let cache = Arc::new(CacheManager::new(
    ///     "cache/images/web".into(),
    ///     CacheConfig::default(),
    ///     Arc::new(WebPCodec),
    /// ));
    /// cache.initialize().await?;
    ///
    /// let coordinator = DownloadCoordinator::new(cache, Arc::new(HttpFetcher::new()?), DeliveryQueue::inline());
    /// coordinator
    ///     .request("https://example.com/a.jpg", RequestContext::new(), |outcome| match outcome {
    ///         Ok(delivery) => println!("尺寸: {:?}", delivery.resource.dimensions()),
    ///         Err(e) => eprintln!("失败: {}", e),
    ///     })
    ///     .await;
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
        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);

        let key = derive_key(identifier);
        if let Some(slot) = &context.slot {
            slot.bind(identifier);
        }

        // 1. 缓存命中
        if let Some(resource) = self.cache.retrieve(identifier).await {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("缓存命中: {}", identifier);

            self.delivery.deliver(Delivery {
                identifier: identifier.to_string(),
                context,
                source: ResultSource::Cache,
                outcome: Ok(resource),
                callback: Box::new(on_result),
            });
            return RequestDisposition::CacheHit;
        }

        let waiter = Waiter {
            context,
            callback: Box::new(on_result),
        };

        // 2. 检查并登记（同一临界区）
        {
            let mut in_flight = self.in_flight.lock().await;

            if let Some(waiters) = in_flight.get_mut(&key) {
                return match self.cache.config().await.duplicate_requests {
                    DuplicatePolicy::Drop => {
                        self.counters.dropped_requests.fetch_add(1, Ordering::Relaxed);
                        debug!("图片已在下载中，丢弃重复请求: {}", identifier);
                        RequestDisposition::Dropped
                    }
                    DuplicatePolicy::Coalesce => {
                        waiters.push(waiter);
                        self.counters.coalesced_requests.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            "图片已在下载中，等待已有下载: {} (等待者 {})",
                            identifier,
                            waiters.len()
                        );
                        RequestDisposition::Coalesced
                    }
                };
            }

            in_flight.insert(key.clone(), vec![waiter]);
        }

        // 3. 后台下载
        self.counters.fetches_started.fetch_add(1, Ordering::Relaxed);
        debug!("开始下载: {} -> {}", identifier, key);

        let coordinator = self.clone();
        let identifier = identifier.to_string();
        tokio::spawn(async move {
            coordinator.run_fetch(key, identifier).await;
        });

        RequestDisposition::Fetching
    }

    /// 当前下载中的缓存键数量
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// 指定资源是否正在下载
    pub async fn is_in_flight(&self, identifier: &str) -> bool {
        self.in_flight.lock().await.contains_key(&derive_key(identifier))
    }

    /// 统计快照
    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            total_requests: self.counters.total_requests.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            fetches_started: self.counters.fetches_started.load(Ordering::Relaxed),
            coalesced_requests: self.counters.coalesced_requests.load(Ordering::Relaxed),
            dropped_requests: self.counters.dropped_requests.load(Ordering::Relaxed),
            failed_fetches: self.counters.failed_fetches.load(Ordering::Relaxed),
        }
    }

    /// 执行下载并投递结果（后台任务）
    ///
    /// 下载在独立任务中执行；该任务 panic 时同样释放缓存键并投递错误
    async fn run_fetch(&self, key: CacheKey, identifier: String) {
        let fetch = {
            let coordinator = self.clone();
            let key = key.clone();
            let identifier = identifier.clone();
            tokio::spawn(async move { coordinator.fetch_resource(&key, &identifier).await })
        };

        let outcome = match fetch.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("下载任务异常终止: {} - 错误: {}", identifier, e);
                Err(DownloadError::TaskAborted(e.to_string()).into())
            }
        };

        if outcome.is_err() {
            self.counters.failed_fetches.fetch_add(1, Ordering::Relaxed);
        }

        self.finish(&key, &identifier, outcome.map_err(Arc::new)).await;
    }

    /// 下载、解码并写入缓存
    async fn fetch_resource(
        &self,
        key: &CacheKey,
        identifier: &str,
    ) -> Result<ImageResource, CacheError> {
        match self.fetcher.download(identifier).await {
            Ok(bytes) => self.decode_and_store(key, identifier, bytes).await,
            Err(e) => {
                warn!("图片下载失败: {} - 错误: {}", identifier, e);
                Err(CacheError::Download(e))
            }
        }
    }

    /// 解码下载到的数据并写入缓存
    ///
    /// 写入失败只记录日志，不影响本次结果
    async fn decode_and_store(
        &self,
        key: &CacheKey,
        identifier: &str,
        bytes: Vec<u8>,
    ) -> Result<ImageResource, CacheError> {
        let bytes: Arc<[u8]> = bytes.into();

        let image = match codec::decode_blocking(self.cache.codec(), Arc::clone(&bytes)).await {
            Ok(image) => image,
            Err(e) => {
                warn!("下载的数据不是图片: {} - 错误: {}", identifier, e);
                return Err(ConversionError::NotAnImage.into());
            }
        };

        let resource = ImageResource {
            key: key.clone(),
            bytes,
            image: Arc::new(image),
        };

        if let Err(e) = self.cache.store(identifier, &resource).await {
            warn!("写入缓存失败: {} - 错误: {:?}", identifier, e);
        }

        Ok(resource)
    }

    /// 移出 in_flight 表并通知所有等待者
    async fn finish(
        &self,
        key: &CacheKey,
        identifier: &str,
        outcome: Result<ImageResource, Arc<CacheError>>,
    ) {
        let waiters = self.in_flight.lock().await.remove(key).unwrap_or_default();

        if waiters.len() > 1 {
            info!("下载完成，通知 {} 个等待者: {}", waiters.len(), identifier);
        }

        for waiter in waiters {
            self.delivery.deliver(Delivery {
                identifier: identifier.to_string(),
                context: waiter.context,
                source: ResultSource::Network,
                outcome: outcome.clone(),
                callback: waiter.callback,
            });
        }
    }
}
