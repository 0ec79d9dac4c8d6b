use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use web_image_cache::services::cache::{
    CachePath, ConfigManager, DeliveryQueue, HttpFetcher, ImageCacheService, RequestContext,
    RequestDisposition, WebPCodec,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        eprintln!("用法: web_image_cache <url>...");
        return Ok(());
    }

    let cache_dir = std::env::var("CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| CachePath::default_dir());
    let config_path = std::env::var("CACHE_CONFIG_PATH").ok().map(PathBuf::from);
    let config_manager = Arc::new(ConfigManager::load(config_path).await?);

    let (queue, mut delivery_loop) = DeliveryQueue::channel();
    let service = ImageCacheService::with_config_manager(
        cache_dir,
        config_manager,
        Arc::new(HttpFetcher::new()?),
        Arc::new(WebPCodec),
        queue,
    )
    .await;

    if service.initialize().await? {
        info!("缓存超过上限，已清空");
    }

    // 被丢弃的重复请求不会收到结果
    let mut pending = 0usize;
    for url in &urls {
        let disposition = service
            .request(url, RequestContext::new(), {
                let url = url.clone();
                move |outcome| match outcome {
                    Ok(delivery) => {
                        let (width, height) = delivery.resource.dimensions();
                        info!(
                            "{} -> {} ({}x{}, 来源 {:?})",
                            url, delivery.resource.key, width, height, delivery.source
                        );
                    }
                    Err(e) => error!("{} 获取失败: {}", url, e),
                }
            })
            .await;

        match disposition {
            RequestDisposition::Dropped => warn!("重复请求已丢弃: {}", url),
            _ => pending += 1,
        }
    }

    while pending > 0 && delivery_loop.next().await {
        pending -= 1;
    }

    let info = service.cache_directory_size_info().await?;
    info!(
        "缓存目录: 文件数={}, 总大小={} 字节",
        info.count, info.total_bytes
    );

    let stats = service.stats();
    info!(
        "请求={}, 命中={}, 下载={}, 失败={}",
        stats.total_requests, stats.cache_hits, stats.fetches_started, stats.failed_fetches
    );

    Ok(())
}
