// 结果投递 - 将请求结果送回调用方所在的执行上下文
//
// 本模块提供：
// - 请求上下文（显式记录元素最近请求的标识、是否位于列表行中）
// - 更新信息（回显标识、是否需要刷新列表行）
// - 投递队列：下载在后台任务完成，回调在消费方驱动的循环中执行

use crate::services::cache::cache_manager::ImageResource;
use crate::services::cache::error::CacheError;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;

/// 绑定槽
///
/// 由调用方持有，记录某个显示元素最近一次请求的标识。
/// 结果投递时据此判断结果是否已过期（元素已改为显示其他图片）。
#[derive(Debug, Clone, Default)]
pub struct BindingSlot {
    current: Arc<Mutex<Option<String>>>,
}

impl BindingSlot {
    /// 创建空的绑定槽
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录最近请求的标识
    pub fn bind(&self, identifier: &str) {
        if let Ok(mut current) = self.current.lock() {
            *current = Some(identifier.to_string());
        }
    }

    /// 最近请求的标识
    pub fn current(&self) -> Option<String> {
        self.current.lock().ok().and_then(|current| current.clone())
    }

    /// 是否仍绑定到指定标识
    pub fn is_bound_to(&self, identifier: &str) -> bool {
        self.current
            .lock()
            .map(|current| current.as_deref() == Some(identifier))
            .unwrap_or(false)
    }
}

/// 单次请求的上下文
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// 请求方的绑定槽
    pub slot: Option<BindingSlot>,

    /// 请求方是否位于列表行中（网络结果到达后需要刷新该行）
    pub list_row: bool,
}

impl RequestContext {
    /// 创建默认上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 关联绑定槽
    pub fn with_slot(mut self, slot: BindingSlot) -> Self {
        self.slot = Some(slot);
        self
    }

    /// 声明请求方位于列表行中
    pub fn in_list_row(mut self) -> Self {
        self.list_row = true;
        self
    }
}

/// 结果来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSource {
    /// 磁盘缓存命中
    Cache,

    /// 网络下载
    Network,
}

/// 额外更新类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// 无需额外处理
    None,

    /// 需要刷新所在列表行
    ListRowRefresh,
}

/// 更新信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    /// 回显的标识；绑定槽已改绑到其他标识时为 None
    pub identifier: Option<String>,

    /// 额外更新类型
    pub update_kind: UpdateKind,
}

impl UpdateInfo {
    /// 在投递时计算更新信息
    fn resolve(identifier: &str, context: &RequestContext, source: ResultSource) -> Self {
        let current = match &context.slot {
            Some(slot) => slot.is_bound_to(identifier),
            None => true,
        };

        let update_kind = if context.list_row && source == ResultSource::Network {
            UpdateKind::ListRowRefresh
        } else {
            UpdateKind::None
        };

        Self {
            identifier: current.then(|| identifier.to_string()),
            update_kind,
        }
    }
}

/// 成功投递的内容
#[derive(Debug, Clone)]
pub struct ImageDelivery {
    /// 图片资源
    pub resource: ImageResource,

    /// 结果来源
    pub source: ResultSource,

    /// 更新信息
    pub update: UpdateInfo,
}

/// 请求结果
///
/// 错误用 Arc 包装，以便分发给多个等待者
pub type RequestOutcome = Result<ImageDelivery, Arc<CacheError>>;

/// 结果回调
pub type ResultCallback = Box<dyn FnOnce(RequestOutcome) + Send + 'static>;

/// 待投递的结果
pub(crate) struct Delivery {
    pub(crate) identifier: String,
    pub(crate) context: RequestContext,
    pub(crate) source: ResultSource,
    pub(crate) outcome: Result<ImageResource, Arc<CacheError>>,
    pub(crate) callback: ResultCallback,
}

impl Delivery {
    /// 在当前上下文执行回调
    fn run(self) {
        let Delivery {
            identifier,
            context,
            source,
            outcome,
            callback,
        } = self;

        let outcome = outcome.map(|resource| ImageDelivery {
            resource,
            source,
            update: UpdateInfo::resolve(&identifier, &context, source),
        });

        callback(outcome);
    }
}

/// 投递队列
#[derive(Clone)]
pub struct DeliveryQueue {
    kind: QueueKind,
}

#[derive(Clone)]
enum QueueKind {
    /// 在产生结果的上下文中直接执行回调
    Inline,

    /// 发送到消费方的投递循环中执行
    Channel(mpsc::UnboundedSender<Delivery>),
}

impl DeliveryQueue {
    /// 创建通道投递队列及对应的投递循环
    ///
    /// # 示例
    /// ```
    /// use web_image_cache::services::cache::DeliveryQueue;
    ///
    /// # async fn example() {
    /// let (queue, delivery_loop) = DeliveryQueue::channel();
    /// // 在消费方所在的任务中驱动投递循环
    /// tokio::spawn(delivery_loop.run());
    /// # drop(queue);
    /// # }
    /// ```
    pub fn channel() -> (Self, DeliveryLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            kind: QueueKind::Channel(tx),
        };
        (queue, DeliveryLoop { rx })
    }

    /// 直接投递
    pub fn inline() -> Self {
        Self {
            kind: QueueKind::Inline,
        }
    }

    /// 投递结果
    pub(crate) fn deliver(&self, delivery: Delivery) {
        match &self.kind {
            QueueKind::Inline => delivery.run(),
            QueueKind::Channel(tx) => {
                if let Err(e) = tx.send(delivery) {
                    warn!("投递循环已关闭，丢弃结果: {}", e.0.identifier);
                }
            }
        }
    }
}

/// 投递循环
///
/// 由消费方在自己的执行上下文中驱动，回调按到达顺序依次执行
pub struct DeliveryLoop {
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl DeliveryLoop {
    /// 执行下一个投递
    ///
    /// # 返回
    /// - `true`: 执行了一个回调
    /// - `false`: 所有投递队列均已释放
    pub async fn next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(delivery) => {
                delivery.run();
                true
            }
            None => false,
        }
    }

    /// 持续执行，直到所有投递队列均已释放
    pub async fn run(mut self) {
        while self.next().await {}
    }
}
