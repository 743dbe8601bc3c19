use std::{borrow::Cow, fmt, future::Future, sync::Arc};

use futures::future::BoxFuture;
use tether_core::{Cancellation, Result, TetherError};
use tokio::{runtime::Handle, sync::mpsc};
use tracing::{debug, trace};

/// 串行执行通道：投递到同一通道的任务按投递顺序逐个执行。
///
/// # 设计背景（Why）
/// - 收包完成、分发处理与发送三个阶段各自需要“同一时刻只有一个任务在跑”，
///   但阶段之间应当并行；用锁保护整个阶段会让工作线程阻塞在锁上；
/// - 通道把互斥转化为排队：任务在消费者任务中依次 `await`，不同通道的消费者由运行时并行调度。
///
/// # 逻辑解析（How）
/// - 一条无界 `mpsc` 队列加一个消费任务；`post` 同步入队，不等待执行；
/// - 消费任务在取消令牌触发或所有发送端释放后退出，未执行的任务随队列一起丢弃。
///
/// # 契约说明（What）
/// - **顺序**：同一通道内严格按 `post` 顺序执行，前一个任务完成后下一个才开始；
/// - **失败**：消费任务退出后 `post` 返回 [`TetherError::LaneClosed`]；
/// - **克隆**：`Clone` 得到的句柄投递到同一队列。
#[derive(Clone)]
pub struct Lane {
    name: Arc<str>,
    sender: mpsc::UnboundedSender<BoxFuture<'static, ()>>,
}

impl Lane {
    /// 在 `handle` 上创建通道并启动消费任务。
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        handle: &Handle,
        cancellation: Cancellation,
    ) -> Self {
        let name: Arc<str> = Arc::from(name.into().as_ref());
        let (sender, mut receiver) = mpsc::unbounded_channel::<BoxFuture<'static, ()>>();
        let lane = Arc::clone(&name);
        handle.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => break,
                    job = receiver.recv() => match job {
                        Some(job) => job.await,
                        None => break,
                    },
                }
            }
            receiver.close();
            debug!(lane = %lane, "lane drained");
        });
        Self { name, sender }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 追加任务到通道尾部。
    pub fn post<F>(&self, job: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.sender.send(Box::pin(job)).map_err(|_| {
            trace!(lane = %self.name, "post rejected");
            TetherError::LaneClosed {
                lane: Cow::Owned(self.name.to_string()),
            }
        })
    }

    /// 消费任务是否已退出。
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl fmt::Debug for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lane")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}
