use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use tokio::sync::Notify;

/// 取消原语，统一表达组件的可中断性契约。
///
/// # 设计背景（Why）
/// - 关闭流程需要自顶向下传播：`IoContext` 停止时，所有服务端、客户端与执行通道都必须退出；
///   而单独停止一个服务端时不应波及其它组件。
/// - 因此以“取消树”替代进程级全局标志：根令牌由运行时持有，各组件通过 [`Cancellation::child`]
///   派生子令牌。
///
/// # 逻辑解析（How）
/// - 每个节点持有一个 [`AtomicBool`] 与一个 [`Notify`]；`cancel` 首次置位后唤醒所有等待者，
///   并递归取消仍存活的子节点（父节点以 `Weak` 记录子节点，避免父子互相持有导致泄漏）。
/// - 派生子令牌时若父节点已取消，子令牌直接处于取消状态。
///
/// # 契约说明（What）
/// - **前置条件**：无；新令牌默认未取消。
/// - **后置条件**：`cancel` 返回 `true` 表示本次调用首次触发取消；之后 `is_cancelled` 对所有线程可见，
///   [`cancelled`](Self::cancelled) 的等待者全部返回。
///
/// # 设计取舍与风险（Trade-offs）
/// - 已失效的子节点仅在下一次派生时清理，频繁派生又长期不取消的场景会残留少量 `Weak` 记录。
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    inner: Arc<Node>,
}

#[derive(Debug, Default)]
struct Node {
    flag: AtomicBool,
    notify: Notify,
    // 子节点强引用父节点，父节点弱引用子节点：中间层令牌被丢弃后取消仍可传递。
    _parent: Option<Arc<Node>>,
    children: Mutex<Vec<Weak<Node>>>,
}

impl Cancellation {
    /// 创建处于“未取消”状态的根令牌。
    pub fn new() -> Self {
        Self::default()
    }

    /// 查询当前是否已被标记取消。
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// 将当前令牌及其全部子令牌标记为取消。
    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }

    /// 派生子令牌：父令牌取消会传播到子令牌，反之不然。
    pub fn child(&self) -> Self {
        let child = Arc::new(Node {
            _parent: Some(Arc::clone(&self.inner)),
            ..Node::default()
        });
        {
            let mut children = self.inner.children.lock();
            if !self.is_cancelled() {
                children.retain(|weak| weak.strong_count() > 0);
                children.push(Arc::downgrade(&child));
                return Self { inner: child };
            }
        }
        child.cancel();
        Self { inner: child }
    }

    /// 异步等待取消信号。
    ///
    /// 先登记等待再检查标志位，保证 `cancel` 与等待之间不存在丢失唤醒的窗口。
    pub async fn cancelled(&self) {
        loop {
            let mut notified = std::pin::pin!(self.inner.notify.notified());
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Node {
    fn cancel(&self) -> bool {
        if self
            .flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.notify.notify_waiters();
        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn cancel_is_idempotent() {
        let root = Cancellation::new();
        assert!(root.cancel(), "首次取消应返回 true");
        assert!(!root.cancel(), "重复取消应返回 false");
        assert!(root.is_cancelled());
    }

    #[test]
    fn parent_cancellation_reaches_children_only_downwards() {
        let root = Cancellation::new();
        let server = root.child();
        let lane = server.child();
        let sibling = root.child();

        assert!(server.cancel());
        assert!(lane.is_cancelled(), "子令牌应随父令牌取消");
        assert!(!root.is_cancelled(), "子令牌取消不得上溯到根");
        assert!(!sibling.is_cancelled(), "兄弟令牌不受影响");

        root.cancel();
        assert!(sibling.is_cancelled());
    }

    #[test]
    fn dropped_middle_token_still_relays_cancellation() {
        let root = Cancellation::new();
        let leaf = {
            let middle = root.child();
            middle.child()
        };
        root.cancel();
        assert!(leaf.is_cancelled(), "中间层令牌被丢弃后取消仍应传递到叶子");
    }

    #[test]
    fn child_of_cancelled_parent_starts_cancelled() {
        let root = Cancellation::new();
        root.cancel();
        assert!(root.child().is_cancelled());
    }

    #[tokio::test]
    async fn waiters_wake_on_ancestor_cancel() {
        let root = Cancellation::new();
        let grandchild = root.child().child();
        let waiter = {
            let token = grandchild.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        root.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("等待者应在超时前被唤醒")
            .expect("等待任务不应 panic");
    }
}
