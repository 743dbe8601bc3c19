#![doc = r#"
# tether-runtime

## 模块使命（Why）
- 收包、分发、发送三个阶段共享同一组工作线程，但各阶段内部必须严格有序；
- 以“固定线程数的多线程运行时 + 串行执行通道”取代粗粒度锁：同一通道内的任务依次执行，
  不同通道之间并行。

## 核心契约（What）
- [`IoContext`]：持有 Tokio 多线程运行时与根取消令牌，`start`/`stop` 均幂等，`Drop` 时自动停止；
- [`Lane`]：一条无界队列加一个消费任务，投递顺序即执行顺序；运行时停止后投递返回
  [`TetherError::LaneClosed`](tether_core::TetherError::LaneClosed)。

## 实现策略（How）
- 运行时以 `enable_all` 构建，线程名统一为 `tether-io`，便于在进程快照中识别；
- `stop` 先取消根令牌，让各组件的循环主动退出，再以有界超时关闭运行时。
"#]

mod context;
mod lane;

pub use context::IoContext;
pub use lane::Lane;
pub use tokio::runtime::Handle;

/// 工作线程名前缀。
pub const WORKER_THREAD_NAME: &str = "tether-io";
