#![doc = r#"
# tether-transport-udp

## 模块使命（Why）
- **低延迟媒体通路**：在采集编码端与头显之间以 UDP 搬运原始负载字节，不做分帧、确认或重传；
- **池化收发**：接收与发送都从固定容量的缓冲池借出缓冲，报文处理完毕或发送完成后自动归还；
- **按对端复用**：每个远端地址只维护一个客户端与一个套接字，调用方无需自行管理连接表。

## 核心契约（What）
- [`UdpServer`]：始终保持恰好一个挂起的接收；每个非空报文绑定为 [`UdpSession`] 投递到分发通道，
  由 [`DatagramHandler`] 消费；会话释放时缓冲回池；
- [`SequencedHandler`]：包装任意处理器，按报文内嵌的 16 位序号丢弃重复与过期报文；
- [`UdpClient`]：连接到单一对端，发送在专属写通道上执行并受读写超时约束，同时观察对端回包；
- [`UdpClientPool`]：对端地址到客户端的映射，惰性创建、统一停止。

## 实现策略（How）
- 套接字经 `socket2` 创建（`SO_REUSEADDR`、放大的内核接收缓冲）后转交 Tokio；
- 收包、分发、发送三阶段各自串行、彼此并行：收包循环独占一个任务，分发与发送各用一条
  [`Lane`](tether_runtime::Lane)；
- 关闭时先取消令牌再关闭套接字，并以有界宽限期等待收包循环退出；关闭之后观察到的套接字错误以
  DEBUG 级别吞掉，其余错误以 WARN 记录后继续。
"#]

mod client;
mod client_pool;
mod handler;
mod recovery;
mod sequenced;
mod server;
mod session;
mod socket;

pub use client::UdpClient;
pub use client_pool::UdpClientPool;
pub use handler::DatagramHandler;
pub use sequenced::{SequencedHandler, leading_u16_be};
pub use server::UdpServer;
pub use session::UdpSession;
