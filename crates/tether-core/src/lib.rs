#![doc = r#"
# tether-core

## 模块使命（Why）
- 为头显媒体传输底座的各个 crate 提供共享契约：错误分类、取消信号、回绕安全的序号比较与配置模型；
- 让 `tether-buffer`、`tether-runtime`、`tether-transport-udp` 与 `tether-headset` 在同一套错误码与
  日志约定下协作，避免各层重复定义“资源耗尽”“操作已中止”等语义。

## 核心契约（What）
- [`TetherError`]：全局错误域，每个变体携带稳定错误码（`tether.<域>.<语义>`）；
- [`Cancellation`]：可派生子令牌的取消树，根令牌由 `IoContext` 持有并向下传播；
- [`rolling_less_than`] 与 [`SequenceTracker`]：16 位序号的回绕安全比较与去重；
- [`TetherConfig`]：由 TOML 反序列化的运行参数（端口、线程数、池容量、超时）。

## 实现策略（How）
- 错误采用 `thiserror` 派生，IO 错误统一经 [`map_io_error`] 映射并附带操作标识；
- 取消树基于原子位与 `tokio::sync::Notify`，既可同步轮询也可异步等待；
- 日志统一使用 `tracing`，宿主可通过 [`observability::install_subscriber`] 一次性安装订阅器。
"#]

pub mod cancellation;
pub mod config;
pub mod error;
pub mod observability;
pub mod sequence;

pub use cancellation::Cancellation;
pub use config::{BufferConfig, ClientConfig, RuntimeConfig, ServerConfig, TetherConfig};
pub use error::{ErrorCategory, Result, TetherError, TransportOp, map_io_error};
pub use sequence::{SequenceTracker, SequenceVerdict, rolling_less_than};

/// 单个 UDP 报文允许承载的最大负载字节数。
///
/// 取值为以太网 MTU（1500）减去 IPv4 头（20）与 UDP 头（8），保证报文不会在链路层被分片。
pub const MAX_DATAGRAM_SIZE: usize = 1472;
