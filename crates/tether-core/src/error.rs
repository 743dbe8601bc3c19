//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为传输底座对外暴露的错误语义提供集中定义，缓冲池、运行时、UDP 收发与配置加载共用一套错误码；
//! - 区分“调用方必须处理”（资源耗尽、配置非法）与“留在连接内部消化”（套接字瞬时故障）两类路径。
//!
//! ## 设计要求（What）
//! - 所有错误派生 `thiserror::Error`，可直接交给上层 `?` 传播；
//! - 每个变体通过 [`TetherError::code`] 提供稳定字符串，日志与告警以此聚合；
//! - [`TetherError::category`] 给出处置建议，收包循环据此决定吞掉、告警还是上抛。

use std::{borrow::Cow, io, net::SocketAddr, time::Duration};

use thiserror::Error;

/// crate 内统一的 `Result` 别名。
pub type Result<T, E = TetherError> = core::result::Result<T, E>;

/// 描述一次套接字操作对应的稳定错误码与默认文案。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportOp {
    pub code: &'static str,
    pub message: &'static str,
}

impl TransportOp {
    pub const BIND: TransportOp = TransportOp {
        code: "tether.transport.udp.bind_failed",
        message: "udp bind",
    };
    pub const CONFIGURE: TransportOp = TransportOp {
        code: "tether.transport.udp.configure_failed",
        message: "udp configure",
    };
    pub const RESOLVE: TransportOp = TransportOp {
        code: "tether.transport.udp.resolve_failed",
        message: "udp resolve",
    };
    pub const CONNECT: TransportOp = TransportOp {
        code: "tether.transport.udp.connect_failed",
        message: "udp connect",
    };
    pub const RECEIVE: TransportOp = TransportOp {
        code: "tether.transport.udp.receive_failed",
        message: "udp receive",
    };
    pub const SEND: TransportOp = TransportOp {
        code: "tether.transport.udp.send_failed",
        message: "udp send",
    };
    pub const LOCAL_ADDR: TransportOp = TransportOp {
        code: "tether.transport.udp.local_addr_failed",
        message: "udp local_addr",
    };
}

/// 错误的处置分类。
///
/// # 教案式说明
/// - **意图 (Why)**：收包循环、发送回调与调用方需要在不解析文案的前提下判断“重试 / 上抛 / 忽略”；
/// - **契约 (What)**：
///   - `ResourceExhausted`：容量或并发配置不当，立即反馈给请求方，不在内部重试；
///   - `Retryable`：瞬时故障，附带建议的等待时长（`Duration::ZERO` 表示立即重试）；
///   - `Cancelled`：主动关闭导致的中止，静默吞掉；
///   - `NonRetryable`：需要人工介入的配置或编程错误。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    ResourceExhausted,
    Retryable(Duration),
    Cancelled,
    NonRetryable,
}

/// 传输底座的统一错误域。
#[derive(Debug, Error)]
pub enum TetherError {
    /// 缓冲池已无可用缓冲。
    #[error("buffer pool exhausted: all {capacity} buffers are checked out")]
    ResourceExhausted { capacity: usize },

    /// 套接字级故障，`op` 指明发生故障的操作。
    #[error("{}: {source}", .op.message)]
    Transport {
        op: TransportOp,
        #[source]
        source: io::Error,
    },

    /// 单次 IO 超过端点配置的读写超时。
    #[error("{} timed out after {timeout:?}", .op.message)]
    Timeout { op: TransportOp, timeout: Duration },

    /// 组件已停止，操作被中止。
    #[error("operation aborted: {what} has been stopped")]
    OperationAborted { what: Cow<'static, str> },

    /// 执行通道已关闭，无法继续投递任务。
    #[error("lane `{lane}` is closed")]
    LaneClosed { lane: Cow<'static, str> },

    /// I/O 上下文尚未启动或已停止。
    #[error("io context is not running")]
    RuntimeNotRunning,

    /// 构建 Tokio 运行时失败。
    #[error("failed to build io runtime: {0}")]
    RuntimeBuild(#[source] io::Error),

    /// 发送长度与缓冲不匹配等调用方参数错误。
    #[error("invalid payload: {detail}")]
    InvalidPayload { detail: Cow<'static, str> },

    /// 目标地址无法解析出任何端点。
    #[error("address `{address}` did not resolve to any endpoint")]
    Unresolved { address: String },

    /// 缓冲被归还到并非其来源的池。
    #[error("buffer from slot {index} does not belong to this pool")]
    ForeignBuffer { index: usize },

    /// 客户端已停止，拒绝继续发送。
    #[error("udp client for {peer} is closed")]
    ClientClosed { peer: SocketAddr },

    /// 配置文件读取或校验失败。
    #[error("configuration error: {detail}")]
    Config { detail: Cow<'static, str> },

    /// 全局日志订阅器安装失败。
    #[error("failed to install tracing subscriber: {detail}")]
    Observability { detail: Cow<'static, str> },
}

impl TetherError {
    /// 返回稳定错误码，用于日志聚合与告警路由。
    pub fn code(&self) -> &'static str {
        match self {
            TetherError::ResourceExhausted { .. } => "tether.buffer.exhausted",
            TetherError::Transport { op, .. } => op.code,
            TetherError::Timeout { .. } => "tether.transport.udp.timeout",
            TetherError::OperationAborted { .. } => "tether.transport.aborted",
            TetherError::LaneClosed { .. } => "tether.runtime.lane_closed",
            TetherError::RuntimeNotRunning => "tether.runtime.not_running",
            TetherError::RuntimeBuild(_) => "tether.runtime.build_failed",
            TetherError::InvalidPayload { .. } => "tether.transport.invalid_payload",
            TetherError::Unresolved { .. } => "tether.transport.udp.unresolved",
            TetherError::ForeignBuffer { .. } => "tether.buffer.foreign",
            TetherError::ClientClosed { .. } => "tether.transport.udp.client_closed",
            TetherError::Config { .. } => "tether.config.invalid",
            TetherError::Observability { .. } => "tether.observability.install_failed",
        }
    }

    /// 返回处置分类。
    ///
    /// - IO 错误依据 `ErrorKind` 细分：`TimedOut`/`WouldBlock`/`Interrupted` 与连接类错误视为可重试；
    /// - 已停止、通道关闭视为 `Cancelled`，收包循环遇到时应静默退出。
    pub fn category(&self) -> ErrorCategory {
        match self {
            TetherError::ResourceExhausted { .. } => ErrorCategory::ResourceExhausted,
            TetherError::Transport { source, .. } => categorize_io_error(source),
            TetherError::Timeout { .. } => ErrorCategory::Retryable(Duration::ZERO),
            TetherError::OperationAborted { .. }
            | TetherError::LaneClosed { .. }
            | TetherError::ClientClosed { .. } => ErrorCategory::Cancelled,
            TetherError::RuntimeNotRunning
            | TetherError::RuntimeBuild(_)
            | TetherError::InvalidPayload { .. }
            | TetherError::Unresolved { .. }
            | TetherError::ForeignBuffer { .. }
            | TetherError::Config { .. }
            | TetherError::Observability { .. } => ErrorCategory::NonRetryable,
        }
    }

    /// 是否属于主动关闭引起的中止。
    pub fn is_aborted(&self) -> bool {
        matches!(self.category(), ErrorCategory::Cancelled)
    }

    /// 便捷构造配置错误。
    pub fn config(detail: impl Into<Cow<'static, str>>) -> Self {
        TetherError::Config {
            detail: detail.into(),
        }
    }

    /// 便捷构造中止错误。
    pub fn aborted(what: impl Into<Cow<'static, str>>) -> Self {
        TetherError::OperationAborted { what: what.into() }
    }
}

/// 将 IO 错误映射为传输错误，并附带操作标识。
pub fn map_io_error(op: TransportOp, error: io::Error) -> TetherError {
    TetherError::Transport { op, source: error }
}

fn categorize_io_error(error: &io::Error) -> ErrorCategory {
    use io::ErrorKind;
    match error.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted => {
            ErrorCategory::Retryable(Duration::ZERO)
        }
        ErrorKind::ConnectionRefused
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::AddrInUse
        | ErrorKind::AddrNotAvailable
        | ErrorKind::BrokenPipe => ErrorCategory::Retryable(Duration::from_millis(5)),
        _ => ErrorCategory::NonRetryable,
    }
}
