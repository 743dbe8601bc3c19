//! 收发循环的错误处置。
//!
//! 收包循环与回包观察任务遇到错误后都要回答同一个问题：退出、立即继续还是等待后继续。
//! 判定统一交给 [`TetherError::category`]，循环只负责执行结论。

use std::time::Duration;

use tether_core::{Cancellation, ErrorCategory, TetherError};
use tracing::{debug, error, warn};

/// 池耗尽时的退避间隔。
pub(crate) const EXHAUSTED_BACKOFF: Duration = Duration::from_millis(2);

/// 不可重试的套接字错误之后的退避间隔，避免同一错误刷屏。
pub(crate) const FAULT_BACKOFF: Duration = Duration::from_millis(10);

/// 一次错误之后循环的下一步。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Recovery {
    Exit,
    Resume,
    Backoff(Duration),
}

/// 按错误分类给出处置并记录日志。
///
/// - 令牌已取消或错误属于 `Cancelled`：DEBUG 记录后退出；
/// - `ResourceExhausted`：ERROR 记录，按池耗尽间隔退避；
/// - `Retryable`：WARN 记录，按建议时长退避，时长为零时立即继续；
/// - `NonRetryable`：WARN 记录，短暂退避后继续。
pub(crate) fn recover(err: &TetherError, cancellation: &Cancellation, stage: &'static str) -> Recovery {
    if cancellation.is_cancelled() {
        debug!(stage, error = %err, "io aborted by shutdown");
        return Recovery::Exit;
    }
    match err.category() {
        ErrorCategory::Cancelled => {
            debug!(stage, code = err.code(), error = %err, "io aborted");
            Recovery::Exit
        }
        ErrorCategory::ResourceExhausted => {
            error!(stage, code = err.code(), error = %err, "buffer pool exhausted; backing off");
            Recovery::Backoff(EXHAUSTED_BACKOFF)
        }
        ErrorCategory::Retryable(delay) => {
            warn!(stage, code = err.code(), error = %err, retry_in = ?delay, "transient io failure");
            if delay.is_zero() {
                Recovery::Resume
            } else {
                Recovery::Backoff(delay)
            }
        }
        ErrorCategory::NonRetryable => {
            warn!(stage, code = err.code(), error = %err, "io failure");
            Recovery::Backoff(FAULT_BACKOFF)
        }
    }
}

/// 在取消令牌与退避计时之间等待；返回 `false` 表示期间已被取消。
pub(crate) async fn back_off(cancellation: &Cancellation, delay: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
