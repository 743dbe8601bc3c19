//! 全局日志订阅器的安装入口。
//!
//! 各 crate 只依赖 `tracing` 门面产生事件；是否输出、输出到哪里由宿主在进程启动时决定。
//! 未安装订阅器时，所有日志调用都是廉价的空操作。

use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

use crate::{Result, TetherError};

/// 读取过滤规则的环境变量名，语法同 `RUST_LOG`。
pub const LOG_ENV: &str = "TETHER_LOG";

/// 过滤规则缺省值。
const DEFAULT_DIRECTIVE: &str = "info";

/// 安装 `fmt + EnvFilter` 订阅器。
///
/// # 教案式说明
/// - **意图（Why）**：宿主（或集成测试）一行代码即可看到收包、状态迁移与关闭流程的日志；
/// - **逻辑（How）**：
///   1. 若进程内已存在全局订阅器，直接返回错误，不覆盖宿主的选择；
///   2. 优先读取 [`LOG_ENV`]，解析失败或未设置时回落到 `info`；
///   3. 组装 `registry + EnvFilter + fmt` 并设为全局默认。
/// - **契约（What）**：成功后不可撤销；重复调用返回 [`TetherError::Observability`]。
pub fn install_subscriber() -> Result<()> {
    if dispatcher::has_been_set() {
        return Err(TetherError::Observability {
            detail: "a global subscriber has already been set".into(),
        });
    }

    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(tracing_subscriber::fmt::layer().with_thread_names(true));
    tracing::subscriber::set_global_default(subscriber).map_err(|err| {
        TetherError::Observability {
            detail: err.to_string().into(),
        }
    })
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}
