use std::{future::Future, time::Duration};

use parking_lot::Mutex;
use tether_core::{Cancellation, Result, RuntimeConfig, TetherError};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info};

use crate::WORKER_THREAD_NAME;

/// 共享的 I/O 上下文：固定数量的工作线程驱动同一个反应器。
///
/// # 教案式说明
/// - **意图 (Why)**：服务端、客户端与执行通道都需要在同一组线程上注册异步操作；集中持有运行时，
///   关闭时才能一次性回收全部线程与套接字；
/// - **逻辑 (How)**：
///   1. `start` 构建多线程运行时并创建本轮运行的根取消令牌；
///   2. 依赖方通过 [`handle`](Self::handle) 注册任务，通过 [`cancellation`](Self::cancellation) 领取子令牌；
///   3. `stop` 取消根令牌后调用 `shutdown_timeout`，工作线程在有界时间内退出。
/// - **契约 (What)**：
///   - `start` 与 `stop` 均幂等，可反复交替调用；
///   - 未运行时 `handle`/`cancellation`/`block_on` 返回 [`TetherError::RuntimeNotRunning`]；
///   - `Drop` 等价于 `stop`。
/// - **风险 (Trade-offs)**：`stop` 若在工作线程内部被调用，无法同步等待自身退出，会退化为后台关闭。
#[derive(Debug)]
pub struct IoContext {
    worker_threads: usize,
    shutdown_timeout: Duration,
    running: Mutex<Option<Running>>,
}

#[derive(Debug)]
struct Running {
    runtime: Runtime,
    root: Cancellation,
}

impl IoContext {
    /// 以给定线程数创建（尚未启动的）上下文。
    pub fn new(worker_threads: usize) -> Self {
        Self::from_config(&RuntimeConfig {
            worker_threads,
            ..RuntimeConfig::default()
        })
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            worker_threads: config.worker_threads.max(1),
            shutdown_timeout: config.shutdown_timeout(),
            running: Mutex::new(None),
        }
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    /// 启动工作线程；已在运行时直接返回。
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(self.worker_threads)
            .thread_name(WORKER_THREAD_NAME)
            .enable_all()
            .build()
            .map_err(TetherError::RuntimeBuild)?;
        *running = Some(Running {
            runtime,
            root: Cancellation::new(),
        });
        info!(worker_threads = self.worker_threads, "io context started");
        Ok(())
    }

    /// 取消全部挂起的工作并等待工作线程退出；未运行时为空操作。
    pub fn stop(&self) {
        let Some(Running { runtime, root }) = self.running.lock().take() else {
            return;
        };
        root.cancel();
        if Handle::try_current().is_ok() {
            debug!("io context stopped from within an async context; shutting down in background");
            runtime.shutdown_background();
        } else {
            runtime.shutdown_timeout(self.shutdown_timeout);
        }
        info!("io context stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// 共享反应器句柄，供依赖方注册异步操作与执行通道。
    pub fn handle(&self) -> Result<Handle> {
        self.running
            .lock()
            .as_ref()
            .map(|running| running.runtime.handle().clone())
            .ok_or(TetherError::RuntimeNotRunning)
    }

    /// 派生本轮运行根令牌的子令牌；`stop` 时随根令牌一起取消。
    pub fn cancellation(&self) -> Result<Cancellation> {
        self.running
            .lock()
            .as_ref()
            .map(|running| running.root.child())
            .ok_or(TetherError::RuntimeNotRunning)
    }

    /// 在工作线程上驱动 `future` 并同步等待结果。
    ///
    /// 供同步调用方（测试、宿主的启动流程）使用；不得在异步上下文中调用。
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        let handle = self.handle()?;
        Ok(handle.block_on(future))
    }
}

impl Drop for IoContext {
    fn drop(&mut self) {
        self.stop();
    }
}
