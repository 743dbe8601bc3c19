//! I/O 上下文与执行通道的集成测试。
//!
//! # 测试目标（Why）
//! - 通道的价值在于“通道内有序、通道间并行”，两者缺一都会让收发链路出现竞态或吞吐塌缩；
//! - 上下文需支持反复启停，且停止后不得残留工作线程。

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tether_core::TetherError;
use tether_runtime::{IoContext, Lane};
use tokio::sync::{mpsc, oneshot};

fn started(threads: usize) -> IoContext {
    let ctx = IoContext::new(threads);
    ctx.start().expect("启动上下文");
    ctx
}

#[test]
fn jobs_on_one_lane_run_in_post_order() {
    let ctx = started(4);
    let lane = Lane::new(
        "ordered",
        &ctx.handle().expect("句柄"),
        ctx.cancellation().expect("令牌"),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    for index in 0..50u64 {
        let seen = Arc::clone(&seen);
        let done_tx = done_tx.clone();
        lane.post(async move {
            // 越早投递的任务等待越久，若并发执行顺序必然错乱。
            tokio::time::sleep(Duration::from_micros((50 - index) * 20)).await;
            seen.lock().push(index);
            let _ = done_tx.send(());
        })
        .expect("投递");
    }

    ctx.block_on(async {
        for _ in 0..50 {
            done_rx.recv().await.expect("任务完成信号");
        }
    })
    .expect("上下文运行中");
    assert_eq!(*seen.lock(), (0..50).collect::<Vec<_>>());
}

#[test]
fn jobs_on_one_lane_never_overlap() {
    let ctx = started(4);
    let lane = Lane::new(
        "exclusive",
        &ctx.handle().expect("句柄"),
        ctx.cancellation().expect("令牌"),
    );
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    for _ in 0..20 {
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        let done_tx = done_tx.clone();
        lane.post(async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            active.fetch_sub(1, Ordering::SeqCst);
            let _ = done_tx.send(());
        })
        .expect("投递");
    }

    ctx.block_on(async {
        for _ in 0..20 {
            done_rx.recv().await.expect("任务完成信号");
        }
    })
    .expect("上下文运行中");
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[test]
fn distinct_lanes_run_concurrently() {
    let ctx = started(2);
    let handle = ctx.handle().expect("句柄");
    let left = Lane::new("left", &handle, ctx.cancellation().expect("令牌"));
    let right = Lane::new("right", &handle, ctx.cancellation().expect("令牌"));

    // left 阻塞等待 right 的信号；若两个通道被串行化，这里会超时。
    let (signal_tx, signal_rx) = oneshot::channel::<()>();
    let (done_tx, done_rx) = oneshot::channel::<()>();
    left.post(async move {
        if signal_rx.await.is_ok() {
            let _ = done_tx.send(());
        }
    })
    .expect("投递 left");
    right
        .post(async move {
            let _ = signal_tx.send(());
        })
        .expect("投递 right");

    let outcome = ctx
        .block_on(async { tokio::time::timeout(Duration::from_secs(2), done_rx).await })
        .expect("上下文运行中");
    assert!(matches!(outcome, Ok(Ok(()))), "不同通道应当并行推进");
}

#[test]
fn lane_rejects_posts_after_context_stops() {
    let ctx = started(1);
    let lane = Lane::new(
        "dispatch",
        &ctx.handle().expect("句柄"),
        ctx.cancellation().expect("令牌"),
    );
    ctx.stop();

    let err = lane.post(async {}).expect_err("停止后投递必须失败");
    assert!(matches!(err, TetherError::LaneClosed { ref lane } if lane == "dispatch"));
    assert!(err.is_aborted());
    assert!(lane.is_closed());
}

#[test]
fn start_and_stop_are_idempotent() {
    let ctx = IoContext::new(2);
    ctx.stop();
    ctx.start().expect("首次启动");
    ctx.start().expect("重复启动为空操作");
    assert!(ctx.is_running());
    ctx.stop();
    ctx.stop();
    assert!(!ctx.is_running());
}
