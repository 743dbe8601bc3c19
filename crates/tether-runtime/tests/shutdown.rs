//! 反复启停后的线程回收检查。
//!
//! 单独成为一个测试二进制：线程按名称计数，同进程内并行运行的其它测试会干扰结果。

use std::time::Duration;

use tether_runtime::IoContext;

#[cfg(target_os = "linux")]
#[test]
fn repeated_cycles_leave_no_worker_threads() {
    fn live_workers() -> usize {
        std::fs::read_dir("/proc/self/task")
            .map(|tasks| {
                tasks
                    .filter_map(|task| task.ok())
                    .filter_map(|task| std::fs::read_to_string(task.path().join("comm")).ok())
                    .filter(|comm| comm.trim_end() == tether_runtime::WORKER_THREAD_NAME)
                    .count()
            })
            .unwrap_or(0)
    }

    let ctx = IoContext::new(3);
    for _ in 0..5 {
        ctx.start().expect("启动");
        ctx.block_on(async { tokio::task::yield_now().await })
            .expect("运行中");
        ctx.stop();
    }

    // 工作线程在被 join 之后才真正从任务列表中消失，给予少量时间收敛。
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while live_workers() > 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(live_workers(), 0);
}
