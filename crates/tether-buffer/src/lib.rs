//! `tether-buffer` 提供媒体链路共享的固定容量缓冲池。
//!
//! # 模块定位（Why）
//! - 编码端、发送端、接收循环与解码端在不同线程上交替持有同一批缓冲；每帧都向系统申请内存会在
//!   高帧率下造成分配抖动；
//! - 池在构造时一次性创建全部缓冲，此后只在“可用”与“借出”之间流转，内存占用可预期。
//!
//! # 设计概要（How）
//! - [`SizedBuffer`] 只描述“地址 + 长度”的能力，外部编解码器可提供自己的实现；默认实现为
//!   [`HeapBuffer`]（零填充的 `BytesMut`）；
//! - [`BufferPool`] 以“槽位表 + 空闲下标队列”组织，借出与归还均为 O(1)，由同一把互斥锁保护；
//! - [`PooledBuffer`] 在 `Drop` 时自动归还；[`PooledBuffer::share`] 派生只读共享视图，
//!   归还时若仍有共享者，该缓冲被标记为“脱离”，不再回到空闲队列。
//!
//! # 契约（What）
//! - 任意时刻 `available + checked_out == capacity`，脱离的缓冲计入 `checked_out`；
//! - 空池借出返回 [`TetherError::ResourceExhausted`](tether_core::TetherError::ResourceExhausted)，池本身不重试。

mod pool;
mod sized;

pub use pool::{BufferPool, PoolStats, PooledBuffer, SharedBuffer};
pub use sized::{HeapBuffer, SizedBuffer};
