use std::{collections::VecDeque, fmt, mem::ManuallyDrop, sync::Arc};

use parking_lot::Mutex;
use tether_core::{Result, TetherError};
use tracing::debug;

use crate::{HeapBuffer, SizedBuffer};

/// 固定容量的缓冲池。
///
/// # 模块角色（Why）
/// - 为接收循环与发送端提供统一的缓冲来源，构造后不再向系统申请内存；
/// - 借助 [`PooledBuffer`] 的 `Drop` 钩子自动归还，调用方无需关注回收细节。
///
/// # 核心机制（How）
/// - `slots` 记录每个槽位当前状态（可用 / 借出 / 脱离），`free` 为按归还顺序排列的空闲队列；
/// - 借出从队首弹出，归还压入队尾，两者共用一把 `parking_lot::Mutex`，临界区内只有 O(1) 操作；
/// - 归还时以 `Arc::try_unwrap` 判定池是否为唯一持有者：成功则放回队尾，失败则将槽位标记为脱离。
///
/// # 契约说明（What）
/// - **线程安全**：池句柄可 `Clone` 并跨线程共享，所有状态由同一把锁保护；
/// - **不变式**：`available + checked_out == capacity`，脱离的槽位计入 `checked_out` 且永不回收；
/// - **失败语义**：空池借出返回 [`TetherError::ResourceExhausted`]，池内不做重试。
///
/// # 设计权衡（Trade-offs）
/// - 脱离的缓冲由最后一个共享者释放内存，但不会重新进入空闲队列，池的有效容量随之缩小；
///   调用方应避免在归还后仍长期持有共享视图。
pub struct BufferPool<B: SizedBuffer = HeapBuffer> {
    inner: Arc<PoolInner<B>>,
}

impl<B: SizedBuffer> Clone for BufferPool<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// 池状态快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub available: usize,
    pub checked_out: usize,
    /// 归还时仍被共享、因而永久离开池的缓冲数量（已计入 `checked_out`）。
    pub detached: usize,
    pub total_checkouts: u64,
    pub failed_checkouts: u64,
}

struct PoolInner<B> {
    capacity: usize,
    buffer_len: usize,
    state: Mutex<PoolState<B>>,
}

struct PoolState<B> {
    slots: Vec<SlotState>,
    free: VecDeque<Lease<B>>,
    detached: usize,
    total_checkouts: u64,
    failed_checkouts: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SlotState {
    Available,
    CheckedOut,
    Detached,
}

/// 槽位下标与其缓冲实体。
struct Lease<B> {
    index: usize,
    buffer: B,
}

impl<B: SizedBuffer> BufferPool<B> {
    /// 通过工厂一次性构建 `capacity` 个缓冲，初始全部可用。
    pub fn new(capacity: usize, mut factory: impl FnMut() -> B) -> Self {
        let free: VecDeque<_> = (0..capacity)
            .map(|index| Lease {
                index,
                buffer: factory(),
            })
            .collect();
        let buffer_len = free
            .iter()
            .map(|lease| lease.buffer.len())
            .min()
            .unwrap_or(0);
        Self {
            inner: Arc::new(PoolInner {
                capacity,
                buffer_len,
                state: Mutex::new(PoolState {
                    slots: vec![SlotState::Available; capacity],
                    free,
                    detached: 0,
                    total_checkouts: 0,
                    failed_checkouts: 0,
                }),
            }),
        }
    }

    /// 借出空闲队列队首的缓冲。
    pub fn checkout(&self) -> Result<PooledBuffer<B>> {
        let mut state = self.inner.state.lock();
        let Some(lease) = state.free.pop_front() else {
            state.failed_checkouts += 1;
            return Err(TetherError::ResourceExhausted {
                capacity: self.inner.capacity,
            });
        };
        if let Some(slot) = state.slots.get_mut(lease.index) {
            *slot = SlotState::CheckedOut;
        }
        state.total_checkouts += 1;
        drop(state);

        Ok(PooledBuffer {
            index: lease.index,
            lease: ManuallyDrop::new(Arc::new(lease)),
            pool: Arc::clone(&self.inner),
        })
    }

    /// 显式归还缓冲，与直接 `drop` 等价。
    ///
    /// 缓冲若来自其它池，仍会回到其所属池，并返回 [`TetherError::ForeignBuffer`]。
    pub fn release(&self, buffer: PooledBuffer<B>) -> Result<()> {
        if !Arc::ptr_eq(&buffer.pool, &self.inner) {
            let index = buffer.index;
            drop(buffer);
            return Err(TetherError::ForeignBuffer { index });
        }
        drop(buffer);
        Ok(())
    }

    pub fn available_count(&self) -> usize {
        self.inner.state.lock().free.len()
    }

    pub fn checked_out(&self) -> usize {
        self.inner.capacity - self.available_count()
    }

    pub fn detached_count(&self) -> usize {
        self.inner.state.lock().detached
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// 池内最短缓冲的字节长度；空池为 0。
    pub fn buffer_len(&self) -> usize {
        self.inner.buffer_len
    }

    #[cfg(test)]
    pub(crate) fn slot_state(&self, index: usize) -> Option<SlotState> {
        self.inner.state.lock().slots.get(index).copied()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            capacity: self.inner.capacity,
            available: state.free.len(),
            checked_out: self.inner.capacity - state.free.len(),
            detached: state.detached,
            total_checkouts: state.total_checkouts,
            failed_checkouts: state.failed_checkouts,
        }
    }
}

impl BufferPool<HeapBuffer> {
    /// 构建由 `capacity` 个 `buffer_len` 字节堆缓冲组成的池。
    pub fn heap(capacity: usize, buffer_len: usize) -> Self {
        Self::new(capacity, || HeapBuffer::new(buffer_len))
    }
}

impl<B: SizedBuffer> fmt::Debug for BufferPool<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("stats", &self.stats())
            .finish()
    }
}

impl<B> PoolInner<B> {
    fn reclaim(&self, lease: Arc<Lease<B>>) {
        let mut state = self.state.lock();
        debug_assert_eq!(
            state.slots.get(lease.index),
            Some(&SlotState::CheckedOut),
            "slot {} reclaimed without being checked out",
            lease.index
        );
        match Arc::try_unwrap(lease) {
            Ok(lease) => {
                if let Some(slot) = state.slots.get_mut(lease.index) {
                    *slot = SlotState::Available;
                }
                state.free.push_back(lease);
            }
            Err(shared) => {
                if let Some(slot) = state.slots.get_mut(shared.index) {
                    *slot = SlotState::Detached;
                }
                state.detached += 1;
                debug!(
                    slot = shared.index,
                    owners = Arc::strong_count(&shared) - 1,
                    "buffer released while still shared; slot detached"
                );
            }
        }
    }
}

/// 从池中借出的缓冲，`Drop` 时归还。
///
/// - 刚借出的缓冲由调用方独占，可通过 [`writable`](Self::writable) 写入；
/// - [`share`](Self::share) 派生只读共享视图后，写入能力随之关闭，直到所有共享视图释放。
pub struct PooledBuffer<B: SizedBuffer = HeapBuffer> {
    index: usize,
    lease: ManuallyDrop<Arc<Lease<B>>>,
    pool: Arc<PoolInner<B>>,
}

impl<B: SizedBuffer> PooledBuffer<B> {
    /// 所在槽位下标。
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.lease.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        self.lease.buffer.as_slice()
    }

    pub fn buffer(&self) -> &B {
        &self.lease.buffer
    }

    /// 独占时返回可写切片；存在共享视图时返回 `None`。
    pub fn writable(&mut self) -> Option<&mut [u8]> {
        Arc::get_mut(&mut self.lease).map(|lease| lease.buffer.as_mut_slice())
    }

    /// 派生只读共享视图，作为额外的持有者。
    pub fn share(&self) -> SharedBuffer<B> {
        SharedBuffer {
            lease: Arc::clone(&self.lease),
        }
    }

    /// 是否存在尚未释放的共享视图。
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.lease) > 1
    }
}

impl<B: SizedBuffer> Drop for PooledBuffer<B> {
    fn drop(&mut self) {
        // SAFETY: `lease` 只在此处取出一次，之后 `self` 不再被访问。
        let lease = unsafe { ManuallyDrop::take(&mut self.lease) };
        self.pool.reclaim(lease);
    }
}

impl<B: SizedBuffer> fmt::Debug for PooledBuffer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("index", &self.index)
            .field("len", &self.len())
            .field("shared", &self.is_shared())
            .finish()
    }
}

/// 池化缓冲的只读共享视图。
///
/// 持有期间原缓冲即使被归还也不会回到空闲队列。
pub struct SharedBuffer<B: SizedBuffer = HeapBuffer> {
    lease: Arc<Lease<B>>,
}

impl<B: SizedBuffer> SharedBuffer<B> {
    pub fn index(&self) -> usize {
        self.lease.index
    }

    pub fn len(&self) -> usize {
        self.lease.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        self.lease.buffer.as_slice()
    }
}

impl<B: SizedBuffer> Clone for SharedBuffer<B> {
    fn clone(&self) -> Self {
        Self {
            lease: Arc::clone(&self.lease),
        }
    }
}

impl<B: SizedBuffer> fmt::Debug for SharedBuffer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("index", &self.index())
            .field("len", &self.len())
            .finish()
    }
}
