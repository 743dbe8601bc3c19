use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tether_buffer::SizedBuffer;
use tether_core::{SequenceTracker, SequenceVerdict};
use tracing::debug;

use crate::{DatagramHandler, UdpSession};

/// 按报文内嵌序号过滤的处理器包装。
///
/// # 教案式说明
/// - **意图 (Why)**：UDP 可能重复或乱序投递；解码器只应看到单调前进的帧；
/// - **逻辑 (How)**：`extract` 从负载中取出发送方写入的 16 位序号，交给 [`SequenceTracker`] 判定；
///   `First`/`Newer` 转发给内层处理器，`Duplicate`/`Stale` 以及无法取出序号的报文直接丢弃（会话释放即回池）；
/// - **契约 (What)**：只在单一分发通道上使用才有意义，服务端正是在分发通道上调用处理器；
/// - **风险 (Trade-offs)**：长时间断流后对端序号可能跨越半圈，此时需调用 [`reset`](Self::reset)。
pub struct SequencedHandler<H, F> {
    inner: H,
    extract: F,
    tracker: Mutex<SequenceTracker>,
    dropped: AtomicU64,
    skipped: AtomicU64,
}

impl<H, F> SequencedHandler<H, F> {
    pub fn new(inner: H, extract: F) -> Self {
        Self {
            inner,
            extract,
            tracker: Mutex::new(SequenceTracker::new()),
            dropped: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// 被判定为重复、过期或缺少序号而丢弃的报文数。
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 按序号间隔估算的丢包数。
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn last_index(&self) -> Option<u16> {
        self.tracker.lock().last()
    }

    pub fn reset(&self) {
        self.tracker.lock().reset();
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<B, H, F> DatagramHandler<B> for SequencedHandler<H, F>
where
    B: SizedBuffer,
    H: DatagramHandler<B>,
    F: Fn(&[u8]) -> Option<u16> + Send + Sync + 'static,
{
    fn on_datagram(&self, session: UdpSession<B>) {
        let Some(index) = (self.extract)(session.payload()) else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(peer = %session.peer(), bytes = session.len(), "datagram without sequence index dropped");
            return;
        };
        let verdict = self.tracker.lock().observe(index);
        match verdict {
            SequenceVerdict::First => {}
            SequenceVerdict::Newer { gap } => {
                if gap > 0 {
                    self.skipped.fetch_add(u64::from(gap), Ordering::Relaxed);
                    debug!(peer = %session.peer(), index, gap, "sequence gap");
                }
            }
            SequenceVerdict::Duplicate | SequenceVerdict::Stale => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(peer = %session.peer(), index, ?verdict, "out-of-order datagram dropped");
                return;
            }
        }
        self.inner.on_datagram(session);
    }
}

/// 读取负载前两个字节作为大端序号，供常见的“序号前缀”封装直接使用。
pub fn leading_u16_be(payload: &[u8]) -> Option<u16> {
    match payload {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        net::{Ipv4Addr, SocketAddr},
        sync::Arc,
    };
    use tether_buffer::BufferPool;

    fn session(pool: &BufferPool, index: u16) -> UdpSession {
        let mut buffer = pool.checkout().expect("借出");
        buffer.writable().expect("独占")[..2].copy_from_slice(&index.to_be_bytes());
        UdpSession::new(buffer, 2, SocketAddr::from((Ipv4Addr::LOCALHOST, 9000)))
    }

    #[test]
    fn forwards_only_advancing_indices() {
        let pool = BufferPool::heap(4, 8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            move |session: UdpSession| {
                seen.lock().push(leading_u16_be(session.payload()));
            }
        };
        let handler = SequencedHandler::new(sink, leading_u16_be);

        for index in [65534, 65535, 65535, 3, 1, 4] {
            handler.on_datagram(session(&pool, index));
        }

        assert_eq!(
            *seen.lock(),
            vec![Some(65534), Some(65535), Some(3), Some(4)]
        );
        assert_eq!(handler.dropped(), 2);
        assert_eq!(handler.skipped(), 3, "65535 → 3 跳过了 0、1、2");
        assert_eq!(handler.last_index(), Some(4));
        assert_eq!(pool.available_count(), 4, "被丢弃与被消费的会话都应归还缓冲");
    }

    #[test]
    fn payload_without_index_is_dropped() {
        let pool = BufferPool::heap(1, 8);
        let forwarded = Arc::new(Mutex::new(0usize));
        let sink = {
            let forwarded = Arc::clone(&forwarded);
            move |_: UdpSession| *forwarded.lock() += 1
        };
        let handler = SequencedHandler::new(sink, leading_u16_be);
        let buffer = pool.checkout().expect("借出");
        handler.on_datagram(UdpSession::new(
            buffer,
            1,
            SocketAddr::from((Ipv4Addr::LOCALHOST, 1)),
        ));
        assert_eq!(handler.dropped(), 1);
        assert_eq!(*forwarded.lock(), 0, "缺少序号的报文不应被转发");
        assert_eq!(pool.available_count(), 1);
    }

    #[test]
    fn reset_accepts_the_next_index_as_first() {
        let pool = BufferPool::heap(2, 8);
        let handler = SequencedHandler::new(|_: UdpSession| {}, leading_u16_be);
        handler.on_datagram(session(&pool, 100));
        handler.reset();
        handler.on_datagram(session(&pool, 10));
        assert_eq!(handler.dropped(), 0);
        assert_eq!(handler.last_index(), Some(10));
    }
}
