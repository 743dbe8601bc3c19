use std::{fmt, net::SocketAddr, time::Instant};

use tether_buffer::{HeapBuffer, PooledBuffer, SharedBuffer, SizedBuffer};

/// 一次已完成的接收：池化缓冲、有效长度与来源地址。
///
/// # 契约说明（What）
/// - [`payload`](Self::payload) 只暴露前 `len` 字节，缓冲剩余部分内容未定义；
/// - 会话被丢弃时缓冲随之归还所属池；若此前通过 [`share`](Self::share) 交出了共享视图，
///   缓冲将脱离池而不再复用。
pub struct UdpSession<B: SizedBuffer = HeapBuffer> {
    buffer: PooledBuffer<B>,
    len: usize,
    peer: SocketAddr,
    received_at: Instant,
}

impl<B: SizedBuffer> UdpSession<B> {
    /// 绑定缓冲与接收结果，`len` 超出缓冲长度时按缓冲长度截断。
    pub fn new(buffer: PooledBuffer<B>, len: usize, peer: SocketAddr) -> Self {
        let len = len.min(buffer.len());
        Self {
            buffer,
            len,
            peer,
            received_at: Instant::now(),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_slice()[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    pub fn buffer(&self) -> &PooledBuffer<B> {
        &self.buffer
    }

    /// 交出共享视图给外部解码协作者。
    pub fn share(&self) -> SharedBuffer<B> {
        self.buffer.share()
    }

    /// 拆出缓冲，由调用方决定何时归还。
    pub fn into_buffer(self) -> PooledBuffer<B> {
        self.buffer
    }
}

impl<B: SizedBuffer> fmt::Debug for UdpSession<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpSession")
            .field("peer", &self.peer)
            .field("len", &self.len)
            .field("slot", &self.buffer.index())
            .finish()
    }
}
