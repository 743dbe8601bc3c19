use std::{
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::BytesMut;
use parking_lot::Mutex;
use tether_buffer::{BufferPool, HeapBuffer, PooledBuffer, SizedBuffer};
use tether_core::{
    Cancellation, ClientConfig, ErrorCategory, MAX_DATAGRAM_SIZE, Result, TetherError, TransportOp,
    map_io_error,
};
use tether_runtime::{Handle, Lane};
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

use crate::{
    recovery::{Recovery, back_off, recover},
    server::check_length,
    socket,
};

/// 面向单一对端的 UDP 客户端。
///
/// # 教案式说明
/// - **意图 (Why)**：编码端把帧写进池化缓冲后交给客户端发送；发送必须有序、不得阻塞编码线程，
///   并且无论成败缓冲都要回池；
/// - **逻辑 (How)**：
///   - 套接字绑定到系统分配的本地端口并 `connect` 到对端，只收发该对端的报文；
///   - 发送投递到专属写通道，以 `io_timeout` 约束单次写入，完成后无条件释放缓冲；
///   - 独立的回包任务保持一个挂起的接收，只做记录与计数。
/// - **契约 (What)**：
///   - [`send`](Self::send) 入队即返回，不等待发送完成；
///   - `stop` 幂等，之后的发送返回 [`TetherError::ClientClosed`]，缓冲随即回池；
///   - `stop` 交出客户端持有的套接字，挂起的收发退出后描述符即关闭，与外部是否仍持有客户端无关；
///   - `Drop` 等价于 `stop`。
pub struct UdpClient<B: SizedBuffer = HeapBuffer> {
    peer: SocketAddr,
    local_addr: SocketAddr,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    pool: BufferPool<B>,
    write_lane: Lane,
    io_timeout: Duration,
    cancellation: Cancellation,
    stopped: AtomicBool,
    stats: Arc<ClientStats>,
}

#[derive(Debug, Default)]
struct ClientStats {
    replies: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
}

impl<B: SizedBuffer> UdpClient<B> {
    /// 连接到 `peer` 并启动回包观察任务。
    pub fn connect(
        handle: &Handle,
        cancellation: Cancellation,
        peer: SocketAddr,
        pool: BufferPool<B>,
        config: &ClientConfig,
    ) -> Result<Self> {
        let socket = Arc::new(socket::connect_to(handle, peer)?);
        let local_addr = socket
            .local_addr()
            .map_err(|err| map_io_error(TransportOp::LOCAL_ADDR, err))?;
        let write_lane = Lane::new(format!("udp-client-{peer}"), handle, cancellation.child());
        let stats = Arc::new(ClientStats::default());

        handle.spawn(observe_replies(
            Arc::clone(&socket),
            peer,
            cancellation.clone(),
            Arc::clone(&stats),
        ));

        debug!(%peer, %local_addr, "udp client connected");
        Ok(Self {
            peer,
            local_addr,
            socket: Mutex::new(Some(socket)),
            pool,
            write_lane,
            io_timeout: config.io_timeout(),
            cancellation,
            stopped: AtomicBool::new(false),
            stats,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 创建时绑定的发送缓冲池。
    pub fn pool(&self) -> &BufferPool<B> {
        &self.pool
    }

    /// 从发送池借出一块缓冲。
    pub fn checkout(&self) -> Result<PooledBuffer<B>> {
        self.pool.checkout()
    }

    /// 异步发送 `buffer` 的前 `len` 字节；发送结束（成功、失败或超时）后缓冲回池。
    pub fn send(&self, buffer: PooledBuffer<B>, len: usize) -> Result<()> {
        let Some(socket) = self.socket.lock().clone() else {
            return Err(TetherError::ClientClosed { peer: self.peer });
        };
        check_length(&buffer, len)?;

        let stats = Arc::clone(&self.stats);
        let io_timeout = self.io_timeout;
        let peer = self.peer;
        self.write_lane.post(async move {
            let outcome = tokio::time::timeout(io_timeout, socket.send(&buffer.as_slice()[..len])).await;
            let err = match outcome {
                Ok(Ok(sent)) => {
                    stats.sent.fetch_add(1, Ordering::Relaxed);
                    trace!(%peer, bytes = sent, slot = buffer.index(), "datagram sent");
                    return;
                }
                Ok(Err(err)) => map_io_error(TransportOp::SEND, err),
                Err(_) => TetherError::Timeout {
                    op: TransportOp::SEND,
                    timeout: io_timeout,
                },
            };
            stats.failed.fetch_add(1, Ordering::Relaxed);
            // 尽力而为：发送不重试，分类只决定日志级别。
            match err.category() {
                ErrorCategory::Cancelled => debug!(%peer, code = err.code(), error = %err, "udp send aborted"),
                ErrorCategory::Retryable(_) => {
                    warn!(%peer, code = err.code(), error = %err, "udp send failed; datagram dropped")
                }
                ErrorCategory::ResourceExhausted | ErrorCategory::NonRetryable => {
                    warn!(%peer, code = err.code(), error = %err, "udp send failed")
                }
            }
        })
    }

    /// 借出缓冲、复制 `payload` 并发送。
    pub fn send_slice(&self, payload: &[u8]) -> Result<()> {
        let mut buffer = self.checkout()?;
        check_payload(&buffer, payload.len())?;
        match buffer.writable() {
            Some(target) => target[..payload.len()].copy_from_slice(payload),
            None => {
                return Err(TetherError::InvalidPayload {
                    detail: "send buffer is shared".into(),
                });
            }
        }
        self.send(buffer, payload.len())
    }

    /// 已观察到的对端回包数量。
    pub fn replies_observed(&self) -> u64 {
        self.stats.replies.load(Ordering::Relaxed)
    }

    /// 已成功写出的报文数量。
    pub fn datagrams_sent(&self) -> u64 {
        self.stats.sent.load(Ordering::Relaxed)
    }

    /// 发送失败或超时的报文数量。
    pub fn send_failures(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// 取消挂起的收发并交出套接字；重复调用为空操作。
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.socket.lock().take();
        self.cancellation.cancel();
        info!(peer = %self.peer, sent = self.datagrams_sent(), "udp client stopped");
    }
}

impl<B: SizedBuffer> Drop for UdpClient<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<B: SizedBuffer> fmt::Debug for UdpClient<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpClient")
            .field("peer", &self.peer)
            .field("local_addr", &self.local_addr)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

fn check_payload<B: SizedBuffer>(buffer: &PooledBuffer<B>, len: usize) -> Result<()> {
    if len > MAX_DATAGRAM_SIZE {
        return Err(TetherError::InvalidPayload {
            detail: format!("payload of {len} bytes exceeds {MAX_DATAGRAM_SIZE}").into(),
        });
    }
    check_length(buffer, len)
}

/// 回包观察：保持一个挂起的接收，只记录不交付。
async fn observe_replies(
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    cancellation: Cancellation,
    stats: Arc<ClientStats>,
) {
    let mut buffer = BytesMut::zeroed(MAX_DATAGRAM_SIZE);
    loop {
        let received = tokio::select! {
            biased;
            _ = cancellation.cancelled() => break,
            received = socket.recv(&mut buffer[..]) => received,
        };
        match received {
            Ok(len) => {
                stats.replies.fetch_add(1, Ordering::Relaxed);
                debug!(%peer, bytes = len, "reply observed");
            }
            Err(err) => {
                let err = map_io_error(TransportOp::RECEIVE, err);
                match recover(&err, &cancellation, "reply") {
                    Recovery::Exit => break,
                    Recovery::Resume => {}
                    Recovery::Backoff(delay) => {
                        if !back_off(&cancellation, delay).await {
                            break;
                        }
                    }
                }
            }
        }
    }
    trace!(%peer, "reply observer exited");
}
