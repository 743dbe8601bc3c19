use std::{
    net::SocketAddr,
    sync::{Arc, mpsc},
};

use parking_lot::Mutex;
use tether_buffer::{BufferPool, HeapBuffer, PooledBuffer, SizedBuffer};
use tether_core::{
    Cancellation, MAX_DATAGRAM_SIZE, Result, ServerConfig, TetherConfig, TetherError, TransportOp,
    map_io_error,
};
use tether_runtime::{IoContext, Lane};
use tokio::{net::UdpSocket, task::JoinHandle};
use tracing::{debug, info, trace, warn};

use crate::{
    DatagramHandler, UdpSession,
    recovery::{Recovery, back_off, recover},
    socket,
};

/// 持续接收报文并交付处理阶段的 UDP 服务端。
///
/// # 教案式说明
/// - **意图 (Why)**：头显端需要以最小延迟把编码帧从网络搬进内存并交给解码器；接收缓冲全部来自
///   固定容量的池，处理结束即回收；
/// - **逻辑 (How)**：
///   1. `start` 绑定套接字，启动收包循环，并创建分发通道与写通道；
///   2. 收包循环每轮借出一块缓冲、等待一次 `recv_from`，成功且长度非零时把 [`UdpSession`] 投递到
///      分发通道，随后立即发起下一次接收，因此任意时刻恰好只有一个挂起的接收；
///   3. `stop` 取消令牌，有界等待收包循环退出，超时则强制中止，最后释放套接字。
/// - **契约 (What)**：
///   - 处理器只在分发通道上被调用，调用之间不会重叠；
///   - 接收池中每块缓冲都必须容得下 [`MAX_DATAGRAM_SIZE`] 字节，否则 `start` 拒绝启动，
///     报文不会被截断后交付；
///   - 池耗尽时记录 ERROR 并短暂退避后重试，绝不向池外缓冲接收；
///   - 停止后观察到的接收错误以 DEBUG 吞掉，其余错误以 WARN 记录且循环继续；
///   - `start`/`stop` 均幂等，停止后可再次 `start` 并重新绑定同一端口。
/// - **风险 (Trade-offs)**：`stop` 会同步阻塞至多一个宽限期，应在同步上下文中调用。
pub struct UdpServer<B: SizedBuffer = HeapBuffer> {
    config: ServerConfig,
    pool: BufferPool<B>,
    handler: Arc<dyn DatagramHandler<B>>,
    run: Mutex<Option<ServerRun>>,
}

struct ServerRun {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    cancellation: Cancellation,
    write_lane: Lane,
    receive_task: JoinHandle<()>,
    loop_exited: mpsc::Receiver<()>,
}

impl<B: SizedBuffer> UdpServer<B> {
    pub fn new(config: ServerConfig, pool: BufferPool<B>, handler: impl DatagramHandler<B>) -> Self {
        Self {
            config,
            pool,
            handler: Arc::new(handler),
            run: Mutex::new(None),
        }
    }

    /// 绑定端口并开始接收；已在运行时返回当前监听地址。
    pub fn start(&self, ctx: &IoContext) -> Result<SocketAddr> {
        if self.pool.buffer_len() < MAX_DATAGRAM_SIZE {
            return Err(TetherError::config(format!(
                "receive buffers of {} bytes cannot hold a {MAX_DATAGRAM_SIZE}-byte datagram",
                self.pool.buffer_len()
            )));
        }
        let mut run = self.run.lock();
        if let Some(active) = run.as_ref() {
            if !active.cancellation.is_cancelled() {
                return Ok(active.local_addr);
            }
            // 上下文已先行停止，遗留的运行状态只剩套接字需要释放。
            run.take();
        }

        let handle = ctx.handle()?;
        let cancellation = ctx.cancellation()?;
        let bind_addr = SocketAddr::new(self.config.bind_address, self.config.listen_port);
        let socket = Arc::new(socket::bind_listener(
            &handle,
            bind_addr,
            self.config.socket_recv_buffer,
        )?);
        let local_addr = socket
            .local_addr()
            .map_err(|err| map_io_error(TransportOp::LOCAL_ADDR, err))?;

        let dispatch = Lane::new("udp-dispatch", &handle, cancellation.child());
        let write_lane = Lane::new("udp-write", &handle, cancellation.child());
        let (exit_tx, loop_exited) = mpsc::channel();
        let receive_task = handle.spawn(receive_loop(
            Arc::clone(&socket),
            self.pool.clone(),
            dispatch,
            Arc::clone(&self.handler),
            cancellation.clone(),
            exit_tx,
        ));

        info!(%local_addr, capacity = self.pool.capacity(), "udp server started");
        *run = Some(ServerRun {
            socket,
            local_addr,
            cancellation,
            write_lane,
            receive_task,
            loop_exited,
        });
        Ok(local_addr)
    }

    /// 停止接收并释放套接字；未运行时为空操作。
    pub fn stop(&self) {
        let Some(run) = self.run.lock().take() else {
            return;
        };
        run.cancellation.cancel();
        match run.loop_exited.recv_timeout(self.config.shutdown_grace()) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {}
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    local_addr = %run.local_addr,
                    grace = ?self.config.shutdown_grace(),
                    "receive loop did not observe cancellation in time; aborting"
                );
                run.receive_task.abort();
            }
        }
        drop(run.socket);
        info!(local_addr = %run.local_addr, "udp server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.run
            .lock()
            .as_ref()
            .is_some_and(|run| !run.cancellation.is_cancelled())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.run.lock().as_ref().map(|run| run.local_addr)
    }

    /// 接收缓冲池。
    pub fn pool(&self) -> &BufferPool<B> {
        &self.pool
    }

    /// 经写通道向 `peer` 发送 `buffer` 的前 `len` 字节，发送完成后缓冲归还所属池。
    pub fn reply(&self, peer: SocketAddr, buffer: PooledBuffer<B>, len: usize) -> Result<()> {
        check_length(&buffer, len)?;
        let (socket, lane) = {
            let run = self.run.lock();
            let run = run
                .as_ref()
                .ok_or_else(|| TetherError::aborted("udp server"))?;
            (Arc::clone(&run.socket), run.write_lane.clone())
        };
        lane.post(async move {
            match socket.send_to(&buffer.as_slice()[..len], peer).await {
                Ok(sent) => trace!(%peer, bytes = sent, "reply sent"),
                Err(err) => {
                    let err = map_io_error(TransportOp::SEND, err);
                    warn!(%peer, code = err.code(), error = %err, "reply failed");
                }
            }
            drop(buffer);
        })
    }
}

impl UdpServer<HeapBuffer> {
    /// 按配置构建服务端：接收池容量取 `server.receive_pool_capacity`，每块缓冲容纳一个最大报文。
    pub fn from_config(config: &TetherConfig, handler: impl DatagramHandler) -> Result<Self> {
        config.validate()?;
        let pool = BufferPool::heap(config.server.receive_pool_capacity, MAX_DATAGRAM_SIZE);
        Ok(Self::new(config.server.clone(), pool, handler))
    }
}

impl<B: SizedBuffer> Drop for UdpServer<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

pub(crate) fn check_length<B: SizedBuffer>(buffer: &PooledBuffer<B>, len: usize) -> Result<()> {
    if len > buffer.len() {
        return Err(TetherError::InvalidPayload {
            detail: format!("length {len} exceeds buffer size {}", buffer.len()).into(),
        });
    }
    Ok(())
}

/// 收包循环：任意时刻只保留一个挂起的接收。
///
/// `_exit` 在循环返回（或任务被中止）时随之释放，`stop` 据此得知循环已退出；
/// 循环内的缓冲先于 `_exit` 释放，因此 `stop` 返回时在途缓冲已回池。
async fn receive_loop<B: SizedBuffer>(
    socket: Arc<UdpSocket>,
    pool: BufferPool<B>,
    dispatch: Lane,
    handler: Arc<dyn DatagramHandler<B>>,
    cancellation: Cancellation,
    _exit: mpsc::Sender<()>,
) {
    loop {
        if cancellation.is_cancelled() {
            break;
        }
        let mut buffer = match pool.checkout() {
            Ok(buffer) => buffer,
            Err(err) => match recover(&err, &cancellation, "receive") {
                Recovery::Exit => break,
                Recovery::Resume => continue,
                Recovery::Backoff(delay) => {
                    if back_off(&cancellation, delay).await {
                        continue;
                    }
                    break;
                }
            },
        };
        let Some(target) = buffer.writable() else {
            continue;
        };
        let received = tokio::select! {
            biased;
            _ = cancellation.cancelled() => break,
            received = socket.recv_from(target) => received,
        };

        match received {
            Ok((0, peer)) => trace!(%peer, "empty datagram ignored"),
            Ok((len, peer)) => {
                trace!(%peer, bytes = len, slot = buffer.index(), "datagram received");
                let session = UdpSession::new(buffer, len, peer);
                let handler = Arc::clone(&handler);
                if let Err(err) = dispatch.post(async move { handler.on_datagram(session) }) {
                    debug!(error = %err, "dispatch lane closed; receive loop exiting");
                    break;
                }
            }
            Err(err) => {
                drop(buffer);
                let err = map_io_error(TransportOp::RECEIVE, err);
                match recover(&err, &cancellation, "receive") {
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
    debug!("receive loop exited");
}
