use std::{
    collections::HashMap,
    fmt,
    net::{SocketAddr, ToSocketAddrs},
    sync::Arc,
};

use parking_lot::Mutex;
use tether_buffer::{BufferPool, HeapBuffer, SizedBuffer};
use tether_core::{
    Cancellation, ClientConfig, Result, TetherConfig, TetherError, TransportOp, map_io_error,
};
use tether_runtime::{Handle, IoContext};
use tracing::{debug, info};

use crate::UdpClient;

/// 按对端地址复用客户端的连接表。
///
/// # 教案式说明
/// - **意图 (Why)**：同一个远端在池的生命周期内只对应一个客户端与一个套接字，
///   多个生产者向同一头显发送时共享同一条写通道，天然保序；
/// - **逻辑 (How)**：解析地址后在互斥锁内查表，缺失时当场创建并登记；
/// - **契约 (What)**：
///   - 已存在的客户端沿用其创建时绑定的缓冲池，后续调用传入的池被忽略；
///   - 由 [`from_config`](UdpClientPool::from_config) 创建的池自带按配置构建的发送池，
///     [`get_or_create_default`](Self::get_or_create_default) 以它创建客户端；
///   - `stop` 停止全部客户端并清空映射，此后池不可复用，`get_or_create` 返回中止错误。
pub struct UdpClientPool<B: SizedBuffer = HeapBuffer> {
    handle: Handle,
    cancellation: Cancellation,
    config: ClientConfig,
    send_pool: Option<BufferPool<B>>,
    entries: Mutex<Entries<B>>,
}

struct Entries<B: SizedBuffer> {
    clients: HashMap<SocketAddr, Arc<UdpClient<B>>>,
    stopped: bool,
}

impl<B: SizedBuffer> UdpClientPool<B> {
    /// 在运行中的上下文上创建空池。
    pub fn new(ctx: &IoContext, config: ClientConfig) -> Result<Self> {
        Ok(Self {
            handle: ctx.handle()?,
            cancellation: ctx.cancellation()?,
            config,
            send_pool: None,
            entries: Mutex::new(Entries {
                clients: HashMap::new(),
                stopped: false,
            }),
        })
    }

    /// 返回 `address` 对应的客户端，不存在时以 `pool` 创建。
    pub fn get_or_create<A>(&self, address: A, pool: &BufferPool<B>) -> Result<Arc<UdpClient<B>>>
    where
        A: ToSocketAddrs + fmt::Display,
    {
        let peer = resolve(&address)?;
        let mut entries = self.entries.lock();
        if entries.stopped {
            return Err(TetherError::aborted("udp client pool"));
        }
        if let Some(client) = entries.clients.get(&peer) {
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(UdpClient::connect(
            &self.handle,
            self.cancellation.child(),
            peer,
            pool.clone(),
            &self.config,
        )?);
        entries.clients.insert(peer, Arc::clone(&client));
        debug!(%peer, clients = entries.clients.len(), "udp client created");
        Ok(client)
    }

    /// 以自带的发送池获取或创建客户端；池未配置发送池时返回配置错误。
    pub fn get_or_create_default<A>(&self, address: A) -> Result<Arc<UdpClient<B>>>
    where
        A: ToSocketAddrs + fmt::Display,
    {
        let pool = self
            .send_pool
            .as_ref()
            .ok_or_else(|| TetherError::config("udp client pool has no default send pool"))?;
        self.get_or_create(address, pool)
    }

    /// 自带的发送池。
    pub fn send_pool(&self) -> Option<&BufferPool<B>> {
        self.send_pool.as_ref()
    }

    /// 仅查询，不创建。
    pub fn get(&self, peer: &SocketAddr) -> Option<Arc<UdpClient<B>>> {
        self.entries.lock().clients.get(peer).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_stopped(&self) -> bool {
        self.entries.lock().stopped
    }

    /// 停止全部客户端并清空映射；重复调用为空操作。
    pub fn stop(&self) {
        let clients: Vec<_> = {
            let mut entries = self.entries.lock();
            if entries.stopped {
                return;
            }
            entries.stopped = true;
            entries.clients.drain().map(|(_, client)| client).collect()
        };
        for client in &clients {
            client.stop();
        }
        self.cancellation.cancel();
        info!(clients = clients.len(), "udp client pool stopped");
    }
}

impl UdpClientPool<HeapBuffer> {
    /// 按配置创建：读写超时取 `client`，发送池容量取 `client.send_pool_capacity`，
    /// 每块缓冲 `buffer.buffer_len` 字节。
    pub fn from_config(ctx: &IoContext, config: &TetherConfig) -> Result<Self> {
        config.validate()?;
        let mut pool = Self::new(ctx, config.client.clone())?;
        pool.send_pool = Some(BufferPool::heap(
            config.client.send_pool_capacity,
            config.buffer.buffer_len,
        ));
        Ok(pool)
    }
}

impl<B: SizedBuffer> Drop for UdpClientPool<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn resolve<A>(address: &A) -> Result<SocketAddr>
where
    A: ToSocketAddrs + fmt::Display,
{
    address
        .to_socket_addrs()
        .map_err(|err| map_io_error(TransportOp::RESOLVE, err))?
        .next()
        .ok_or_else(|| TetherError::Unresolved {
            address: address.to_string(),
        })
}
