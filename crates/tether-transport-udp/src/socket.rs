//! 套接字构建。
//!
//! 以 `socket2` 创建并配置原始套接字，再在运行时上下文内转换为 Tokio `UdpSocket`；
//! 所有 IO 错误经 [`map_io_error`] 附带操作标识。

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tether_core::{Result, TransportOp, map_io_error};
use tokio::{net::UdpSocket, runtime::Handle};

/// 创建监听套接字：`SO_REUSEADDR`，可选地放大内核接收缓冲。
pub(crate) fn bind_listener(
    handle: &Handle,
    addr: SocketAddr,
    recv_buffer: Option<usize>,
) -> Result<UdpSocket> {
    let socket = new_socket(addr)?;
    socket
        .set_reuse_address(true)
        .map_err(|err| map_io_error(TransportOp::CONFIGURE, err))?;
    if let Some(size) = recv_buffer {
        socket
            .set_recv_buffer_size(size)
            .map_err(|err| map_io_error(TransportOp::CONFIGURE, err))?;
    }
    socket
        .bind(&addr.into())
        .map_err(|err| map_io_error(TransportOp::BIND, err))?;
    into_tokio(handle, socket)
}

/// 创建连接到 `peer` 的客户端套接字，本地端口由系统分配。
pub(crate) fn connect_to(handle: &Handle, peer: SocketAddr) -> Result<UdpSocket> {
    let socket = new_socket(peer)?;
    let local = match peer.ip() {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    socket
        .bind(&local.into())
        .map_err(|err| map_io_error(TransportOp::BIND, err))?;
    socket
        .connect(&peer.into())
        .map_err(|err| map_io_error(TransportOp::CONNECT, err))?;
    into_tokio(handle, socket)
}

fn new_socket(addr: SocketAddr) -> Result<Socket> {
    Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|err| map_io_error(TransportOp::BIND, err))
}

fn into_tokio(handle: &Handle, socket: Socket) -> Result<UdpSocket> {
    socket
        .set_nonblocking(true)
        .map_err(|err| map_io_error(TransportOp::CONFIGURE, err))?;
    // `from_std` 需要在运行时上下文内注册到反应器。
    let _entered = handle.enter();
    UdpSocket::from_std(socket.into()).map_err(|err| map_io_error(TransportOp::CONFIGURE, err))
}
