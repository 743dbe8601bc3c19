use tether_buffer::{HeapBuffer, SizedBuffer};

use crate::UdpSession;

/// 处理阶段的交付回调。
///
/// # 设计初衷（Why）
/// - 服务端只负责把报文搬进池化缓冲；校验序号、解码等工作属于外部协作者，
///   以回调形式注入，传输层不感知负载语义。
///
/// # 契约定义（What）
/// - 回调总是在服务端的分发通道上被调用，同一服务端的两次调用不会重叠，顺序与接收顺序一致；
/// - 回调获得会话所有权：丢弃会话即归还缓冲，长时间持有会占用接收池容量；
/// - 回调不应阻塞线程，耗时工作应转交其它执行单元。
pub trait DatagramHandler<B: SizedBuffer = HeapBuffer>: Send + Sync + 'static {
    fn on_datagram(&self, session: UdpSession<B>);
}

impl<B, F> DatagramHandler<B> for F
where
    B: SizedBuffer,
    F: Fn(UdpSession<B>) + Send + Sync + 'static,
{
    fn on_datagram(&self, session: UdpSession<B>) {
        self(session)
    }
}
