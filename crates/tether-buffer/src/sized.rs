use bytes::BytesMut;

/// 固定大小的内存区域能力。
///
/// # 设计初衷（Why）
/// - 传输层只关心“往哪里写、最多写多少”，不关心内存来自堆、显存映射还是编码器的输出队列；
/// - 以 trait 表达该能力，外部编解码协作者可注入自己的缓冲类型，池与收发逻辑保持不变。
///
/// # 契约定义（What）
/// - `len` 在缓冲生命周期内不变；
/// - `as_slice`/`as_mut_slice` 返回的切片长度等于 `len`；
/// - 实现必须满足 `Send + Sync + 'static`，以便在工作线程之间转移。
pub trait SizedBuffer: Send + Sync + 'static {
    /// 缓冲的固定字节长度。
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn as_slice(&self) -> &[u8];

    fn as_mut_slice(&mut self) -> &mut [u8];

    /// 起始地址，仅用于诊断与外部协作者的零拷贝对接。
    fn address(&self) -> *const u8 {
        self.as_slice().as_ptr()
    }
}

/// 基于 `BytesMut` 的默认堆缓冲。
#[derive(Clone, Debug)]
pub struct HeapBuffer {
    bytes: BytesMut,
}

impl HeapBuffer {
    /// 分配 `len` 字节并零填充。
    pub fn new(len: usize) -> Self {
        Self {
            bytes: BytesMut::zeroed(len),
        }
    }
}

impl SizedBuffer for HeapBuffer {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_buffer_is_zeroed_and_fixed_size() {
        let mut buffer = HeapBuffer::new(16);
        assert_eq!(buffer.len(), 16);
        assert!(buffer.as_slice().iter().all(|byte| *byte == 0));

        buffer.as_mut_slice()[..3].copy_from_slice(b"abc");
        assert_eq!(&buffer.as_slice()[..3], b"abc");
        assert_eq!(buffer.len(), 16);
        assert_eq!(buffer.address(), buffer.as_slice().as_ptr());
    }

    #[test]
    fn zero_length_buffer_reports_empty() {
        assert!(HeapBuffer::new(0).is_empty());
    }
}
