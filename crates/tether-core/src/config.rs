//! 运行参数模型。
//!
//! # 模块定位（Why）
//! - 传输底座只“消费”配置：监听端口、工作线程数、缓冲池容量、端点读写超时；
//!   配置的持久化与下发由宿主负责；
//! - 以 `serde` + `toml` 反序列化，缺省字段落到 [`Default`]，宿主只需覆盖关心的项。
//!
//! # 契约（What）
//! - [`TetherConfig::from_toml_str`] / [`TetherConfig::load`] 在反序列化后立即执行 [`TetherConfig::validate`]；
//! - 校验失败返回 [`TetherError::Config`]，错误信息指明字段路径。
//!
//! ```toml
//! [runtime]
//! worker_threads = 4
//!
//! [server]
//! listen_port = 9000
//! receive_pool_capacity = 64
//!
//! [client]
//! send_pool_capacity = 64
//! io_timeout_ms = 250
//! ```

use std::{
    net::{IpAddr, Ipv4Addr},
    path::Path,
    time::Duration,
};

use serde::Deserialize;

use crate::{MAX_DATAGRAM_SIZE, Result, TetherError};

/// 顶层配置。
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TetherConfig {
    pub runtime: RuntimeConfig,
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub buffer: BufferConfig,
}

/// I/O 上下文参数。
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// 驱动反应器的工作线程数量。
    pub worker_threads: usize,
    /// `Stop` 等待工作线程退出的上限（毫秒）。
    pub shutdown_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            shutdown_timeout_ms: 500,
        }
    }
}

impl RuntimeConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// 服务端参数。
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    /// `0` 表示由系统分配端口。
    pub listen_port: u16,
    /// 接收缓冲池容量，应覆盖预期的并发在途报文数；每块接收缓冲为 [`MAX_DATAGRAM_SIZE`] 字节。
    pub receive_pool_capacity: usize,
    /// `Stop` 后等待在途接收观察到取消的宽限期（毫秒）。
    pub shutdown_grace_ms: u64,
    /// 内核接收缓冲大小（字节），`None` 保持系统默认。
    pub socket_recv_buffer: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_port: 0,
            receive_pool_capacity: 64,
            shutdown_grace_ms: 200,
            socket_recv_buffer: Some(1 << 20),
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// 客户端参数。
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub send_pool_capacity: usize,
    /// 单次读写的超时（毫秒），按端点生效。
    pub io_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            send_pool_capacity: 64,
            io_timeout_ms: 250,
        }
    }
}

impl ClientConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

/// 缓冲参数。
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BufferConfig {
    /// 发送池中每块缓冲的字节长度，即单个发送负载的上限。
    ///
    /// 接收池不受此项约束：对端可能发来任意不超过 [`MAX_DATAGRAM_SIZE`] 的报文，接收缓冲总是按该上限分配。
    pub buffer_len: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            buffer_len: MAX_DATAGRAM_SIZE,
        }
    }
}

impl TetherConfig {
    /// 从 TOML 文本解析并校验。
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TetherConfig =
            toml::from_str(text).map_err(|err| TetherError::config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载并校验。
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| TetherError::config(format!("read {}: {err}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// 校验取值范围。
    pub fn validate(&self) -> Result<()> {
        if self.runtime.worker_threads == 0 {
            return Err(TetherError::config("runtime.worker_threads must be > 0"));
        }
        if self.server.receive_pool_capacity == 0 {
            return Err(TetherError::config(
                "server.receive_pool_capacity must be > 0",
            ));
        }
        if self.client.send_pool_capacity == 0 {
            return Err(TetherError::config("client.send_pool_capacity must be > 0"));
        }
        if self.client.io_timeout_ms == 0 {
            return Err(TetherError::config("client.io_timeout_ms must be > 0"));
        }
        if self.buffer.buffer_len == 0 || self.buffer.buffer_len > MAX_DATAGRAM_SIZE {
            return Err(TetherError::config(format!(
                "buffer.buffer_len must be within 1..={MAX_DATAGRAM_SIZE}, got {}",
                self.buffer.buffer_len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = TetherConfig::from_toml_str("").expect("空配置应回落默认值");
        assert_eq!(config, TetherConfig::default());
        assert_eq!(config.buffer.buffer_len, MAX_DATAGRAM_SIZE);
    }

    #[test]
    fn partial_sections_override_only_named_fields() {
        let config = TetherConfig::from_toml_str(
            r#"
            [runtime]
            worker_threads = 2

            [server]
            listen_port = 9000
            bind_address = "127.0.0.1"

            [client]
            io_timeout_ms = 40
            "#,
        )
        .expect("合法配置");
        assert_eq!(config.runtime.worker_threads, 2);
        assert_eq!(config.runtime.shutdown_timeout_ms, 500);
        assert_eq!(config.server.listen_port, 9000);
        assert_eq!(config.server.receive_pool_capacity, 64);
        assert_eq!(config.client.io_timeout(), Duration::from_millis(40));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = TetherConfig::from_toml_str("[runtime]\nworker_threads = 0\n")
            .expect_err("零线程必须被拒绝");
        assert_eq!(err.code(), "tether.config.invalid");
        assert!(err.to_string().contains("worker_threads"));

        let err = TetherConfig::from_toml_str("[buffer]\nbuffer_len = 9000\n")
            .expect_err("超过 MTU 的缓冲必须被拒绝");
        assert!(err.to_string().contains("buffer_len"));

        assert!(TetherConfig::from_toml_str("[server]\nunknown = 1\n").is_err());
    }
}
