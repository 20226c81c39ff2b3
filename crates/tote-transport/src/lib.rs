//! # Tote Transport Layer
//!
//! 称重仪表传输层抽象，提供两类统一接口：
//!
//! - [`FrameTransport`]：字节帧总线（RS-485 串口上的 Modbus RTU），无连接概念，每次调用独立超时
//! - [`LineTransport`]：面向行的流式连接（TCP 上的 ASCII 协议 / 遥测 JSON 行），可断开、可重连
//!
//! 所有阻塞等待都有上限，由调用方传入的 `timeout` 决定。

use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(feature = "serial")]
pub use serial::SerialBus;

pub mod tcp;

pub use tcp::TcpLineClient;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] TransportDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Transport not connected")]
    NotConnected,
    #[error("Connection closed by peer")]
    Closed,
}

impl TransportError {
    /// 是否表示连接已失效（流式传输需要重连）
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TransportError::NotConnected | TransportError::Closed)
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    Busy,
    UnsupportedConfig,
    InvalidAddress,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct TransportDeviceError {
    pub kind: TransportDeviceErrorKind,
    pub message: String,
}

impl TransportDeviceError {
    pub fn new(kind: TransportDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            TransportDeviceErrorKind::NoDevice
                | TransportDeviceErrorKind::AccessDenied
                | TransportDeviceErrorKind::NotFound
                | TransportDeviceErrorKind::InvalidAddress
        )
    }
}

impl From<String> for TransportDeviceError {
    fn from(message: String) -> Self {
        Self::new(TransportDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for TransportDeviceError {
    fn from(message: &str) -> Self {
        Self::new(TransportDeviceErrorKind::Unknown, message)
    }
}

/// 字节帧总线（半双工，主站发送请求后读取从站响应）
pub trait FrameTransport: Send {
    /// 发送完整帧
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// 读取最多 `buf.len()` 字节
    ///
    /// 在 `timeout` 内一个字节都没有收到时返回 `TransportError::Timeout`。
    fn receive_timeout(&mut self, buf: &mut [u8], timeout: Duration)
    -> Result<usize, TransportError>;

    /// 丢弃接收缓冲区中的残留字节（上一次超时的迟到响应等）
    fn clear_input(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// 总线是否已初始化可用
    fn is_open(&self) -> bool;
}

/// 面向行的流式连接
pub trait LineTransport: Send {
    /// 建立连接（已连接时直接返回成功）
    fn connect(&mut self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    /// 发送一行（调用方负责行尾 `\n`）
    fn send_line(&mut self, line: &str) -> Result<(), TransportError>;

    /// 读取一行（去掉行尾 `\r\n`）
    fn receive_line(&mut self, timeout: Duration) -> Result<String, TransportError>;

    /// 丢弃已到达但尚未读取的数据（不阻塞）
    fn discard_input(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn disconnect(&mut self);
}

impl<T: FrameTransport + ?Sized> FrameTransport for Box<T> {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        (**self).send(frame)
    }

    fn receive_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        (**self).receive_timeout(buf, timeout)
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        (**self).clear_input()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

impl<T: LineTransport + ?Sized> LineTransport for Box<T> {
    fn connect(&mut self) -> Result<(), TransportError> {
        (**self).connect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        (**self).send_line(line)
    }

    fn receive_line(&mut self, timeout: Duration) -> Result<String, TransportError> {
        (**self).receive_line(timeout)
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        (**self).discard_input()
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}
