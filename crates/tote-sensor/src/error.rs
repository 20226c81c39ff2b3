//! 传感器层错误类型定义

use crate::sample::SampleFailure;
use thiserror::Error;
use tote_protocol::ProtocolError;
use tote_transport::TransportError;

/// 传感器层错误类型
#[derive(Error, Debug)]
pub enum SensorError {
    /// 在超时时间内未收到完整响应
    #[error("Sensor read timeout")]
    Timeout,

    /// 响应无法解析为有限数值
    #[error("Malformed sensor reply: {0}")]
    Malformed(String),

    /// 传输不可用（串口未打开 / socket 未连接且重连失败）
    #[error("Sensor not connected")]
    NotConnected,

    /// 当前协议变体不支持该操作
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    /// 其他传输层错误
    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// 协议解析错误（CRC、长度、异常码等）
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl From<TransportError> for SensorError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => SensorError::Timeout,
            TransportError::NotConnected | TransportError::Closed => SensorError::NotConnected,
            other => SensorError::Transport(other),
        }
    }
}

impl SensorError {
    /// 映射为 `WeightSample` 的失败标签
    pub fn failure(&self) -> SampleFailure {
        match self {
            SensorError::Timeout => SampleFailure::Timeout,
            SensorError::Malformed(_) | SensorError::Protocol(_) => SampleFailure::Malformed,
            SensorError::NotConnected | SensorError::Transport(_) => SampleFailure::NotConnected,
            SensorError::Unsupported(_) => SampleFailure::Unsupported,
        }
    }
}
