//! # Tote Protocol
//!
//! 称重仪表通信协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `registers`: Modbus 寄存器 / 线圈地址常量
//! - `weight`: 重量 <-> 寄存器对 编解码（int32 ×100）
//! - `modbus`: Modbus RTU 请求构建、响应解析、CRC16
//! - `ascii`: ASCII 行协议（`.R<id>:<dim>` / `.W<id>:<dim>:<value>`）
//!
//! ## 字节序
//!
//! - Modbus RTU 帧内 16 位字段为大端（高字节在前），CRC 为小端（低字节在前）。
//! - 32 位重量值由两个连续寄存器组成：**低字在前**（`low | high << 16`）。

pub mod ascii;
pub mod modbus;
pub mod registers;
pub mod weight;

// 重新导出常用类型
pub use ascii::*;
pub use modbus::*;
pub use registers::*;
pub use weight::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },

    #[error("Unexpected slave id: expected {expected}, got {actual}")]
    UnexpectedSlave { expected: u8, actual: u8 },

    #[error("Unexpected function code: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedFunction { expected: u8, actual: u8 },

    #[error("Modbus exception 0x{code:02X} for function 0x{function:02X}")]
    Exception { function: u8, code: u8 },

    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    #[error("Value out of range: {0}")]
    OutOfRange(f64),
}

/// 大端字节序转 u16
pub fn bytes_to_u16_be(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

/// u16 转大端字节序
pub fn u16_to_bytes_be(value: u16) -> [u8; 2] {
    value.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_u16_be() {
        assert_eq!(bytes_to_u16_be([0x12, 0x34]), 0x1234);
        assert_eq!(u16_to_bytes_be(0x03E8), [0x03, 0xE8]);
    }

    #[test]
    fn test_error_display() {
        let err = ProtocolError::InvalidLength {
            expected: 9,
            actual: 4,
        };
        assert_eq!(
            format!("{}", err),
            "Invalid frame length: expected 9, got 4"
        );

        let err = ProtocolError::CrcMismatch {
            expected: 0x1234,
            actual: 0xABCD,
        };
        assert!(format!("{}", err).contains("0x1234"));
    }
}
