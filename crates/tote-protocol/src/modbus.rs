//! Modbus RTU 帧编解码
//!
//! 仅覆盖称重仪表用到的三个功能码：
//!
//! | 功能码 | 用途 |
//! |--------|------|
//! | 0x01 Read Coils | 读取"重量稳定"标志 |
//! | 0x03 Read Holding Registers | 读取毛重/净重/皮重寄存器对 |
//! | 0x05 Write Single Coil | 置零/去皮/清皮 一次性命令 |
//!
//! # 帧格式
//!
//! ```text
//! 请求:  [slave][func][addr_hi][addr_lo][val_hi][val_lo][crc_lo][crc_hi]
//! 响应:  [slave][func][byte_count][data...][crc_lo][crc_hi]   (0x01/0x03)
//!        [slave][func][addr_hi][addr_lo][val_hi][val_lo][crc_lo][crc_hi]  (0x05 回显)
//! 异常:  [slave][func | 0x80][exception_code][crc_lo][crc_hi]
//! ```

use crate::ProtocolError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use smallvec::SmallVec;

/// RTU 帧缓冲区（栈上分配，覆盖所有本协议用到的帧长度）
pub type RtuFrame = SmallVec<[u8; 16]>;

/// 异常响应帧长度
pub const EXCEPTION_FRAME_LEN: usize = 5;

/// 最短合法响应帧长度
pub const MIN_RESPONSE_LEN: usize = 5;

/// 写线圈 ON 值
const COIL_ON: u16 = 0xFF00;
/// 写线圈 OFF 值
const COIL_OFF: u16 = 0x0000;

/// 支持的功能码
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FunctionCode {
    ReadCoils = 0x01,
    ReadHoldingRegisters = 0x03,
    WriteSingleCoil = 0x05,
}

/// 主站请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModbusRequest {
    ReadCoils { address: u16, quantity: u16 },
    ReadHoldingRegisters { address: u16, quantity: u16 },
    WriteSingleCoil { address: u16, value: bool },
}

impl ModbusRequest {
    pub fn function(&self) -> FunctionCode {
        match self {
            ModbusRequest::ReadCoils { .. } => FunctionCode::ReadCoils,
            ModbusRequest::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            ModbusRequest::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
        }
    }

    /// 编码为完整 RTU 帧（含 CRC）
    pub fn encode(&self, slave: u8) -> RtuFrame {
        let (address, value) = match *self {
            ModbusRequest::ReadCoils { address, quantity } => (address, quantity),
            ModbusRequest::ReadHoldingRegisters { address, quantity } => (address, quantity),
            ModbusRequest::WriteSingleCoil { address, value } => {
                (address, if value { COIL_ON } else { COIL_OFF })
            },
        };

        let mut frame = RtuFrame::new();
        frame.push(slave);
        frame.push(self.function().into());
        frame.extend_from_slice(&address.to_be_bytes());
        frame.extend_from_slice(&value.to_be_bytes());
        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    /// 正常响应的完整帧长度
    pub fn expected_response_len(&self) -> usize {
        match *self {
            ModbusRequest::ReadCoils { quantity, .. } => 5 + coil_byte_count(quantity),
            ModbusRequest::ReadHoldingRegisters { quantity, .. } => 5 + 2 * quantity as usize,
            ModbusRequest::WriteSingleCoil { .. } => 8,
        }
    }

    /// 根据已收到的前缀判断还需要读多少字节
    ///
    /// 功能码字节的最高位置位说明是异常响应，长度固定为 5。
    pub fn response_len_for(&self, received: &[u8]) -> usize {
        match received.get(1) {
            Some(func) if func & 0x80 != 0 => EXCEPTION_FRAME_LEN,
            _ => self.expected_response_len(),
        }
    }
}

/// 解析后的响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusResponse {
    /// 线圈状态（已截断到请求数量）
    Coils(SmallVec<[bool; 8]>),
    /// 寄存器值
    Registers(SmallVec<[u16; 4]>),
    /// 写线圈回显
    CoilWritten { address: u16, value: bool },
}

fn coil_byte_count(quantity: u16) -> usize {
    (quantity as usize).div_ceil(8)
}

/// 解析从站响应帧
///
/// # Errors
/// - `InvalidLength`: 帧长度与请求不符
/// - `CrcMismatch`: CRC 校验失败
/// - `UnexpectedSlave` / `UnexpectedFunction`: 地址或功能码不匹配
/// - `Exception`: 从站返回异常码
/// - `MalformedReply`: 字节计数或回显内容不一致
pub fn decode_response(
    request: &ModbusRequest,
    slave: u8,
    frame: &[u8],
) -> Result<ModbusResponse, ProtocolError> {
    if frame.len() < MIN_RESPONSE_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: request.expected_response_len(),
            actual: frame.len(),
        });
    }

    let (body, crc_bytes) = frame.split_at(frame.len() - 2);
    let received_crc = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    let computed_crc = crc16(body);
    if received_crc != computed_crc {
        return Err(ProtocolError::CrcMismatch {
            expected: computed_crc,
            actual: received_crc,
        });
    }

    if body[0] != slave {
        return Err(ProtocolError::UnexpectedSlave {
            expected: slave,
            actual: body[0],
        });
    }

    let function: u8 = request.function().into();
    if body[1] == function | 0x80 {
        return Err(ProtocolError::Exception {
            function,
            code: body[2],
        });
    }
    if body[1] != function {
        return Err(ProtocolError::UnexpectedFunction {
            expected: function,
            actual: body[1],
        });
    }

    let expected_len = request.expected_response_len();
    if frame.len() != expected_len {
        return Err(ProtocolError::InvalidLength {
            expected: expected_len,
            actual: frame.len(),
        });
    }

    match *request {
        ModbusRequest::ReadCoils { quantity, .. } => {
            let data = checked_payload(body, coil_byte_count(quantity))?;
            let coils = (0..quantity as usize)
                .map(|i| data[i / 8] & (1 << (i % 8)) != 0)
                .collect();
            Ok(ModbusResponse::Coils(coils))
        },
        ModbusRequest::ReadHoldingRegisters { quantity, .. } => {
            let data = checked_payload(body, 2 * quantity as usize)?;
            let registers = data
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            Ok(ModbusResponse::Registers(registers))
        },
        ModbusRequest::WriteSingleCoil { address, value } => {
            let echoed_address = u16::from_be_bytes([body[2], body[3]]);
            let echoed_value = match u16::from_be_bytes([body[4], body[5]]) {
                COIL_ON => true,
                COIL_OFF => false,
                other => {
                    return Err(ProtocolError::MalformedReply(format!(
                        "invalid coil value 0x{:04X}",
                        other
                    )));
                },
            };
            if echoed_address != address || echoed_value != value {
                return Err(ProtocolError::MalformedReply(format!(
                    "write echo mismatch: coil {} = {}",
                    echoed_address, echoed_value
                )));
            }
            Ok(ModbusResponse::CoilWritten {
                address,
                value: echoed_value,
            })
        },
    }
}

fn checked_payload(body: &[u8], expected_count: usize) -> Result<&[u8], ProtocolError> {
    let byte_count = body[2] as usize;
    if byte_count != expected_count || body.len() != 3 + byte_count {
        return Err(ProtocolError::MalformedReply(format!(
            "byte count {} (expected {})",
            byte_count, expected_count
        )));
    }
    Ok(&body[3..])
}

/// Modbus CRC16（多项式 0xA001 反射，初值 0xFFFF）
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// 为帧追加 CRC（测试与模拟从站使用）
pub fn append_crc(frame: &mut RtuFrame) {
    let crc = crc16(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_crc(bytes: &[u8]) -> RtuFrame {
        let mut frame = RtuFrame::from_slice(bytes);
        append_crc(&mut frame);
        frame
    }

    #[test]
    fn test_crc16_known_vectors() {
        // 01 03 00 00 00 0A -> C5 CD
        assert_eq!(crc16(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]).to_le_bytes(), [0xC5, 0xCD]);
        // 01 03 00 00 00 01 -> 84 0A
        assert_eq!(crc16(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]).to_le_bytes(), [0x84, 0x0A]);
    }

    #[test]
    fn test_encode_read_holding_registers() {
        let req = ModbusRequest::ReadHoldingRegisters {
            address: 2,
            quantity: 2,
        };
        let frame = req.encode(1);
        assert_eq!(frame.len(), 8);
        assert_eq!(&frame[..6], &[0x01, 0x03, 0x00, 0x02, 0x00, 0x02]);
        assert_eq!(crc16(&frame[..6]).to_le_bytes(), [frame[6], frame[7]]);
        assert_eq!(req.expected_response_len(), 9);
    }

    #[test]
    fn test_encode_write_coil() {
        let req = ModbusRequest::WriteSingleCoil {
            address: 1002,
            value: true,
        };
        let frame = req.encode(1);
        assert_eq!(&frame[..6], &[0x01, 0x05, 0x03, 0xEA, 0xFF, 0x00]);
        assert_eq!(req.expected_response_len(), 8);
    }

    #[test]
    fn test_decode_registers() {
        let req = ModbusRequest::ReadHoldingRegisters {
            address: 2,
            quantity: 2,
        };
        let frame = with_crc(&[0x01, 0x03, 0x04, 0x30, 0x39, 0x00, 0x00]);
        let resp = decode_response(&req, 1, &frame).unwrap();
        match resp {
            ModbusResponse::Registers(regs) => assert_eq!(regs.as_slice(), &[0x3039, 0x0000]),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_decode_coils() {
        let req = ModbusRequest::ReadCoils {
            address: 1,
            quantity: 1,
        };
        let frame = with_crc(&[0x01, 0x01, 0x01, 0x01]);
        assert_eq!(
            decode_response(&req, 1, &frame).unwrap(),
            ModbusResponse::Coils(SmallVec::from_slice(&[true]))
        );
    }

    #[test]
    fn test_decode_write_echo() {
        let req = ModbusRequest::WriteSingleCoil {
            address: 1002,
            value: true,
        };
        let frame = req.encode(1);
        assert_eq!(
            decode_response(&req, 1, &frame).unwrap(),
            ModbusResponse::CoilWritten {
                address: 1002,
                value: true
            }
        );
    }

    #[test]
    fn test_decode_exception() {
        let req = ModbusRequest::ReadHoldingRegisters {
            address: 2,
            quantity: 2,
        };
        let frame = with_crc(&[0x01, 0x83, 0x02]);
        assert_eq!(req.response_len_for(&frame[..2]), EXCEPTION_FRAME_LEN);
        assert_eq!(
            decode_response(&req, 1, &frame).unwrap_err(),
            ProtocolError::Exception {
                function: 0x03,
                code: 0x02
            }
        );
    }

    #[test]
    fn test_decode_bad_crc() {
        let req = ModbusRequest::ReadHoldingRegisters {
            address: 2,
            quantity: 2,
        };
        let mut frame = with_crc(&[0x01, 0x03, 0x04, 0x30, 0x39, 0x00, 0x00]);
        frame[3] ^= 0xFF;
        assert!(matches!(
            decode_response(&req, 1, &frame),
            Err(ProtocolError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_wrong_slave_and_length() {
        let req = ModbusRequest::ReadHoldingRegisters {
            address: 2,
            quantity: 2,
        };
        let frame = with_crc(&[0x07, 0x03, 0x04, 0x30, 0x39, 0x00, 0x00]);
        assert!(matches!(
            decode_response(&req, 1, &frame),
            Err(ProtocolError::UnexpectedSlave { expected: 1, actual: 7 })
        ));

        let short = with_crc(&[0x01, 0x03, 0x02, 0x30, 0x39]);
        assert!(matches!(
            decode_response(&req, 1, &short),
            Err(ProtocolError::InvalidLength { expected: 9, actual: 7 })
        ));

        assert!(matches!(
            decode_response(&req, 1, &[0x01, 0x03]),
            Err(ProtocolError::InvalidLength { .. })
        ));
    }
}
