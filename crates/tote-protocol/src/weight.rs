//! 重量值与寄存器对之间的转换
//!
//! 仪表将重量以 `int32` 形式（单位 0.01 kg）存放在两个连续寄存器中：
//!
//! ```text
//! value_kg = int32(low | high << 16) / 100.0
//! ```
//!
//! 编码时先四舍五入到 0.01 kg，保证两位小数的值可以无漂移往返。

use crate::ProtocolError;

/// 重量比例因子（寄存器单位 = 0.01 kg）
pub const WEIGHT_SCALE: f64 = 100.0;

/// 两个连续保持寄存器组成的重量值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WeightRegisters {
    /// 低 16 位（地址较小的寄存器）
    pub low: u16,
    /// 高 16 位
    pub high: u16,
}

impl WeightRegisters {
    pub fn new(low: u16, high: u16) -> Self {
        Self { low, high }
    }

    /// 从响应中的寄存器切片构建（至少两个寄存器）
    pub fn from_slice(registers: &[u16]) -> Result<Self, ProtocolError> {
        match registers {
            [low, high, ..] => Ok(Self::new(*low, *high)),
            _ => Err(ProtocolError::InvalidLength {
                expected: 2,
                actual: registers.len(),
            }),
        }
    }

    /// 原始 int32 值（0.01 kg）
    pub fn raw(&self) -> i32 {
        (((self.high as u32) << 16) | self.low as u32) as i32
    }

    /// 转换为千克
    pub fn to_kg(&self) -> f64 {
        self.raw() as f64 / WEIGHT_SCALE
    }

    /// 从千克编码
    ///
    /// # Errors
    /// 非有限值或超出 `i32` 表示范围时返回 `ProtocolError::OutOfRange`。
    pub fn from_kg(value_kg: f64) -> Result<Self, ProtocolError> {
        let scaled = (value_kg * WEIGHT_SCALE).round();
        if !scaled.is_finite() || scaled < i32::MIN as f64 || scaled > i32::MAX as f64 {
            return Err(ProtocolError::OutOfRange(value_kg));
        }
        let raw = scaled as i32 as u32;
        Ok(Self {
            low: (raw & 0xFFFF) as u16,
            high: (raw >> 16) as u16,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_exact() {
        let regs = WeightRegisters::from_kg(123.45).unwrap();
        assert_eq!(regs.raw(), 12345);
        assert_eq!(regs.low, 12345);
        assert_eq!(regs.high, 0);
        assert_eq!(regs.to_kg(), 123.45);
    }

    #[test]
    fn test_negative_weight() {
        let regs = WeightRegisters::from_kg(-2.0).unwrap();
        assert_eq!(regs.low, 0xFF38);
        assert_eq!(regs.high, 0xFFFF);
        assert_eq!(regs.to_kg(), -2.0);
    }

    #[test]
    fn test_high_word_used() {
        // 1000.00 kg = 100000 = 0x0001_86A0
        let regs = WeightRegisters::new(0x86A0, 0x0001);
        assert_eq!(regs.to_kg(), 1000.0);
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(WeightRegisters::from_kg(f64::NAN).is_err());
        assert!(WeightRegisters::from_kg(f64::INFINITY).is_err());
        assert!(WeightRegisters::from_kg(1e9).is_err());
    }

    #[test]
    fn test_from_slice_too_short() {
        let err = WeightRegisters::from_slice(&[1]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidLength {
                expected: 2,
                actual: 1
            }
        );
    }
}
