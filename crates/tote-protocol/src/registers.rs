//! Modbus 寄存器 / 线圈地址常量
//!
//! 称重仪表（RS-485, 9600 8N1）暴露的固定地址映射。
//! 每个重量值占两个连续的保持寄存器（低字在前），单位 0.01 kg。

/// 默认从站地址
pub const DEFAULT_SLAVE_ID: u8 = 1;

/// 默认串口波特率
pub const DEFAULT_BAUD_RATE: u32 = 9600;

// ============================================================================
// 保持寄存器（Function 0x03）
// ============================================================================

/// 毛重（低字 / 高字）
pub const REG_GROSS_WEIGHT_LOW: u16 = 2;
pub const REG_GROSS_WEIGHT_HIGH: u16 = 3;

/// 净重（低字 / 高字）
pub const REG_NET_WEIGHT_LOW: u16 = 4;
pub const REG_NET_WEIGHT_HIGH: u16 = 5;

/// 皮重（低字 / 高字）
pub const REG_TARE_VALUE_LOW: u16 = 6;
pub const REG_TARE_VALUE_HIGH: u16 = 7;

/// 一个重量值占用的寄存器数量
pub const WEIGHT_REGISTER_COUNT: u16 = 2;

// ============================================================================
// 线圈（Function 0x01 读 / 0x05 写）
// ============================================================================

/// 重量稳定标志（只读）
pub const COIL_WEIGHT_STABLE: u16 = 1;

/// 置零（一次性写入）
pub const COIL_ZERO: u16 = 1000;

/// 去皮（一次性写入）
pub const COIL_TARE: u16 = 1002;

/// 清除皮重（一次性写入）
pub const COIL_CLEAR_TARE: u16 = 1003;

/// 重量寄存器分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightRegister {
    Gross,
    Net,
    Tare,
}

impl WeightRegister {
    /// 低字寄存器地址
    pub fn low_address(self) -> u16 {
        match self {
            WeightRegister::Gross => REG_GROSS_WEIGHT_LOW,
            WeightRegister::Net => REG_NET_WEIGHT_LOW,
            WeightRegister::Tare => REG_TARE_VALUE_LOW,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WeightRegister::Gross => "gross",
            WeightRegister::Net => "net",
            WeightRegister::Tare => "tare",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_pairs_are_consecutive() {
        assert_eq!(REG_GROSS_WEIGHT_HIGH, REG_GROSS_WEIGHT_LOW + 1);
        assert_eq!(REG_NET_WEIGHT_HIGH, REG_NET_WEIGHT_LOW + 1);
        assert_eq!(REG_TARE_VALUE_HIGH, REG_TARE_VALUE_LOW + 1);
    }

    #[test]
    fn test_weight_register_addresses() {
        assert_eq!(WeightRegister::Gross.low_address(), 2);
        assert_eq!(WeightRegister::Net.low_address(), 4);
        assert_eq!(WeightRegister::Tare.low_address(), 6);
    }
}
