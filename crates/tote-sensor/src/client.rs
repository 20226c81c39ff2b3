//! 称重传感器客户端能力接口
//!
//! # 设计
//!
//! - **构造时选择变体**：Modbus RTU（寄存器/线圈）与 ASCII 行协议实现同一个 trait，
//!   上层只持有 `Box<dyn WeightSensorClient>`，测试时可替换为任意假实现
//! - **单次事务**：每个读取只发一次请求，阻塞到响应或固定超时，不做重试
//!   （ASCII 变体在断线时例外：允许一次重连后重试）
//! - **不伪造数值**：失败一律通过 `WeightSample::Failed` 上报
//!
//! 基本操作（所有变体都必须实现）：
//!
//! | 方法 | 说明 |
//! |------|------|
//! | `read_gross_weight_kg` | 毛重 |
//! | `read_net_weight_kg` | 净重（ASCII 变体返回 `Unsupported`） |
//! | `set_tare` | 去皮命令，返回是否被确认，不验证效果 |
//! | `is_reachable` | 传输是否可用（仅为活性提示） |
//!
//! 扩展操作（默认实现返回 `Unsupported`）：`read_tare_kg`、`set_zero`、`clear_tare`、
//! `is_weight_stable`。

use crate::error::SensorError;
use crate::sample::WeightSample;

/// 称重传感器客户端
pub trait WeightSensorClient: Send {
    /// 读取毛重
    fn read_gross_weight_kg(&mut self) -> WeightSample;

    /// 读取净重
    fn read_net_weight_kg(&mut self) -> WeightSample;

    /// 去皮，返回命令是否被仪表确认
    fn set_tare(&mut self) -> bool;

    /// 传输是否可用
    fn is_reachable(&self) -> bool;

    /// 协议变体名称（日志用）
    fn variant(&self) -> &'static str;

    /// 读取仪表内部保存的皮重
    fn read_tare_kg(&mut self) -> Result<f64, SensorError> {
        Err(SensorError::Unsupported("tare readback"))
    }

    /// 置零
    fn set_zero(&mut self) -> Result<(), SensorError> {
        Err(SensorError::Unsupported("zero command"))
    }

    /// 清除皮重
    fn clear_tare(&mut self) -> Result<(), SensorError> {
        Err(SensorError::Unsupported("clear tare command"))
    }

    /// 读取"重量稳定"标志
    fn is_weight_stable(&mut self) -> Result<bool, SensorError> {
        Err(SensorError::Unsupported("stability flag"))
    }
}

impl<S: WeightSensorClient + ?Sized> WeightSensorClient for Box<S> {
    fn read_gross_weight_kg(&mut self) -> WeightSample {
        (**self).read_gross_weight_kg()
    }

    fn read_net_weight_kg(&mut self) -> WeightSample {
        (**self).read_net_weight_kg()
    }

    fn set_tare(&mut self) -> bool {
        (**self).set_tare()
    }

    fn is_reachable(&self) -> bool {
        (**self).is_reachable()
    }

    fn variant(&self) -> &'static str {
        (**self).variant()
    }

    fn read_tare_kg(&mut self) -> Result<f64, SensorError> {
        (**self).read_tare_kg()
    }

    fn set_zero(&mut self) -> Result<(), SensorError> {
        (**self).set_zero()
    }

    fn clear_tare(&mut self) -> Result<(), SensorError> {
        (**self).clear_tare()
    }

    fn is_weight_stable(&mut self) -> Result<bool, SensorError> {
        (**self).is_weight_stable()
    }
}
