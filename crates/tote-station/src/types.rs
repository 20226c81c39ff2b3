//! 业务数据类型：填充状态、托盘 ID、批次记录

use crate::error::{StageError, StationError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 托盘 ID 最大字节数（设备端缓冲区 32 字节，含结尾 `\0`）
pub const DEFAULT_MAX_ID_LEN: usize = 31;

/// 填充流程状态
///
/// 只能由 `ToteFillOrchestrator` 的状态转移函数修改，外部事件通过入口方法投递。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToteFillState {
    #[default]
    Idle,
    DispensingIce,
    DispensingWater,
    WaitingId,
    Completed,
    Canceled,
    Error,
}

impl ToteFillState {
    /// 状态名（与遥测中的 `state` 字段一致）
    pub fn as_str(&self) -> &'static str {
        match self {
            ToteFillState::Idle => "IDLE",
            ToteFillState::DispensingIce => "DISPENSING_ICE",
            ToteFillState::DispensingWater => "DISPENSING_WATER",
            ToteFillState::WaitingId => "WAITING_ID",
            ToteFillState::Completed => "COMPLETED",
            ToteFillState::Canceled => "CANCELED",
            ToteFillState::Error => "ERROR",
        }
    }

    /// 是否处于出料阶段（阀门可能打开）
    pub fn is_dispensing(&self) -> bool {
        matches!(
            self,
            ToteFillState::DispensingIce | ToteFillState::DispensingWater
        )
    }

    /// 是否接受停止事件
    pub fn accepts_stop(&self) -> bool {
        !matches!(self, ToteFillState::Completed | ToteFillState::Error)
    }
}

impl fmt::Display for ToteFillState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 经过长度校验的托盘 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToteId(String);

impl ToteId {
    /// 校验并构建 ID（去掉首尾空白）
    ///
    /// # Errors
    /// - `IdentifierEmpty`: 空字符串
    /// - `IdentifierTooLong`: 超过 `max_len` 字节
    pub fn parse(raw: &str, max_len: usize) -> Result<Self, StationError> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(StationError::IdentifierEmpty);
        }
        if id.len() > max_len {
            return Err(StationError::IdentifierTooLong {
                len: id.len(),
                max: max_len,
            });
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 一个填充周期的批次记录
///
/// - `ice_out_kg` / `water_out_kg` 由对应阶段的退出动作**只写一次**，之后再写返回错误
/// - 写入前钳位到 `>= 0` 并按 0.01 kg 取整
/// - `id` 在进入 COMPLETED 后不再改变（由编排器保证）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToteBatch {
    pub id: Option<ToteId>,
    pub lot_number: Option<String>,
    /// 上游工位报告的托盘+残留重量
    pub raw_kg: Option<f64>,
    pub fish_kg: f64,
    pub initial_weight_kg: f64,
    pub target_ice_kg: f64,
    pub target_water_kg: f64,
    ice_out_kg: Option<f64>,
    water_out_kg: Option<f64>,
}

impl ToteBatch {
    pub fn new(target_ice_kg: f64, target_water_kg: f64) -> Self {
        Self {
            id: None,
            lot_number: None,
            raw_kg: None,
            fish_kg: 0.0,
            initial_weight_kg: 0.0,
            target_ice_kg,
            target_water_kg,
            ice_out_kg: None,
            water_out_kg: None,
        }
    }

    /// 清空为初始状态（保留目标值）
    pub fn reset(&mut self) {
        *self = Self::new(self.target_ice_kg, self.target_water_kg);
    }

    /// 是否为空批次（未开始任何记录）
    pub fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.lot_number.is_none()
            && self.raw_kg.is_none()
            && self.fish_kg == 0.0
            && self.initial_weight_kg == 0.0
            && self.ice_out_kg.is_none()
            && self.water_out_kg.is_none()
    }

    pub fn ice_out_kg(&self) -> Option<f64> {
        self.ice_out_kg
    }

    pub fn water_out_kg(&self) -> Option<f64> {
        self.water_out_kg
    }

    /// 记录出冰量，返回实际写入值
    pub fn record_ice(&mut self, kg: f64) -> Result<f64, StageError> {
        if self.ice_out_kg.is_some() {
            return Err(StageError::AlreadyRecorded("ice_out_kg"));
        }
        let value = sanitize_quantity(kg);
        self.ice_out_kg = Some(value);
        Ok(value)
    }

    /// 记录出水量，返回实际写入值
    pub fn record_water(&mut self, kg: f64) -> Result<f64, StageError> {
        if self.water_out_kg.is_some() {
            return Err(StageError::AlreadyRecorded("water_out_kg"));
        }
        let value = sanitize_quantity(kg);
        self.water_out_kg = Some(value);
        Ok(value)
    }
}

/// 钳位到非负有限值，按 0.01 kg 取整
pub(crate) fn sanitize_quantity(kg: f64) -> f64 {
    if !kg.is_finite() || kg <= 0.0 {
        return 0.0;
    }
    round_centi(kg)
}

pub(crate) fn round_centi(kg: f64) -> f64 {
    (kg * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(ToteFillState::WaitingId.as_str(), "WAITING_ID");
        assert_eq!(
            serde_json::to_string(&ToteFillState::DispensingIce).unwrap(),
            "\"DISPENSING_ICE\""
        );
        assert!(!ToteFillState::Completed.accepts_stop());
        assert!(!ToteFillState::Error.accepts_stop());
        assert!(ToteFillState::DispensingWater.accepts_stop());
    }

    #[test]
    fn test_tote_id_limits() {
        assert_eq!(ToteId::parse("  T-001 ", 31).unwrap().as_str(), "T-001");
        assert!(matches!(
            ToteId::parse("   ", 31),
            Err(StationError::IdentifierEmpty)
        ));
        let long = "X".repeat(32);
        assert!(matches!(
            ToteId::parse(&long, 31),
            Err(StationError::IdentifierTooLong { len: 32, max: 31 })
        ));
        assert!(ToteId::parse(&"X".repeat(31), 31).is_ok());
    }

    #[test]
    fn test_record_once() {
        let mut batch = ToteBatch::new(2.0, 2.0);
        assert_eq!(batch.record_ice(2.1).unwrap(), 2.1);
        assert_eq!(
            batch.record_ice(3.0),
            Err(StageError::AlreadyRecorded("ice_out_kg"))
        );
        assert_eq!(batch.ice_out_kg(), Some(2.1));
    }

    #[test]
    fn test_record_clamps_negative_and_nan() {
        let mut batch = ToteBatch::new(2.0, 2.0);
        assert_eq!(batch.record_ice(-0.3).unwrap(), 0.0);
        assert_eq!(batch.record_water(f64::NAN).unwrap(), 0.0);
    }

    #[test]
    fn test_reset_keeps_targets() {
        let mut batch = ToteBatch::new(1.5, 2.5);
        batch.fish_kg = 10.0;
        batch.lot_number = Some("L1".into());
        batch.record_water(1.0).unwrap();
        batch.reset();
        assert!(batch.is_empty());
        assert_eq!(batch.target_ice_kg, 1.5);
        assert_eq!(batch.target_water_kg, 2.5);
    }
}
