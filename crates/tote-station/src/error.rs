//! 错误类型定义

use crate::types::ToteFillState;
use thiserror::Error;
use tote_sensor::SensorError;

/// 阶段生命周期错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("Stage '{0}' already started")]
    AlreadyStarted(&'static str),
    #[error("Stage '{0}' has no reference weight")]
    MissingReference(&'static str),
    #[error("{0} already recorded for this batch")]
    AlreadyRecorded(&'static str),
}

/// 工位层错误
#[derive(Error, Debug)]
pub enum StationError {
    #[error("Tote ID must not be empty")]
    IdentifierEmpty,
    #[error("Tote ID too long: {len} bytes (max {max})")]
    IdentifierTooLong { len: usize, max: usize },
    #[error("Tote ID '{id}' rejected: {reason}")]
    IdentifierRejected { id: String, reason: String },
    #[error("Not allowed in state {actual} (requires {expected})")]
    WrongState {
        expected: ToteFillState,
        actual: ToteFillState,
    },
    #[error("Manual override rejected in state {0}")]
    ManualOverrideRejected(ToteFillState),
    #[error("Output write failed: {0}")]
    Output(String),
    #[error("Stage error: {0}")]
    Stage(#[from] StageError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),
    #[error("External fault: {0}")]
    Fault(String),
    #[error("Station command channel closed")]
    ChannelClosed,
    #[error("Timed out waiting for station reply")]
    ReplyTimeout,
}

impl StationError {
    /// 是否为输出（阀门）故障，需进入 ERROR 状态
    pub fn is_output_failure(&self) -> bool {
        matches!(self, StationError::Output(_))
    }
}
