//! ASCII 行协议
//!
//! 以换行结尾的请求/响应：
//!
//! ```text
//! 读:   .R<model-id>:<dimension>\n          例: .R85:2\n
//! 应答: ...:<value>kg                        例: .D.85.2:-2.00kg
//! 写:   .W<model-id>:<dimension>:<value>\n  例: .W113:1:1\n
//! ```
//!
//! 应答中的数值位于**最后一个** `:` 与字面量 `kg` 之间。
//! 空值、非数字或非有限值一律视为格式错误，绝不以 0 代替。

use crate::ProtocolError;
use std::fmt;

/// 默认重量模型 ID
pub const WEIGHT_MODEL_ID: u16 = 85;

/// 默认去皮模型 ID
pub const TARE_MODEL_ID: u16 = 113;

/// 默认重量维度
pub const WEIGHT_DIMENSION: u16 = 2;

/// 默认去皮维度
pub const TARE_DIMENSION: u16 = 1;

/// 重量单位后缀
pub const WEIGHT_UNIT_SUFFIX: &str = "kg";

/// ASCII 命令
#[derive(Debug, Clone, PartialEq)]
pub enum AsciiCommand {
    Read { model_id: u16, dimension: u16 },
    Write { model_id: u16, dimension: u16, value: String },
}

impl AsciiCommand {
    pub fn read(model_id: u16, dimension: u16) -> Self {
        AsciiCommand::Read {
            model_id,
            dimension,
        }
    }

    pub fn write(model_id: u16, dimension: u16, value: impl Into<String>) -> Self {
        AsciiCommand::Write {
            model_id,
            dimension,
            value: value.into(),
        }
    }

    /// 编码为带换行的完整请求行
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for AsciiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsciiCommand::Read {
                model_id,
                dimension,
            } => write!(f, ".R{}:{}", model_id, dimension),
            AsciiCommand::Write {
                model_id,
                dimension,
                value,
            } => write!(f, ".W{}:{}:{}", model_id, dimension, value),
        }
    }
}

/// 从应答行中提取千克值
///
/// # Errors
/// 缺少 `:` 或 `kg`、数值为空、不是数字或不是有限值时返回 `MalformedReply`。
pub fn parse_weight_reply(line: &str) -> Result<f64, ProtocolError> {
    let line = line.trim();
    let colon = line
        .rfind(':')
        .ok_or_else(|| ProtocolError::MalformedReply(format!("missing ':' in {:?}", line)))?;
    let tail = &line[colon + 1..];
    let unit = tail.find(WEIGHT_UNIT_SUFFIX).ok_or_else(|| {
        ProtocolError::MalformedReply(format!("missing unit suffix in {:?}", line))
    })?;
    let text = tail[..unit].trim();
    if text.is_empty() {
        return Err(ProtocolError::MalformedReply(format!(
            "empty value in {:?}",
            line
        )));
    }
    let value: f64 = text
        .parse()
        .map_err(|_| ProtocolError::MalformedReply(format!("non-numeric value {:?}", text)))?;
    if !value.is_finite() {
        return Err(ProtocolError::MalformedReply(format!(
            "non-finite value {:?}",
            text
        )));
    }
    Ok(value)
}
