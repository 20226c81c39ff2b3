//! 重量采样结果
//!
//! 一次读取要么得到**有限**的千克值，要么得到失败标签。
//! 不存在"读失败时返回 0"这种中间态：`0.0` 永远表示真实的零读数。

use crate::error::SensorError;
use std::fmt;

/// 读取失败标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFailure {
    /// 超时未收到响应
    Timeout,
    /// 响应无法解析为有限数值
    Malformed,
    /// 传输不可用
    NotConnected,
    /// 当前协议变体不提供该量（如 ASCII 变体的净重）
    Unsupported,
}

impl SampleFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleFailure::Timeout => "timeout",
            SampleFailure::Malformed => "malformed",
            SampleFailure::NotConnected => "not connected",
            SampleFailure::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for SampleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次重量读取的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightSample {
    Kg(f64),
    Failed(SampleFailure),
}

impl WeightSample {
    /// 从数值构建；非有限值视为 `Malformed`
    pub fn from_kg(value: f64) -> Self {
        if value.is_finite() {
            WeightSample::Kg(value)
        } else {
            WeightSample::Failed(SampleFailure::Malformed)
        }
    }

    /// 有效读数
    pub fn kg(&self) -> Option<f64> {
        match *self {
            WeightSample::Kg(v) => Some(v),
            WeightSample::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<SampleFailure> {
        match *self {
            WeightSample::Kg(_) => None,
            WeightSample::Failed(f) => Some(f),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, WeightSample::Kg(_))
    }
}

impl From<Result<f64, SensorError>> for WeightSample {
    fn from(result: Result<f64, SensorError>) -> Self {
        match result {
            Ok(value) => WeightSample::from_kg(value),
            Err(e) => WeightSample::Failed(e.failure()),
        }
    }
}

impl fmt::Display for WeightSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightSample::Kg(v) => write!(f, "{:.2} kg", v),
            WeightSample::Failed(failure) => write!(f, "<{}>", failure),
        }
    }
}
