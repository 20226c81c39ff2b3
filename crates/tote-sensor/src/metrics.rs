//! 传感器链路指标
//!
//! 原子计数器，可以在任何线程读取快照，不会引入锁竞争。

use crate::sample::SampleFailure;
use std::sync::atomic::{AtomicU64, Ordering};

/// 传感器链路实时指标
///
/// # 使用示例
///
/// ```rust
/// use tote_sensor::SensorMetrics;
/// use std::sync::Arc;
/// use std::sync::atomic::Ordering;
///
/// let metrics = Arc::new(SensorMetrics::default());
/// metrics.transactions.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.transactions, 1);
/// ```
#[derive(Debug, Default)]
pub struct SensorMetrics {
    /// 发起的事务总数（读 + 写）
    pub transactions: AtomicU64,

    /// 成功读取到有效重量的次数
    pub weight_reads_ok: AtomicU64,

    /// 超时次数
    pub timeouts: AtomicU64,

    /// 响应无法解析的次数
    pub malformed: AtomicU64,

    /// 传输不可用的次数
    pub not_connected: AtomicU64,

    /// 重连尝试次数（仅 ASCII 变体）
    pub reconnects: AtomicU64,
}

impl SensorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按失败标签累加对应计数器
    pub fn record_failure(&self, failure: SampleFailure) {
        let counter = match failure {
            SampleFailure::Timeout => &self.timeouts,
            SampleFailure::Malformed => &self.malformed,
            SampleFailure::NotConnected => &self.not_connected,
            SampleFailure::Unsupported => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SensorMetricsSnapshot {
        SensorMetricsSnapshot {
            transactions: self.transactions.load(Ordering::Relaxed),
            weight_reads_ok: self.weight_reads_ok.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            not_connected: self.not_connected.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorMetricsSnapshot {
    pub transactions: u64,
    pub weight_reads_ok: u64,
    pub timeouts: u64,
    pub malformed: u64,
    pub not_connected: u64,
    pub reconnects: u64,
}

impl SensorMetricsSnapshot {
    /// 失败率（百分比）；没有事务时返回 0.0
    pub fn failure_rate(&self) -> f64 {
        if self.transactions == 0 {
            return 0.0;
        }
        let failures = self.timeouts + self.malformed + self.not_connected;
        (failures as f64 / self.transactions as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_failure() {
        let metrics = SensorMetrics::new();
        metrics.transactions.fetch_add(4, Ordering::Relaxed);
        metrics.record_failure(SampleFailure::Timeout);
        metrics.record_failure(SampleFailure::Malformed);
        metrics.record_failure(SampleFailure::Unsupported);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.malformed, 1);
        assert_eq!(snapshot.not_connected, 0);
        assert_eq!(snapshot.failure_rate(), 50.0);
    }

    #[test]
    fn test_failure_rate_empty() {
        assert_eq!(SensorMetricsSnapshot::default().failure_rate(), 0.0);
    }
}
