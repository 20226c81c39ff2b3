//! 工位状态看板
//!
//! 控制线程每个 tick 发布一次快照，其他线程（控制台、遥测）无锁读取。

use crate::types::{ToteBatch, ToteFillState};
use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::Arc;

/// 工位状态快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationStatus {
    pub state: ToteFillState,
    pub last_weight_kg: Option<f64>,
    pub batch: ToteBatch,
    /// 当前传感器故障（`timeout` / `malformed` / ...），正常时为 `None`
    pub sensor_fault: Option<&'static str>,
    /// 传感器离线导致出料暂停
    pub paused: bool,
    pub manual_override: bool,
    pub ticks: u64,
}

impl Default for StationStatus {
    fn default() -> Self {
        Self {
            state: ToteFillState::Idle,
            last_weight_kg: None,
            batch: ToteBatch::new(0.0, 0.0),
            sensor_fault: None,
            paused: false,
            manual_override: false,
            ticks: 0,
        }
    }
}

/// 状态看板（克隆共享）
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<ArcSwap<StationStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, status: StationStatus) {
        self.inner.store(Arc::new(status));
    }

    /// 获取最新快照（无锁）
    pub fn snapshot(&self) -> Arc<StationStatus> {
        self.inner.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_visible_to_clones() {
        let board = StatusBoard::new();
        let reader = board.clone();
        assert_eq!(reader.snapshot().state, ToteFillState::Idle);

        board.publish(StationStatus {
            state: ToteFillState::WaitingId,
            last_weight_kg: Some(14.2),
            ticks: 9,
            ..StationStatus::default()
        });
        let status = reader.snapshot();
        assert_eq!(status.state, ToteFillState::WaitingId);
        assert_eq!(status.last_weight_kg, Some(14.2));
    }
}
