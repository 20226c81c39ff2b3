//! 重量广播节流：变化超过阈值或距上次广播超过间隔时才发送

use std::time::{Duration, Instant};

/// 浮点比较容差（0.02 kg 的差值在二进制下可能略小于 0.02）
const DELTA_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct WeightThrottle {
    min_interval: Duration,
    min_delta_kg: f64,
    last: Option<(f64, Instant)>,
}

impl WeightThrottle {
    pub fn new(min_interval: Duration, min_delta_kg: f64) -> Self {
        Self {
            min_interval,
            min_delta_kg,
            last: None,
        }
    }

    /// 判断是否需要广播；返回 `true` 时同时记录本次读数
    pub fn should_emit(&mut self, kg: f64, now: Instant) -> bool {
        let emit = match self.last {
            None => true,
            Some((last_kg, at)) => {
                (kg - last_kg).abs() + DELTA_EPSILON >= self.min_delta_kg
                    || now.duration_since(at) >= self.min_interval
            },
        };
        if emit {
            self.last = Some((kg, now));
        }
        emit
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
