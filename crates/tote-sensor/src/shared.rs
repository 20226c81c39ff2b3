//! 多调用方共享同一传感器实例
//!
//! 传输句柄只能被一个逻辑调用方使用。需要在第二个线程访问传感器时
//! （例如 CLI 的 `weigh` 命令和控制循环同时存在），通过 `SharedSensor`
//! 克隆句柄，所有事务在同一把互斥锁下串行执行。

use crate::client::WeightSensorClient;
use crate::error::SensorError;
use crate::sample::WeightSample;
use parking_lot::Mutex;
use std::sync::Arc;

/// 可克隆、互斥访问的传感器句柄
#[derive(Clone)]
pub struct SharedSensor {
    inner: Arc<Mutex<Box<dyn WeightSensorClient>>>,
    variant: &'static str,
}

impl SharedSensor {
    pub fn new(client: Box<dyn WeightSensorClient>) -> Self {
        let variant = client.variant();
        Self {
            inner: Arc::new(Mutex::new(client)),
            variant,
        }
    }

    /// 在锁内执行任意操作
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn WeightSensorClient) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut **guard)
    }
}

impl WeightSensorClient for SharedSensor {
    fn read_gross_weight_kg(&mut self) -> WeightSample {
        self.inner.lock().read_gross_weight_kg()
    }

    fn read_net_weight_kg(&mut self) -> WeightSample {
        self.inner.lock().read_net_weight_kg()
    }

    fn set_tare(&mut self) -> bool {
        self.inner.lock().set_tare()
    }

    fn is_reachable(&self) -> bool {
        self.inner.lock().is_reachable()
    }

    fn variant(&self) -> &'static str {
        self.variant
    }

    fn read_tare_kg(&mut self) -> Result<f64, SensorError> {
        self.inner.lock().read_tare_kg()
    }

    fn set_zero(&mut self) -> Result<(), SensorError> {
        self.inner.lock().set_zero()
    }

    fn clear_tare(&mut self) -> Result<(), SensorError> {
        self.inner.lock().clear_tare()
    }

    fn is_weight_stable(&mut self) -> Result<bool, SensorError> {
        self.inner.lock().is_weight_stable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedScale;
    use std::thread;

    #[test]
    fn test_shared_across_threads() {
        let scale = SimulatedScale::new(10.0);
        let load = scale.handle();
        let shared = SharedSensor::new(Box::new(scale));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let mut sensor = shared.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        assert!(sensor.read_gross_weight_kg().is_ok());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(load.reads(), 40);
        assert_eq!(shared.variant(), "simulated");
    }

    #[test]
    fn test_with_closure() {
        let shared = SharedSensor::new(Box::new(SimulatedScale::new(3.0)));
        let kg = shared.with(|s| s.read_gross_weight_kg().kg());
        assert_eq!(kg, Some(3.0));
    }
}
