//! 模拟称重仪表
//!
//! 用于 `--simulate` 运行模式和测试：重量保存在共享状态中，
//! 外部通过 [`SimulatedScaleHandle`] 加减重量、切换可达性或注入一次性失败。
//! 读数按仪表分辨率（0.01 kg）取整。

use crate::client::WeightSensorClient;
use crate::error::SensorError;
use crate::sample::{SampleFailure, WeightSample};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug)]
struct SimState {
    gross_kg: f64,
    tare_kg: f64,
    reachable: bool,
    /// 一次性覆盖下一次读数（如注入超时）
    injected: VecDeque<WeightSample>,
    reads: u64,
    tare_commands: u64,
}

fn round_centi(kg: f64) -> f64 {
    (kg * 100.0).round() / 100.0
}

/// 模拟称重仪表
#[derive(Debug)]
pub struct SimulatedScale {
    state: Arc<Mutex<SimState>>,
}

/// 模拟仪表的外部控制句柄
#[derive(Debug, Clone)]
pub struct SimulatedScaleHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedScale {
    pub fn new(initial_gross_kg: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                gross_kg: initial_gross_kg,
                tare_kg: 0.0,
                reachable: true,
                injected: VecDeque::new(),
                reads: 0,
                tare_commands: 0,
            })),
        }
    }

    pub fn handle(&self) -> SimulatedScaleHandle {
        SimulatedScaleHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl SimulatedScaleHandle {
    pub fn set_gross_kg(&self, kg: f64) {
        self.state.lock().gross_kg = kg;
    }

    /// 增加（或减少）负载
    pub fn add_kg(&self, delta: f64) {
        self.state.lock().gross_kg += delta;
    }

    pub fn gross_kg(&self) -> f64 {
        self.state.lock().gross_kg
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    /// 下一次读取返回指定失败
    pub fn inject_failure(&self, failure: SampleFailure) {
        self.state
            .lock()
            .injected
            .push_back(WeightSample::Failed(failure));
    }

    /// 排队一个脚本读数，按顺序在后续读取中返回（优先于当前重量）
    pub fn push_sample(&self, sample: WeightSample) {
        self.state.lock().injected.push_back(sample);
    }

    /// 排队一组脚本读数
    pub fn push_readings(&self, readings: &[f64]) {
        let mut state = self.state.lock();
        for &kg in readings {
            state.injected.push_back(WeightSample::from_kg(kg));
        }
    }

    pub fn reads(&self) -> u64 {
        self.state.lock().reads
    }

    pub fn tare_commands(&self) -> u64 {
        self.state.lock().tare_commands
    }
}

impl WeightSensorClient for SimulatedScale {
    fn read_gross_weight_kg(&mut self) -> WeightSample {
        let mut state = self.state.lock();
        state.reads += 1;
        if !state.reachable {
            return WeightSample::Failed(SampleFailure::NotConnected);
        }
        if let Some(sample) = state.injected.pop_front() {
            return sample;
        }
        WeightSample::from_kg(round_centi(state.gross_kg))
    }

    fn read_net_weight_kg(&mut self) -> WeightSample {
        let gross = self.read_gross_weight_kg();
        match gross {
            WeightSample::Kg(g) => WeightSample::from_kg(round_centi(g - self.state.lock().tare_kg)),
            failed => failed,
        }
    }

    fn set_tare(&mut self) -> bool {
        let mut state = self.state.lock();
        if !state.reachable {
            return false;
        }
        state.tare_kg = state.gross_kg;
        state.tare_commands += 1;
        true
    }

    fn is_reachable(&self) -> bool {
        self.state.lock().reachable
    }

    fn variant(&self) -> &'static str {
        "simulated"
    }

    fn read_tare_kg(&mut self) -> Result<f64, SensorError> {
        let state = self.state.lock();
        if !state.reachable {
            return Err(SensorError::NotConnected);
        }
        Ok(round_centi(state.tare_kg))
    }

    fn clear_tare(&mut self) -> Result<(), SensorError> {
        let mut state = self.state.lock();
        if !state.reachable {
            return Err(SensorError::NotConnected);
        }
        state.tare_kg = 0.0;
        Ok(())
    }

    fn is_weight_stable(&mut self) -> Result<bool, SensorError> {
        if self.state.lock().reachable {
            Ok(true)
        } else {
            Err(SensorError::NotConnected)
        }
    }
}
