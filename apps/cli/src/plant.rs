//! 无硬件运行用的模拟工位
//!
//! 阀门输出驱动模拟秤：冰阀（开脉冲后保持开启，直到关脉冲）和水阀（电平）
//! 打开期间，秤上的重量按固定速率增加。

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tote_sensor::SimulatedScaleHandle;
use tote_station::{DigitalOutputs, MemoryOutputs, OutputLine, StationError};
use tracing::debug;

/// 模拟进料速率
#[derive(Debug, Clone, Copy)]
pub struct FlowRates {
    pub ice_kg_per_s: f64,
    pub water_kg_per_s: f64,
}

impl Default for FlowRates {
    fn default() -> Self {
        Self {
            ice_kg_per_s: 0.8,
            water_kg_per_s: 1.0,
        }
    }
}

#[derive(Debug, Default)]
struct Flow {
    ice: bool,
    water: bool,
}

/// 模拟工位（克隆共享状态，可同时作为编排器的输出和进料线程）
#[derive(Clone)]
pub struct SimulatedPlant {
    scale: SimulatedScaleHandle,
    lines: MemoryOutputs,
    flow: Arc<Mutex<Flow>>,
    rates: FlowRates,
}

impl SimulatedPlant {
    pub fn new(scale: SimulatedScaleHandle, rates: FlowRates) -> Self {
        Self {
            scale,
            lines: MemoryOutputs::new(),
            flow: Arc::new(Mutex::new(Flow::default())),
            rates,
        }
    }

    pub fn level(&self, line: OutputLine) -> bool {
        self.lines.level(line)
    }

    /// 按经过的时间给秤加重
    pub fn advance(&self, elapsed: Duration) {
        let flow = self.flow.lock();
        let secs = elapsed.as_secs_f64();
        let mut added = 0.0;
        if flow.ice {
            added += self.rates.ice_kg_per_s * secs;
        }
        if flow.water {
            added += self.rates.water_kg_per_s * secs;
        }
        if added > 0.0 {
            self.scale.add_kg(added);
        }
    }

    /// 启动进料线程，`stop` 置位后退出
    pub fn spawn(self, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let mut last = Instant::now();
            while !stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(50));
                let now = Instant::now();
                self.advance(now.duration_since(last));
                last = now;
            }
        })
    }
}

impl DigitalOutputs for SimulatedPlant {
    fn write(&mut self, line: OutputLine, level: bool) -> Result<(), StationError> {
        self.lines.write(line, level)?;
        let mut flow = self.flow.lock();
        match (line, level) {
            (OutputLine::IceValveOpen, true) => flow.ice = true,
            (OutputLine::IceValveClose, true) => flow.ice = false,
            (OutputLine::WaterValve, level) => flow.water = level,
            _ => {},
        }
        debug!("Plant flow: ice {}, water {}", flow.ice, flow.water);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tote_sensor::SimulatedScale;

    #[test]
    fn test_flow_follows_valve_lines() {
        let scale = SimulatedScale::new(10.0);
        let handle = scale.handle();
        let mut plant = SimulatedPlant::new(handle.clone(), FlowRates::default());

        plant.advance(Duration::from_secs(1));
        assert_eq!(handle.gross_kg(), 10.0);

        // 开脉冲结束后冰阀仍保持开启
        plant.write(OutputLine::IceValveOpen, true).unwrap();
        plant.write(OutputLine::IceValveOpen, false).unwrap();
        plant.advance(Duration::from_secs(1));
        assert!((handle.gross_kg() - 10.8).abs() < 1e-9);

        plant.write(OutputLine::IceValveClose, true).unwrap();
        plant.write(OutputLine::WaterValve, true).unwrap();
        plant.advance(Duration::from_millis(500));
        assert!((handle.gross_kg() - 11.3).abs() < 1e-9);
        assert!(plant.level(OutputLine::WaterValve));

        plant.write(OutputLine::WaterValve, false).unwrap();
        plant.advance(Duration::from_secs(5));
        assert!((handle.gross_kg() - 11.3).abs() < 1e-9);
    }
}
