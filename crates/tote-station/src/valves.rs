//! 阀门组
//!
//! 冰阀是脉冲驱动的双线圈阀（开/关各一个脉冲），水阀是电平保持阀。
//! 手动超控在到期后自动关闭，停止事件会取消尚未到期的自动关闭。

use crate::error::StationError;
use crate::io::{DigitalOutputs, OutputLine, PulseScheduler};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Valve {
    Ice,
    Water,
}

impl Valve {
    fn index(&self) -> usize {
        match self {
            Valve::Ice => 0,
            Valve::Water => 1,
        }
    }
}

impl fmt::Display for Valve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Valve::Ice => f.write_str("ice"),
            Valve::Water => f.write_str("water"),
        }
    }
}

pub struct ValveBank {
    outputs: Box<dyn DigitalOutputs>,
    pulses: PulseScheduler,
    pulse_width: Duration,
    manual_duration: Duration,
    open: [bool; 2],
    manual_until: [Option<Instant>; 2],
}

impl ValveBank {
    pub fn new(
        outputs: Box<dyn DigitalOutputs>,
        pulse_width: Duration,
        manual_duration: Duration,
    ) -> Self {
        Self {
            outputs,
            pulses: PulseScheduler::new(),
            pulse_width,
            manual_duration,
            open: [false; 2],
            manual_until: [None; 2],
        }
    }

    /// 逻辑开关状态（冰阀按最后一次开/关脉冲判断）
    pub fn is_open(&self, valve: Valve) -> bool {
        self.open[valve.index()]
    }

    pub fn manual_deadline(&self, valve: Valve) -> Option<Instant> {
        self.manual_until[valve.index()]
    }

    pub fn open(&mut self, valve: Valve, now: Instant) -> Result<(), StationError> {
        match valve {
            Valve::Ice => {
                self.pulses
                    .cancel(&mut *self.outputs, OutputLine::IceValveClose)?;
                self.pulses.pulse(
                    &mut *self.outputs,
                    OutputLine::IceValveOpen,
                    now,
                    self.pulse_width,
                )?;
            },
            Valve::Water => self.outputs.write(OutputLine::WaterValve, true)?,
        }
        self.open[valve.index()] = true;
        debug!("{} valve opened", valve);
        Ok(())
    }

    /// 关闭阀门；对已关闭的阀门重复调用是安全的
    pub fn close(&mut self, valve: Valve, now: Instant) -> Result<(), StationError> {
        match valve {
            Valve::Ice => {
                self.pulses
                    .cancel(&mut *self.outputs, OutputLine::IceValveOpen)?;
                self.pulses.pulse(
                    &mut *self.outputs,
                    OutputLine::IceValveClose,
                    now,
                    self.pulse_width,
                )?;
            },
            Valve::Water => self.outputs.write(OutputLine::WaterValve, false)?,
        }
        self.open[valve.index()] = false;
        debug!("{} valve closed", valve);
        Ok(())
    }

    /// 关闭全部阀门并取消手动超控；两个阀门都会尝试，返回第一个错误
    pub fn close_all(&mut self, now: Instant) -> Result<(), StationError> {
        self.cancel_manual();
        let ice = self.close(Valve::Ice, now);
        let water = self.close(Valve::Water, now);
        ice.and(water)
    }

    /// 手动超控：打开阀门，`manual_duration` 后自动关闭
    pub fn manual_open(&mut self, valve: Valve, now: Instant) -> Result<(), StationError> {
        self.open(valve, now)?;
        self.manual_until[valve.index()] = Some(now + self.manual_duration);
        info!(
            "Manual {} override for {:?}",
            valve, self.manual_duration
        );
        Ok(())
    }

    pub fn pulse_width(&self) -> Duration {
        self.pulse_width
    }

    /// 立即结束所有进行中的脉冲
    pub fn release_pulses(&mut self) -> Result<(), StationError> {
        self.pulses.release_all(&mut *self.outputs)
    }

    /// 取消尚未到期的自动关闭（不改变阀门状态）
    pub fn cancel_manual(&mut self) {
        self.manual_until = [None; 2];
    }

    pub fn manual_active(&self) -> bool {
        self.manual_until.iter().any(Option::is_some)
    }

    /// 每个 tick 调用：结束到期脉冲，关闭到期的手动超控
    pub fn service(&mut self, now: Instant) -> Result<(), StationError> {
        let pulses = self.pulses.service(&mut *self.outputs, now);
        let mut manual = Ok(());
        for valve in [Valve::Ice, Valve::Water] {
            let expired = self.manual_until[valve.index()].is_some_and(|until| now >= until);
            if expired {
                self.manual_until[valve.index()] = None;
                info!("Manual {} override expired, closing", valve);
                if let Err(e) = self.close(valve, now) {
                    manual = manual.and(Err(e));
                }
            }
        }
        pulses.and(manual)
    }
}

impl fmt::Debug for ValveBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValveBank")
            .field("ice_open", &self.open[0])
            .field("water_open", &self.open[1])
            .field("manual_until", &self.manual_until)
            .finish()
    }
}
