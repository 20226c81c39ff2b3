//! 数字 IO 映射与脉冲输出
//!
//! | 线路 | 通道 | 说明 |
//! |------|------|------|
//! | START 按钮 | DI_0 | 开始填充 |
//! | STOP 按钮 | DI_1 | 取消 |
//! | 手动加水 | DI_2 | 5 s 手动开阀 |
//! | 手动加冰 | DI_3 | 5 s 手动开阀 |
//! | 冰阀开 | DO_0 | 脉冲 |
//! | 冰阀关 | DO_1 | 脉冲 |
//! | 水阀 | DO_2 | 电平保持 |

use crate::error::StationError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// 数字输出线
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputLine {
    IceValveOpen,
    IceValveClose,
    WaterValve,
}

impl OutputLine {
    pub const ALL: [OutputLine; 3] = [
        OutputLine::IceValveOpen,
        OutputLine::IceValveClose,
        OutputLine::WaterValve,
    ];

    /// DO 通道号
    pub fn channel(&self) -> u8 {
        match self {
            OutputLine::IceValveOpen => 0,
            OutputLine::IceValveClose => 1,
            OutputLine::WaterValve => 2,
        }
    }

    fn index(&self) -> usize {
        self.channel() as usize
    }
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputLine::IceValveOpen => "ICE_VALVE_OPEN",
            OutputLine::IceValveClose => "ICE_VALVE_CLOSE",
            OutputLine::WaterValve => "WATER_VALVE",
        };
        write!(f, "{}(DO_{})", name, self.channel())
    }
}

/// 数字输入线（操作员按钮）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputLine {
    Start,
    Stop,
    ManualWater,
    ManualIce,
}

impl InputLine {
    /// DI 通道号
    pub fn channel(&self) -> u8 {
        match self {
            InputLine::Start => 0,
            InputLine::Stop => 1,
            InputLine::ManualWater => 2,
            InputLine::ManualIce => 3,
        }
    }

    /// 按钮编号（控制台数字输入）：1 开始 / 2 停止 / 3 手动加冰 / 4 手动加水
    pub fn from_button_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(InputLine::Start),
            2 => Some(InputLine::Stop),
            3 => Some(InputLine::ManualIce),
            4 => Some(InputLine::ManualWater),
            _ => None,
        }
    }
}

/// 数字输出后端
pub trait DigitalOutputs: Send {
    /// 设置输出电平（`true` = 有效）
    fn write(&mut self, line: OutputLine, level: bool) -> Result<(), StationError>;
}

impl<T: DigitalOutputs + ?Sized> DigitalOutputs for Box<T> {
    fn write(&mut self, line: OutputLine, level: bool) -> Result<(), StationError> {
        (**self).write(line, level)
    }
}

/// 写入历史保留的条数（长时间运行时只保留最近的写入）
pub const OUTPUT_HISTORY_LEN: usize = 256;

#[derive(Debug, Default)]
struct MemoryState {
    levels: [bool; 3],
    history: VecDeque<(OutputLine, bool)>,
    failing: bool,
}

/// 内存输出（无硬件运行与测试）
///
/// 克隆共享同一状态，可在另一线程观察电平与写入历史。
#[derive(Debug, Clone, Default)]
pub struct MemoryOutputs {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self, line: OutputLine) -> bool {
        self.state.lock().levels[line.index()]
    }

    /// 最近的写入历史（按时间顺序，最多 [`OUTPUT_HISTORY_LEN`] 条）
    pub fn history(&self) -> Vec<(OutputLine, bool)> {
        self.state.lock().history.iter().copied().collect()
    }

    pub fn clear_history(&self) {
        self.state.lock().history.clear();
    }

    /// 让后续写入全部失败（模拟驱动故障）
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }
}

impl DigitalOutputs for MemoryOutputs {
    fn write(&mut self, line: OutputLine, level: bool) -> Result<(), StationError> {
        let mut state = self.state.lock();
        if state.failing {
            return Err(StationError::Output(format!("{} driver not responding", line)));
        }
        debug!("{} -> {}", line, if level { "HIGH" } else { "LOW" });
        state.levels[line.index()] = level;
        if state.history.len() == OUTPUT_HISTORY_LEN {
            state.history.pop_front();
        }
        state.history.push_back((line, level));
        Ok(())
    }
}

/// 脉冲输出调度
///
/// `pulse()` 立即置高并记录截止时间，`service()` 在截止后拉低。
/// 不依赖任何定时器线程，由控制循环每个 tick 驱动。
#[derive(Debug, Default)]
pub struct PulseScheduler {
    pending: Vec<(OutputLine, Instant)>,
}

impl PulseScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 输出一个脉冲；同一线路上已有脉冲时延长截止时间
    pub fn pulse(
        &mut self,
        outputs: &mut dyn DigitalOutputs,
        line: OutputLine,
        now: Instant,
        width: Duration,
    ) -> Result<(), StationError> {
        outputs.write(line, true)?;
        let deadline = now + width;
        match self.pending.iter_mut().find(|(l, _)| *l == line) {
            Some(entry) => entry.1 = deadline,
            None => self.pending.push((line, deadline)),
        }
        trace!("Pulse on {} until +{:?}", line, width);
        Ok(())
    }

    /// 取消线路上的脉冲并立即拉低
    pub fn cancel(
        &mut self,
        outputs: &mut dyn DigitalOutputs,
        line: OutputLine,
    ) -> Result<(), StationError> {
        self.pending.retain(|(l, _)| *l != line);
        outputs.write(line, false)
    }

    /// 拉低所有到期脉冲
    ///
    /// 写入失败的线路保留在队列中，下次 tick 重试。
    pub fn service(
        &mut self,
        outputs: &mut dyn DigitalOutputs,
        now: Instant,
    ) -> Result<(), StationError> {
        let mut first_error = None;
        let mut still_pending = Vec::with_capacity(self.pending.len());
        for (line, deadline) in self.pending.drain(..) {
            if deadline > now {
                still_pending.push((line, deadline));
                continue;
            }
            if let Err(e) = outputs.write(line, false) {
                still_pending.push((line, deadline));
                first_error.get_or_insert(e);
            }
        }
        self.pending = still_pending;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 立即结束所有脉冲（控制循环退出前调用）
    pub fn release_all(&mut self, outputs: &mut dyn DigitalOutputs) -> Result<(), StationError> {
        let mut result = Ok(());
        for (line, _) in self.pending.drain(..) {
            result = result.and(outputs.write(line, false));
        }
        result
    }

    pub fn is_pending(&self, line: OutputLine) -> bool {
        self.pending.iter().any(|(l, _)| *l == line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDTH: Duration = Duration::from_millis(200);

    #[test]
    fn test_channel_mapping() {
        assert_eq!(OutputLine::IceValveOpen.channel(), 0);
        assert_eq!(OutputLine::IceValveClose.channel(), 1);
        assert_eq!(OutputLine::WaterValve.channel(), 2);
        assert_eq!(InputLine::ManualWater.channel(), 2);
        assert_eq!(InputLine::ManualIce.channel(), 3);
        assert_eq!(InputLine::from_button_code(3), Some(InputLine::ManualIce));
        assert_eq!(InputLine::from_button_code(0), None);
    }

    #[test]
    fn test_history_keeps_recent_writes() {
        let mut outputs = MemoryOutputs::new();
        for i in 0..OUTPUT_HISTORY_LEN + 10 {
            outputs.write(OutputLine::WaterValve, i % 2 == 0).unwrap();
        }
        outputs.write(OutputLine::IceValveOpen, true).unwrap();

        let history = outputs.history();
        assert_eq!(history.len(), OUTPUT_HISTORY_LEN);
        assert_eq!(history.last(), Some(&(OutputLine::IceValveOpen, true)));
        assert!(outputs.level(OutputLine::IceValveOpen));
    }

    #[test]
    fn test_pulse_deasserts_after_width() {
        let mut outputs = MemoryOutputs::new();
        let mut pulses = PulseScheduler::new();
        let t0 = Instant::now();

        pulses
            .pulse(&mut outputs, OutputLine::IceValveOpen, t0, WIDTH)
            .unwrap();
        assert!(outputs.level(OutputLine::IceValveOpen));

        pulses
            .service(&mut outputs, t0 + Duration::from_millis(199))
            .unwrap();
        assert!(outputs.level(OutputLine::IceValveOpen));

        pulses.service(&mut outputs, t0 + WIDTH).unwrap();
        assert!(!outputs.level(OutputLine::IceValveOpen));
        assert!(!pulses.is_pending(OutputLine::IceValveOpen));
    }

    #[test]
    fn test_cancel_forces_low() {
        let mut outputs = MemoryOutputs::new();
        let mut pulses = PulseScheduler::new();
        let t0 = Instant::now();
        pulses
            .pulse(&mut outputs, OutputLine::IceValveClose, t0, WIDTH)
            .unwrap();
        pulses
            .cancel(&mut outputs, OutputLine::IceValveClose)
            .unwrap();
        assert!(!outputs.level(OutputLine::IceValveClose));
        assert!(!pulses.is_pending(OutputLine::IceValveClose));
    }

    #[test]
    fn test_failed_deassert_retried() {
        let mut outputs = MemoryOutputs::new();
        let mut pulses = PulseScheduler::new();
        let t0 = Instant::now();
        pulses
            .pulse(&mut outputs, OutputLine::IceValveOpen, t0, WIDTH)
            .unwrap();

        outputs.set_failing(true);
        assert!(pulses.service(&mut outputs, t0 + WIDTH).is_err());
        assert!(pulses.is_pending(OutputLine::IceValveOpen));

        outputs.set_failing(false);
        pulses.service(&mut outputs, t0 + WIDTH).unwrap();
        assert!(!outputs.level(OutputLine::IceValveOpen));
    }
}
