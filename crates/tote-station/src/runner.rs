//! 控制循环
//!
//! 编排器只在一个线程上运行：每个周期先处理命令通道中的所有命令，
//! 再执行一次 `tick()`，发布状态快照，然后用 `spin_sleep` 休眠到下个周期。
//!
//! 其他线程（控制台、遥测、按钮输入）通过 [`StationHandle`] 投递命令。

use crate::error::StationError;
use crate::orchestrator::ToteFillOrchestrator;
use crate::status::{StationStatus, StatusBoard};
use crate::valves::Valve;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use spin_sleep::SpinSleeper;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// 等待 `submit_id` 结果的超时
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// 投递给控制线程的命令
#[derive(Debug)]
pub enum StationCommand {
    Start,
    Stop,
    Manual(Valve),
    SubmitId {
        id: String,
        reply: Option<Sender<Result<(), StationError>>>,
    },
    SetLotNumber(String),
    SetRawKg(f64),
    Reset,
    Fault(String),
    Shutdown,
}

/// 控制循环配置
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// 控制周期
    pub tick_interval: Duration,
    /// 最大周期数（None 表示运行到 Shutdown）
    pub max_iterations: Option<usize>,
    /// 命令通道容量
    pub command_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(20),
            max_iterations: None,
            command_capacity: 64,
        }
    }
}

/// 控制线程
pub struct StationRunner {
    orchestrator: ToteFillOrchestrator,
    commands: Receiver<StationCommand>,
    status: StatusBoard,
    config: RunnerConfig,
}

/// 控制线程句柄（可克隆，跨线程使用）
#[derive(Debug, Clone)]
pub struct StationHandle {
    tx: Sender<StationCommand>,
    status: StatusBoard,
}

impl StationRunner {
    pub fn new(orchestrator: ToteFillOrchestrator, config: RunnerConfig) -> (Self, StationHandle) {
        let (tx, rx) = bounded(config.command_capacity.max(1));
        let status = StatusBoard::new();
        status.publish(orchestrator.status());
        let handle = StationHandle {
            tx,
            status: status.clone(),
        };
        let runner = Self {
            orchestrator,
            commands: rx,
            status,
            config,
        };
        (runner, handle)
    }

    /// 运行控制循环（阻塞）
    ///
    /// 收到 `Shutdown`、所有句柄被丢弃或达到 `max_iterations` 时返回编排器。
    /// 退出前关闭所有阀门。
    pub fn run(mut self) -> Result<ToteFillOrchestrator, StationError> {
        if self.config.tick_interval.is_zero() {
            return Err(StationError::Config(
                "tick_interval must be > 0".to_string(),
            ));
        }
        let sleeper = SpinSleeper::default();
        let mut iteration = 0;
        info!(
            "Station loop started ({:?} per tick)",
            self.config.tick_interval
        );

        loop {
            if let Some(max_iter) = self.config.max_iterations
                && iteration >= max_iter
            {
                break;
            }

            if !self.drain_commands() {
                break;
            }

            self.orchestrator.tick();
            self.status.publish(self.orchestrator.status());
            iteration += 1;

            sleeper.sleep(self.config.tick_interval);
        }

        self.orchestrator.shutdown();
        self.status.publish(self.orchestrator.status());
        info!("Station loop stopped after {} ticks", iteration);
        Ok(self.orchestrator)
    }

    /// 处理所有待处理命令；返回 `false` 表示应退出
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(StationCommand::Shutdown) => {
                    info!("Shutdown requested");
                    return false;
                },
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => {
                    info!("All station handles dropped");
                    return false;
                },
            }
        }
    }

    fn apply(&mut self, command: StationCommand) {
        debug!("Command: {:?}", command);
        let station = &mut self.orchestrator;
        // 拒绝的命令已由编排器记录日志并发出 error 事件
        let _ = match command {
            StationCommand::Start => station.request_start(),
            StationCommand::Stop => {
                station.request_stop();
                Ok(())
            },
            StationCommand::Manual(valve) => station.request_manual(valve),
            StationCommand::SubmitId { id, reply } => {
                let result = station.submit_id(&id);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                        Ok(())
                    },
                    None => result,
                }
            },
            StationCommand::SetLotNumber(lot) => station.set_lot_number(&lot),
            StationCommand::SetRawKg(kg) => station.set_upstream_raw_kg(kg),
            StationCommand::Reset => station.reset(),
            StationCommand::Fault(reason) => {
                station.fault(reason);
                Ok(())
            },
            StationCommand::Shutdown => Ok(()),
        };
    }
}

impl StationHandle {
    pub fn send(&self, command: StationCommand) -> Result<(), StationError> {
        self.tx
            .send(command)
            .map_err(|_| StationError::ChannelClosed)
    }

    pub fn start(&self) -> Result<(), StationError> {
        self.send(StationCommand::Start)
    }

    pub fn stop(&self) -> Result<(), StationError> {
        self.send(StationCommand::Stop)
    }

    pub fn manual(&self, valve: Valve) -> Result<(), StationError> {
        self.send(StationCommand::Manual(valve))
    }

    /// 提交托盘 ID 并等待校验结果
    pub fn submit_id(&self, id: impl Into<String>) -> Result<(), StationError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(StationCommand::SubmitId {
            id: id.into(),
            reply: Some(reply_tx),
        })?;
        match reply_rx.recv_timeout(REPLY_TIMEOUT) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(StationError::ReplyTimeout),
            Err(RecvTimeoutError::Disconnected) => Err(StationError::ChannelClosed),
        }
    }

    /// 提交托盘 ID，不等待结果（扫码器等来源）
    pub fn submit_id_detached(&self, id: impl Into<String>) -> Result<(), StationError> {
        self.send(StationCommand::SubmitId {
            id: id.into(),
            reply: None,
        })
    }

    pub fn set_lot_number(&self, lot: impl Into<String>) -> Result<(), StationError> {
        self.send(StationCommand::SetLotNumber(lot.into()))
    }

    pub fn set_raw_kg(&self, kg: f64) -> Result<(), StationError> {
        self.send(StationCommand::SetRawKg(kg))
    }

    pub fn reset(&self) -> Result<(), StationError> {
        self.send(StationCommand::Reset)
    }

    pub fn fault(&self, reason: impl Into<String>) -> Result<(), StationError> {
        self.send(StationCommand::Fault(reason.into()))
    }

    pub fn shutdown(&self) -> Result<(), StationError> {
        self.send(StationCommand::Shutdown)
    }

    /// 原始命令通道（遥测线程转发远程命令用）
    pub fn command_sender(&self) -> Sender<StationCommand> {
        self.tx.clone()
    }

    /// 最新状态快照（无锁）
    pub fn status(&self) -> Arc<StationStatus> {
        self.status.snapshot()
    }

    pub fn status_board(&self) -> StatusBoard {
        self.status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FillConfig, TimingConfig};
    use crate::io::MemoryOutputs;
    use crate::types::ToteFillState;
    use std::thread;
    use std::time::Instant;
    use tote_sensor::{SimulatedScale, SimulatedScaleHandle};

    fn station(initial_kg: f64) -> (ToteFillOrchestrator, SimulatedScaleHandle) {
        let scale = SimulatedScale::new(initial_kg);
        let handle = scale.handle();
        let orchestrator =
            ToteFillOrchestrator::builder(Box::new(scale), Box::new(MemoryOutputs::new()))
                .fill(FillConfig::default())
                .timing(TimingConfig::default())
                .build()
                .unwrap();
        (orchestrator, handle)
    }

    fn fast() -> RunnerConfig {
        RunnerConfig {
            tick_interval: Duration::from_millis(1),
            ..RunnerConfig::default()
        }
    }

    fn wait_for(handle: &StationHandle, state: ToteFillState) {
        let deadline = Instant::now() + Duration::from_secs(3);
        while handle.status().state != state {
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {}, status {:?}",
                state,
                handle.status()
            );
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_max_iterations() {
        let (orchestrator, _scale) = station(0.0);
        let (runner, handle) = StationRunner::new(
            orchestrator,
            RunnerConfig {
                max_iterations: Some(5),
                ..fast()
            },
        );
        runner.run().unwrap();
        assert_eq!(handle.status().ticks, 5);
    }

    #[test]
    fn test_zero_tick_rejected() {
        let (orchestrator, _scale) = station(0.0);
        let (runner, _handle) = StationRunner::new(
            orchestrator,
            RunnerConfig {
                tick_interval: Duration::ZERO,
                ..RunnerConfig::default()
            },
        );
        assert!(matches!(runner.run(), Err(StationError::Config(_))));
    }

    #[test]
    fn test_full_cycle_through_handle() {
        let (orchestrator, scale) = station(10.0);
        let (runner, handle) = StationRunner::new(orchestrator, fast());
        let worker = thread::spawn(move || runner.run());

        handle.set_lot_number("LOT-1").unwrap();
        handle.start().unwrap();
        wait_for(&handle, ToteFillState::DispensingIce);

        scale.set_gross_kg(12.1);
        wait_for(&handle, ToteFillState::DispensingWater);
        scale.set_gross_kg(14.2);
        wait_for(&handle, ToteFillState::WaitingId);

        assert!(matches!(
            handle.submit_id(""),
            Err(StationError::IdentifierEmpty)
        ));
        handle.submit_id("T-100").unwrap();
        wait_for(&handle, ToteFillState::Idle);

        handle.shutdown().unwrap();
        let orchestrator = worker.join().unwrap().unwrap();
        assert!(orchestrator.batch().is_empty());
    }

    #[test]
    fn test_dropped_handles_stop_loop() {
        let (orchestrator, _scale) = station(0.0);
        let (runner, handle) = StationRunner::new(orchestrator, fast());
        let worker = thread::spawn(move || runner.run());
        drop(handle);
        assert!(worker.join().unwrap().is_ok());
    }
}
