//! # Tote Station
//!
//! 托盘加冰/加水工位的控制核心：
//!
//! ```text
//! IDLE ──start──> DISPENSING_ICE ──冰到量──> DISPENSING_WATER ──水到量──> WAITING_ID
//!   ^                    │                         │                         │
//!   │                   stop                      stop                   submit_id
//!   │                    v                         v                         v
//!   └──────────────── CANCELED <──────────────────────────────────── COMPLETED
//! ```
//!
//! 任何阶段的输出故障都会进入 `ERROR`，需要 `reset()` 才能回到 `IDLE`。
//!
//! - [`ToteFillOrchestrator`]：状态机本体，单线程 `tick()` 驱动
//! - [`StationRunner`] / [`StationHandle`]：控制循环与跨线程命令通道
//! - [`ValveBank`]：冰阀（双线圈脉冲）与水阀（电平）
//! - [`TelemetryWorker`]：JSON 行遥测与远程命令
//!
//! ## 示例
//!
//! ```no_run
//! use tote_sensor::SimulatedScale;
//! use tote_station::{MemoryOutputs, RunnerConfig, StationRunner, ToteFillOrchestrator};
//!
//! let orchestrator = ToteFillOrchestrator::builder(
//!     Box::new(SimulatedScale::new(10.0)),
//!     Box::new(MemoryOutputs::new()),
//! )
//! .build()
//! .unwrap();
//!
//! let (runner, handle) = StationRunner::new(orchestrator, RunnerConfig::default());
//! let worker = std::thread::spawn(move || runner.run());
//! handle.start().unwrap();
//! handle.shutdown().unwrap();
//! worker.join().unwrap().unwrap();
//! ```

pub mod backend;
pub mod clock;
pub mod config;
mod error;
pub mod events;
pub mod io;
pub mod orchestrator;
pub mod runner;
pub mod stage;
pub mod status;
pub mod telemetry;
mod throttle;
pub mod types;
pub mod valves;

pub use backend::{
    AcceptAll, BackendError, BatchSink, JsonLinesBatchSink, LogBatchSink, ToteValidator,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{FillConfig, SensorConfig, StationConfig, TelemetryConfig, TimingConfig};
pub use error::{StageError, StationError};
pub use events::{
    ChannelSink, EventSink, FanOutSink, LogSink, NullSink, RecordingSink, RemoteCommand,
    RemoteMessage, StationEvent,
};
pub use io::{DigitalOutputs, InputLine, MemoryOutputs, OutputLine};
pub use orchestrator::{OrchestratorBuilder, ToteFillOrchestrator};
pub use runner::{RunnerConfig, StationCommand, StationHandle, StationRunner};
pub use stage::StageSequencer;
pub use status::{StationStatus, StatusBoard};
pub use telemetry::{TelemetryHandle, TelemetrySettings, TelemetryWorker};
pub use throttle::WeightThrottle;
pub use types::{ToteBatch, ToteFillState, ToteId};
pub use valves::{Valve, ValveBank};
