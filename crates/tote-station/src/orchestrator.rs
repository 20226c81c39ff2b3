//! 托盘填充编排器
//!
//! 单线程状态机：外部事件（开始、停止、手动超控、ID 提交）只记录请求或做校验，
//! 所有状态转移都在 [`ToteFillOrchestrator::tick`] 中完成。
//!
//! ```text
//!            start && w >= min            Δ >= ice             Δ >= ice + water
//!   IDLE ───────────────────▶ DISPENSING_ICE ──────▶ DISPENSING_WATER ──────▶ WAITING_ID
//!    ▲                                                                           │ submit_id
//!    │◀──────────────────────────── COMPLETED ◀──────────────────────────────────┘
//!    │
//!    └── CANCELED ◀── stop（除 COMPLETED / ERROR 外任意状态）
//! ```
//!
//! 出料量以开始时的毛重 `initial_weight_kg` 为基准计算差值，不依赖仪表去皮是否成功。

use crate::backend::{AcceptAll, BatchSink, LogBatchSink, ToteValidator};
use crate::clock::{Clock, SystemClock};
use crate::config::{FillConfig, TimingConfig};
use crate::error::{StageError, StationError};
use crate::events::{EventSink, NullSink, StationEvent};
use crate::io::DigitalOutputs;
use crate::stage::StageSequencer;
use crate::status::StationStatus;
use crate::throttle::WeightThrottle;
use crate::types::{ToteBatch, ToteFillState, ToteId, round_centi};
use crate::valves::{Valve, ValveBank};
use std::sync::Arc;
use std::time::Instant;
use tote_sensor::{SampleFailure, WeightSample, WeightSensorClient};
use tracing::{debug, error, info, warn};

/// 阶段动作共享的上下文
pub struct FillContext {
    sensor: Box<dyn WeightSensorClient>,
    valves: ValveBank,
    events: Box<dyn EventSink>,
    batch_sink: Box<dyn BatchSink>,
    clock: Arc<dyn Clock>,
    batch: ToteBatch,
    throttle: WeightThrottle,
    last_weight_kg: Option<f64>,
    /// 阈值穿越时的读数；仅在正常完成阶段时设置，退出动作据此结算出料量
    crossing_kg: Option<f64>,
    sensor_fault: Option<SampleFailure>,
    paused: bool,
}

impl FillContext {
    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn emit(&self, event: StationEvent) {
        self.events.emit(event);
    }

    /// 读取毛重：成功时更新最近读数并按节流广播，失败时按故障边沿通知
    fn read_gross(&mut self) -> WeightSample {
        let sample = self.sensor.read_gross_weight_kg();
        match sample {
            WeightSample::Kg(kg) => {
                if let Some(previous) = self.sensor_fault.take() {
                    info!("Scale recovered after {}", previous);
                }
                debug!("gross {:.2} kg", kg);
                self.last_weight_kg = Some(kg);
                let now = self.now();
                if self.throttle.should_emit(kg, now) {
                    self.emit(StationEvent::WeightUpdate { weight: kg });
                }
            },
            WeightSample::Failed(failure) => self.note_fault(failure),
        }
        sample
    }

    /// 同一故障持续期间只通知一次
    fn note_fault(&mut self, failure: SampleFailure) {
        if self.sensor_fault == Some(failure) {
            debug!("Scale still failing: {}", failure);
            return;
        }
        warn!("Scale read failed: {}", failure);
        self.sensor_fault = Some(failure);
        self.emit(StationEvent::error(format!("Scale read failed: {}", failure)));
    }

    /// 去皮失败不影响流程（出料量按差值计算）
    fn tare_best_effort(&mut self) {
        if !self.sensor.set_tare() {
            debug!("Tare not acknowledged by {} scale", self.sensor.variant());
        }
    }

    /// 出料阶段的读数
    ///
    /// 传感器不可达时关闭当前阀门并暂停，恢复后重新打开。
    /// 返回 `None` 表示本 tick 没有可用读数。
    fn sample_for_dispensing(&mut self, valve: Valve) -> Result<Option<f64>, StationError> {
        let sample = self.read_gross();
        let reachable = self.sensor.is_reachable()
            && sample.failure() != Some(SampleFailure::NotConnected);
        let now = self.now();

        if !reachable {
            if !self.paused {
                warn!("Scale unreachable, pausing {} dispensing", valve);
                self.note_fault(SampleFailure::NotConnected);
                self.paused = true;
                self.valves.close(valve, now)?;
            }
            return Ok(None);
        }
        if self.paused {
            info!("Scale reachable again, resuming {} dispensing", valve);
            self.paused = false;
            self.valves.open(valve, now)?;
        }
        Ok(sample.kg())
    }

    /// 阶段结束时的稳定读数，读取失败时退回阈值穿越时的读数
    fn settled_weight(&mut self, crossing_kg: f64) -> f64 {
        match self.read_gross() {
            WeightSample::Kg(kg) => kg,
            WeightSample::Failed(failure) => {
                warn!(
                    "Settled read failed ({}), using crossing reading {:.2} kg",
                    failure, crossing_kg
                );
                crossing_kg
            },
        }
    }
}

fn ice_stage() -> StageSequencer<FillContext> {
    StageSequencer::new(
        "ice",
        |ctx: &mut FillContext| {
            let reference = ctx
                .last_weight_kg
                .ok_or(StageError::MissingReference("ice"))?;
            ctx.batch.initial_weight_kg = reference;
            ctx.tare_best_effort();
            let now = ctx.now();
            if ctx.valves.manual_active() {
                ctx.valves.cancel_manual();
                ctx.valves.close(Valve::Water, now)?;
            }
            ctx.valves.open(Valve::Ice, now)?;
            info!(
                "Dispensing ice: reference {:.2} kg, target {:.2} kg",
                reference, ctx.batch.target_ice_kg
            );
            Ok(())
        },
        |ctx: &mut FillContext| {
            let now = ctx.now();
            ctx.valves.close(Valve::Ice, now)?;
            if let Some(crossing) = ctx.crossing_kg.take() {
                let settled = ctx.settled_weight(crossing);
                let ice = ctx
                    .batch
                    .record_ice(settled - ctx.batch.initial_weight_kg)?;
                info!("Ice dispensed: {:.2} kg", ice);
                ctx.emit(StationEvent::IceDispensed { ice_kg: ice });
            }
            Ok(())
        },
    )
}

fn water_stage() -> StageSequencer<FillContext> {
    StageSequencer::new(
        "water",
        |ctx: &mut FillContext| {
            ctx.tare_best_effort();
            let now = ctx.now();
            ctx.valves.open(Valve::Water, now)?;
            info!(
                "Dispensing water: target {:.2} kg",
                ctx.batch.target_water_kg
            );
            Ok(())
        },
        |ctx: &mut FillContext| {
            let now = ctx.now();
            ctx.valves.close(Valve::Water, now)?;
            if let Some(crossing) = ctx.crossing_kg.take() {
                let settled = ctx.settled_weight(crossing);
                let ice = ctx.batch.ice_out_kg().unwrap_or(0.0);
                let water = ctx
                    .batch
                    .record_water(settled - ctx.batch.initial_weight_kg - ice)?;
                info!("Water dispensed: {:.2} kg", water);
                ctx.emit(StationEvent::WaterDispensed { water_kg: water });
            }
            Ok(())
        },
    )
}

fn completion_stage() -> StageSequencer<FillContext> {
    StageSequencer::new(
        "completion",
        |ctx: &mut FillContext| {
            if let Err(e) = ctx.batch_sink.submit(&ctx.batch) {
                warn!("Batch hand-off failed: {}", e);
                ctx.emit(StationEvent::error(format!("Batch hand-off failed: {}", e)));
            }
            let tote_id = ctx
                .batch
                .id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            ctx.emit(StationEvent::ToteCompleted { tote_id });
            Ok(())
        },
        |ctx: &mut FillContext| {
            let batch = &ctx.batch;
            info!(
                "Tote {} done: fish {:.2} kg, ice {:.2} kg, water {:.2} kg",
                batch.id.as_ref().map(ToteId::as_str).unwrap_or("-"),
                batch.fish_kg,
                batch.ice_out_kg().unwrap_or(0.0),
                batch.water_out_kg().unwrap_or(0.0)
            );
            ctx.tare_best_effort();
            ctx.batch.reset();
            Ok(())
        },
    )
}

/// 托盘填充编排器
pub struct ToteFillOrchestrator {
    ctx: FillContext,
    ice_stage: StageSequencer<FillContext>,
    water_stage: StageSequencer<FillContext>,
    completion_stage: StageSequencer<FillContext>,
    validator: Box<dyn ToteValidator>,
    fill: FillConfig,
    timing: TimingConfig,
    state: ToteFillState,
    start_requested: bool,
    stop_requested: bool,
    last_poll: Option<Instant>,
    last_status: Option<Instant>,
    ticks: u64,
}

/// 编排器 Builder
pub struct OrchestratorBuilder {
    sensor: Box<dyn WeightSensorClient>,
    outputs: Box<dyn DigitalOutputs>,
    fill: FillConfig,
    timing: TimingConfig,
    events: Box<dyn EventSink>,
    validator: Box<dyn ToteValidator>,
    batch_sink: Box<dyn BatchSink>,
    clock: Arc<dyn Clock>,
}

impl OrchestratorBuilder {
    pub fn fill(mut self, fill: FillConfig) -> Self {
        self.fill = fill;
        self
    }

    pub fn timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn events(mut self, events: impl EventSink + 'static) -> Self {
        self.events = Box::new(events);
        self
    }

    pub fn validator(mut self, validator: impl ToteValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn batch_sink(mut self, sink: impl BatchSink + 'static) -> Self {
        self.batch_sink = Box::new(sink);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// # Errors
    /// - `StationError::Config`: 填充或时序参数非法
    pub fn build(self) -> Result<ToteFillOrchestrator, StationError> {
        self.fill.validate()?;
        self.timing.validate()?;

        let valves = ValveBank::new(
            self.outputs,
            self.timing.pulse(),
            self.timing.manual_override(),
        );
        let ctx = FillContext {
            sensor: self.sensor,
            valves,
            events: self.events,
            batch_sink: self.batch_sink,
            clock: self.clock,
            batch: ToteBatch::new(self.fill.target_ice_kg, self.fill.target_water_kg),
            throttle: WeightThrottle::new(
                self.timing.weight_broadcast_interval(),
                self.timing.weight_broadcast_delta_kg,
            ),
            last_weight_kg: None,
            crossing_kg: None,
            sensor_fault: None,
            paused: false,
        };
        Ok(ToteFillOrchestrator {
            ctx,
            ice_stage: ice_stage(),
            water_stage: water_stage(),
            completion_stage: completion_stage(),
            validator: self.validator,
            fill: self.fill,
            timing: self.timing,
            state: ToteFillState::Idle,
            start_requested: false,
            stop_requested: false,
            last_poll: None,
            last_status: None,
            ticks: 0,
        })
    }
}

impl ToteFillOrchestrator {
    /// 创建 Builder（默认：默认配置、系统时钟、不校验 ID、批次只写日志）
    pub fn builder(
        sensor: Box<dyn WeightSensorClient>,
        outputs: Box<dyn DigitalOutputs>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            sensor,
            outputs,
            fill: FillConfig::default(),
            timing: TimingConfig::default(),
            events: Box::new(NullSink),
            validator: Box::new(AcceptAll),
            batch_sink: Box::new(LogBatchSink),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn state(&self) -> ToteFillState {
        self.state
    }

    pub fn batch(&self) -> &ToteBatch {
        &self.ctx.batch
    }

    pub fn is_start_pending(&self) -> bool {
        self.start_requested
    }

    pub fn is_paused(&self) -> bool {
        self.ctx.paused
    }

    pub fn valve_open(&self, valve: Valve) -> bool {
        self.ctx.valves.is_open(valve)
    }

    /// 各阶段当前步数（冰、水、完成）
    pub fn stage_steps(&self) -> [u8; 3] {
        [
            self.ice_stage.current_step(),
            self.water_stage.current_step(),
            self.completion_stage.current_step(),
        ]
    }

    pub fn status(&self) -> StationStatus {
        StationStatus {
            state: self.state,
            last_weight_kg: self.ctx.last_weight_kg,
            batch: self.ctx.batch.clone(),
            sensor_fault: self.ctx.sensor_fault.map(|f| f.as_str()),
            paused: self.ctx.paused,
            manual_override: self.ctx.valves.manual_active(),
            ticks: self.ticks,
        }
    }

    fn reject(&self, err: StationError) -> StationError {
        warn!("{}", err);
        self.ctx.emit(StationEvent::error(err.to_string()));
        err
    }

    /// 开始填充（仅 IDLE）；下一个 tick 读取重量后决定是否开始
    pub fn request_start(&mut self) -> Result<(), StationError> {
        if self.state != ToteFillState::Idle {
            return Err(self.reject(StationError::WrongState {
                expected: ToteFillState::Idle,
                actual: self.state,
            }));
        }
        info!("Start requested");
        self.start_requested = true;
        Ok(())
    }

    /// 停止：下一个 tick 开始时处理
    pub fn request_stop(&mut self) {
        info!("Stop requested");
        self.stop_requested = true;
    }

    /// 手动超控（出料阶段和 ERROR 中拒绝）
    pub fn request_manual(&mut self, valve: Valve) -> Result<(), StationError> {
        if self.state.is_dispensing() || self.state == ToteFillState::Error {
            return Err(self.reject(StationError::ManualOverrideRejected(self.state)));
        }
        let now = self.ctx.now();
        if let Err(e) = self.ctx.valves.manual_open(valve, now) {
            let message = e.to_string();
            self.fail(e);
            return Err(StationError::Output(message));
        }
        Ok(())
    }

    /// 提交托盘 ID（仅 WAITING_ID）
    ///
    /// 依次校验状态、长度、外部校验器，全部通过后进入 COMPLETED。
    pub fn submit_id(&mut self, raw: &str) -> Result<(), StationError> {
        if self.state != ToteFillState::WaitingId {
            return Err(self.reject(StationError::WrongState {
                expected: ToteFillState::WaitingId,
                actual: self.state,
            }));
        }
        let id = ToteId::parse(raw, self.fill.max_id_len).map_err(|e| self.reject(e))?;
        if let Err(e) = self.validator.validate(&id, &self.ctx.batch) {
            return Err(self.reject(StationError::IdentifierRejected {
                id: id.to_string(),
                reason: e.to_string(),
            }));
        }
        info!("Tote ID accepted: {}", id);
        self.ctx.emit(StationEvent::ToteValidated {
            tote_id: id.to_string(),
        });
        self.ctx.batch.id = Some(id);
        self.transition(ToteFillState::Completed);
        Ok(())
    }

    /// 上游批号（仅 IDLE，写入下一个批次）
    pub fn set_lot_number(&mut self, lot: &str) -> Result<(), StationError> {
        self.require_idle()?;
        let lot = lot.trim();
        self.ctx.batch.lot_number = (!lot.is_empty()).then(|| lot.to_string());
        Ok(())
    }

    /// 上游报告的托盘+残留重量（仅 IDLE）
    pub fn set_upstream_raw_kg(&mut self, raw_kg: f64) -> Result<(), StationError> {
        self.require_idle()?;
        if !raw_kg.is_finite() || raw_kg < 0.0 {
            return Err(self.reject(StationError::Config(format!(
                "raw weight must be a non-negative number, got {}",
                raw_kg
            ))));
        }
        self.ctx.batch.raw_kg = Some(raw_kg);
        Ok(())
    }

    fn require_idle(&self) -> Result<(), StationError> {
        if self.state == ToteFillState::Idle {
            Ok(())
        } else {
            Err(self.reject(StationError::WrongState {
                expected: ToteFillState::Idle,
                actual: self.state,
            }))
        }
    }

    /// 外部故障：关闭阀门并进入 ERROR
    pub fn fault(&mut self, reason: impl Into<String>) {
        self.fail(StationError::Fault(reason.into()));
    }

    /// 从 ERROR 恢复到 IDLE（人工干预）
    pub fn reset(&mut self) -> Result<(), StationError> {
        if self.state != ToteFillState::Error {
            return Err(self.reject(StationError::WrongState {
                expected: ToteFillState::Error,
                actual: self.state,
            }));
        }
        let now = self.ctx.now();
        self.ctx.valves.close_all(now).map_err(|e| self.reject(e))?;
        self.ctx.batch.reset();
        self.ctx.paused = false;
        self.ctx.throttle.reset();
        info!("Station reset");
        self.transition(ToteFillState::Idle);
        Ok(())
    }

    /// 退出前收尾：出料中则取消，关闭所有阀门，等待关闭脉冲完成后释放
    pub fn shutdown(&mut self) {
        if self.state.is_dispensing() {
            self.cancel();
        }
        let now = self.ctx.now();
        if let Err(e) = self.ctx.valves.close_all(now) {
            error!("Failed to close valves on shutdown: {}", e);
            return;
        }
        std::thread::sleep(self.ctx.valves.pulse_width());
        if let Err(e) = self.ctx.valves.release_pulses() {
            error!("Failed to release valve pulses on shutdown: {}", e);
        }
    }

    /// 执行一个控制周期，返回周期结束时的状态
    pub fn tick(&mut self) -> ToteFillState {
        self.ticks += 1;
        let now = self.ctx.now();

        if let Err(e) = self.ctx.valves.service(now) {
            if self.state != ToteFillState::Error {
                self.fail(e);
            } else {
                debug!("Output service failed in ERROR: {}", e);
            }
            return self.state;
        }

        if self.stop_requested {
            self.stop_requested = false;
            if self.state.accepts_stop() {
                self.cancel();
                return self.state;
            }
            info!("Stop ignored in {}", self.state);
        }

        let result = match self.state {
            ToteFillState::Idle => self.on_idle(now),
            ToteFillState::DispensingIce => self.on_dispensing_ice(),
            ToteFillState::DispensingWater => self.on_dispensing_water(),
            ToteFillState::WaitingId => {
                self.on_waiting_id(now);
                Ok(())
            },
            ToteFillState::Completed => self.on_completed(),
            ToteFillState::Canceled => {
                self.transition(ToteFillState::Idle);
                Ok(())
            },
            ToteFillState::Error => Ok(()),
        };
        if let Err(e) = result {
            self.fail(e);
        }
        self.state
    }

    fn transition(&mut self, next: ToteFillState) {
        if self.state == next {
            return;
        }
        info!("State {} -> {}", self.state, next);
        self.state = next;
        self.ctx.emit(StationEvent::StateChange { state: next });
    }

    fn poll_due(&self, now: Instant) -> bool {
        match self.timing.idle_weight_poll() {
            Some(interval) => self
                .last_poll
                .is_none_or(|at| now.duration_since(at) >= interval),
            None => false,
        }
    }

    fn on_idle(&mut self, now: Instant) -> Result<(), StationError> {
        if !self.start_requested {
            if self.poll_due(now) {
                self.last_poll = Some(now);
                self.ctx.read_gross();
            }
            return Ok(());
        }

        self.last_poll = Some(now);
        match self.ctx.read_gross() {
            WeightSample::Kg(kg) if kg >= self.fill.min_weight_kg => {
                self.start_requested = false;
                self.begin_fill(kg)
            },
            WeightSample::Kg(kg) => {
                self.start_requested = false;
                let message = format!(
                    "Weight {:.2} kg below minimum {:.2} kg, start ignored",
                    kg, self.fill.min_weight_kg
                );
                warn!("{}", message);
                self.ctx.emit(StationEvent::error(message));
                Ok(())
            },
            // 保持请求，下个 tick 重试
            WeightSample::Failed(_) => Ok(()),
        }
    }

    fn begin_fill(&mut self, gross_kg: f64) -> Result<(), StationError> {
        let batch = &mut self.ctx.batch;
        batch.fish_kg = match batch.raw_kg {
            Some(raw) => round_centi((gross_kg - raw).max(0.0)),
            None => gross_kg,
        };
        info!(
            "Starting fill: gross {:.2} kg, fish {:.2} kg",
            gross_kg, batch.fish_kg
        );
        self.ctx.tare_best_effort();
        self.transition(ToteFillState::DispensingIce);
        self.ice_stage.init(&mut self.ctx)
    }

    fn on_dispensing_ice(&mut self) -> Result<(), StationError> {
        if !self.ice_stage.is_started() {
            self.ice_stage.init(&mut self.ctx)?;
        }
        let Some(kg) = self.ctx.sample_for_dispensing(Valve::Ice)? else {
            return Ok(());
        };
        let delta = kg - self.ctx.batch.initial_weight_kg;
        if delta < self.fill.target_ice_kg {
            return Ok(());
        }

        debug!("Ice threshold reached: delta {:.2} kg", delta);
        self.ice_stage.next_step();
        self.ctx.crossing_kg = Some(kg);
        self.ice_stage.destroy(&mut self.ctx)?;
        self.transition(ToteFillState::DispensingWater);
        self.water_stage.init(&mut self.ctx)
    }

    fn on_dispensing_water(&mut self) -> Result<(), StationError> {
        if !self.water_stage.is_started() {
            self.water_stage.init(&mut self.ctx)?;
        }
        let Some(kg) = self.ctx.sample_for_dispensing(Valve::Water)? else {
            return Ok(());
        };
        let delta = kg - self.ctx.batch.initial_weight_kg;
        if delta < self.fill.target_ice_kg + self.fill.target_water_kg {
            return Ok(());
        }

        debug!("Water threshold reached: delta {:.2} kg", delta);
        self.water_stage.next_step();
        self.ctx.crossing_kg = Some(kg);
        self.water_stage.destroy(&mut self.ctx)?;
        self.last_status = None;
        self.transition(ToteFillState::WaitingId);
        Ok(())
    }

    fn on_waiting_id(&mut self, now: Instant) {
        let interval = self.timing.waiting_status_interval();
        if self
            .last_status
            .is_none_or(|at| now.duration_since(at) >= interval)
        {
            self.last_status = Some(now);
            let batch = &self.ctx.batch;
            let (fish_kg, ice_kg, water_kg) = (
                batch.fish_kg,
                batch.ice_out_kg().unwrap_or(0.0),
                batch.water_out_kg().unwrap_or(0.0),
            );
            info!(
                "Waiting for tote ID (fish {:.2} kg, ice {:.2} kg, water {:.2} kg)",
                fish_kg, ice_kg, water_kg
            );
            self.ctx.emit(StationEvent::Status {
                state: self.state,
                fish_kg,
                ice_kg,
                water_kg,
            });
        }
        if self.poll_due(now) {
            self.last_poll = Some(now);
            self.ctx.read_gross();
        }
    }

    fn on_completed(&mut self) -> Result<(), StationError> {
        if !self.completion_stage.is_started() {
            self.completion_stage.init(&mut self.ctx)?;
        }
        self.completion_stage.next_step();
        self.completion_stage.destroy(&mut self.ctx)?;
        self.transition(ToteFillState::Idle);
        Ok(())
    }

    /// 取消：关闭阀门、结束阶段（不结算）、清空批次
    fn cancel(&mut self) {
        info!("Canceling from {}", self.state);
        self.start_requested = false;
        self.ctx.crossing_kg = None;
        self.ctx.paused = false;

        let mut result = Ok(());
        for stage in [
            &mut self.ice_stage,
            &mut self.water_stage,
            &mut self.completion_stage,
        ] {
            if let Err(e) = stage.destroy(&mut self.ctx) {
                result = result.and(Err(e));
            }
        }
        let now = self.ctx.now();
        if let Err(e) = self.ctx.valves.close_all(now) {
            result = result.and(Err(e));
        }
        self.ctx.batch.reset();
        self.ctx.tare_best_effort();
        self.transition(ToteFillState::Canceled);

        if let Err(e) = result {
            self.fail(e);
        }
    }

    /// 进入 ERROR：尽力关闭阀门并结束所有阶段
    fn fail(&mut self, err: StationError) {
        error!("Entering ERROR from {}: {}", self.state, err);
        self.ctx.emit(StationEvent::error(err.to_string()));
        self.start_requested = false;
        self.ctx.crossing_kg = None;

        for stage in [
            &mut self.ice_stage,
            &mut self.water_stage,
            &mut self.completion_stage,
        ] {
            if let Err(e) = stage.destroy(&mut self.ctx) {
                warn!("Stage '{}' cleanup failed: {}", stage.name(), e);
            }
        }
        let now = self.ctx.now();
        if let Err(e) = self.ctx.valves.close_all(now) {
            error!("Failed to close valves: {}", e);
        }
        self.transition(ToteFillState::Error);
    }
}

impl std::fmt::Debug for ToteFillOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToteFillOrchestrator")
            .field("state", &self.state)
            .field("batch", &self.ctx.batch)
            .field("valves", &self.ctx.valves)
            .field("start_requested", &self.start_requested)
            .field("ticks", &self.ticks)
            .finish()
    }
}
