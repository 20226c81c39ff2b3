//! 出料阶段生命周期
//!
//! 每个阶段持有构造时绑定的进入/退出动作，编排器在状态转移时调用：
//!
//! ```text
//! step 0 ──init()──▶ step 1 ──next_step()──▶ step 2 ──destroy()──▶ step 0
//! ```
//!
//! - `init()` 在已启动的阶段上调用返回 `StageError::AlreadyStarted`
//! - `destroy()` 在 step 0 上是空操作，因此退出动作对每次启动只执行一次
//! - `next_step()` 无副作用，在 `expected_steps` 处饱和

use crate::error::{StageError, StationError};

/// 阶段动作：在共享上下文上执行，可失败
pub type StageAction<C> = Box<dyn FnMut(&mut C) -> Result<(), StationError> + Send>;

/// 两步出料阶段
pub struct StageSequencer<C> {
    name: &'static str,
    expected_steps: u8,
    current_step: u8,
    on_init: StageAction<C>,
    on_destroy: StageAction<C>,
}

impl<C> StageSequencer<C> {
    /// 默认步数：1 = 运行中，2 = 已达阈值待结算
    pub const DEFAULT_STEPS: u8 = 2;

    pub fn new<I, D>(name: &'static str, on_init: I, on_destroy: D) -> Self
    where
        I: FnMut(&mut C) -> Result<(), StationError> + Send + 'static,
        D: FnMut(&mut C) -> Result<(), StationError> + Send + 'static,
    {
        Self {
            name,
            expected_steps: Self::DEFAULT_STEPS,
            current_step: 0,
            on_init: Box::new(on_init),
            on_destroy: Box::new(on_destroy),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn current_step(&self) -> u8 {
        self.current_step
    }

    pub fn expected_steps(&self) -> u8 {
        self.expected_steps
    }

    pub fn is_started(&self) -> bool {
        self.current_step > 0
    }

    /// 启动阶段并执行进入动作
    ///
    /// 步数先置 1 再执行动作：动作失败时阶段仍视为已启动，
    /// 随后的 `destroy()` 会执行退出动作关闭阀门。
    pub fn init(&mut self, ctx: &mut C) -> Result<(), StationError> {
        if self.current_step != 0 {
            return Err(StageError::AlreadyStarted(self.name).into());
        }
        self.current_step = 1;
        (self.on_init)(ctx)
    }

    pub fn next_step(&mut self) {
        if self.current_step < self.expected_steps {
            self.current_step += 1;
        }
    }

    /// 执行退出动作并复位到 step 0
    ///
    /// 返回 `Ok(false)` 表示阶段未启动，未执行任何动作。
    pub fn destroy(&mut self, ctx: &mut C) -> Result<bool, StationError> {
        if self.current_step == 0 {
            return Ok(false);
        }
        self.current_step = 0;
        (self.on_destroy)(ctx)?;
        Ok(true)
    }
}

impl<C> std::fmt::Debug for StageSequencer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageSequencer")
            .field("name", &self.name)
            .field("current_step", &self.current_step)
            .field("expected_steps", &self.expected_steps)
            .finish()
    }
}
