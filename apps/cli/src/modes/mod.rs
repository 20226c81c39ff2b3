//! 交互模式

pub mod console;
