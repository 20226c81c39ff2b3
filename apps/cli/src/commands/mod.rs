//! 子命令实现

pub mod config;
pub mod run;
pub mod tare;
pub mod weigh;

pub use config::ConfigCommand;
pub use run::RunCommand;
pub use tare::TareCommand;
pub use weigh::WeighCommand;
