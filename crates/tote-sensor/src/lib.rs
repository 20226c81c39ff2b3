//! # Tote Sensor
//!
//! 称重传感器客户端：把协议层（`tote-protocol`）和传输层（`tote-transport`）
//! 组合成面向业务的 [`WeightSensorClient`]。
//!
//! ## 变体
//!
//! | 类型 | 传输 | 超时 | 重连 |
//! |------|------|------|------|
//! | [`ModbusScaleClient`] | RS-485 串口 | 1 s | 无 |
//! | [`AsciiScaleClient`] | TCP | 2 s | 每次调用最多一次 |
//! | [`SimulatedScale`] | 无 | - | - |
//!
//! ## 示例
//!
//! ```no_run
//! use tote_sensor::{ScaleBuilder, SensorKind, WeightSample};
//!
//! let mut scale = ScaleBuilder::new(SensorKind::AsciiTcp {
//!     address: "192.168.1.50:4001".into(),
//! })
//! .build()
//! .unwrap();
//!
//! match scale.read_gross_weight_kg() {
//!     WeightSample::Kg(kg) => println!("{:.2} kg", kg),
//!     WeightSample::Failed(reason) => eprintln!("read failed: {}", reason),
//! }
//! ```

pub mod ascii_client;
pub mod builder;
pub mod client;
pub mod error;
pub mod metrics;
pub mod modbus_client;
pub mod sample;
pub mod shared;
pub mod sim;

pub use ascii_client::{ASCII_TIMEOUT, AsciiScaleClient, AsciiScaleConfig};
pub use builder::{ScaleBuilder, SensorKind};
pub use client::WeightSensorClient;
pub use error::SensorError;
pub use metrics::{SensorMetrics, SensorMetricsSnapshot};
pub use modbus_client::{MODBUS_TIMEOUT, ModbusScaleClient};
pub use sample::{SampleFailure, WeightSample};
pub use shared::SharedSensor;
pub use sim::{SimulatedScale, SimulatedScaleHandle};
