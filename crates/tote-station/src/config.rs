//! 工位配置（TOML）
//!
//! ```toml
//! [fill]
//! min_weight_kg = 5.0
//! target_ice_kg = 2.0
//! target_water_kg = 2.0
//!
//! [sensor]
//! kind = "ascii-tcp"
//! address = "192.168.1.50:4001"
//!
//! [telemetry]
//! address = "192.168.1.10:9000"
//! ```
//!
//! 所有字段都有默认值，缺省的段落使用默认配置。

use crate::error::StationError;
use crate::types::DEFAULT_MAX_ID_LEN;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tote_sensor::{ASCII_TIMEOUT, AsciiScaleConfig, MODBUS_TIMEOUT, ScaleBuilder, SensorKind};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub fill: FillConfig,
    pub timing: TimingConfig,
    pub sensor: SensorConfig,
    pub telemetry: TelemetryConfig,
}

/// 填充参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillConfig {
    /// 开始填充所需的最小毛重
    pub min_weight_kg: f64,
    pub target_ice_kg: f64,
    pub target_water_kg: f64,
    pub max_id_len: usize,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            min_weight_kg: 5.0,
            target_ice_kg: 2.0,
            target_water_kg: 2.0,
            max_id_len: DEFAULT_MAX_ID_LEN,
        }
    }
}

impl FillConfig {
    pub fn validate(&self) -> Result<(), StationError> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(StationError::Config(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )))
            }
        };
        positive("fill.target_ice_kg", self.target_ice_kg)?;
        positive("fill.target_water_kg", self.target_water_kg)?;
        if !self.min_weight_kg.is_finite() || self.min_weight_kg < 0.0 {
            return Err(StationError::Config(format!(
                "fill.min_weight_kg must be >= 0, got {}",
                self.min_weight_kg
            )));
        }
        if self.max_id_len == 0 {
            return Err(StationError::Config(
                "fill.max_id_len must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// 时序参数（毫秒）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub tick_interval_ms: u64,
    pub pulse_ms: u64,
    pub manual_override_ms: u64,
    /// 非出料状态下的重量轮询间隔，0 表示不轮询
    pub idle_weight_poll_ms: u64,
    pub waiting_status_interval_ms: u64,
    pub weight_broadcast_interval_ms: u64,
    pub weight_broadcast_delta_kg: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 20,
            pulse_ms: 200,
            manual_override_ms: 5000,
            idle_weight_poll_ms: 200,
            waiting_status_interval_ms: 2000,
            weight_broadcast_interval_ms: 1000,
            weight_broadcast_delta_kg: 0.02,
        }
    }
}

impl TimingConfig {
    pub fn validate(&self) -> Result<(), StationError> {
        for (name, value) in [
            ("timing.tick_interval_ms", self.tick_interval_ms),
            ("timing.pulse_ms", self.pulse_ms),
            ("timing.manual_override_ms", self.manual_override_ms),
            (
                "timing.waiting_status_interval_ms",
                self.waiting_status_interval_ms,
            ),
        ] {
            if value == 0 {
                return Err(StationError::Config(format!("{} must be > 0", name)));
            }
        }
        if !self.weight_broadcast_delta_kg.is_finite() || self.weight_broadcast_delta_kg < 0.0 {
            return Err(StationError::Config(
                "timing.weight_broadcast_delta_kg must be >= 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn pulse(&self) -> Duration {
        Duration::from_millis(self.pulse_ms)
    }

    pub fn manual_override(&self) -> Duration {
        Duration::from_millis(self.manual_override_ms)
    }

    pub fn idle_weight_poll(&self) -> Option<Duration> {
        (self.idle_weight_poll_ms > 0).then(|| Duration::from_millis(self.idle_weight_poll_ms))
    }

    pub fn waiting_status_interval(&self) -> Duration {
        Duration::from_millis(self.waiting_status_interval_ms)
    }

    pub fn weight_broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.weight_broadcast_interval_ms)
    }
}

fn default_baud_rate() -> u32 {
    tote_protocol::DEFAULT_BAUD_RATE
}

fn default_slave_id() -> u8 {
    tote_protocol::DEFAULT_SLAVE_ID
}

fn default_modbus_timeout_ms() -> u64 {
    MODBUS_TIMEOUT.as_millis() as u64
}

fn default_ascii_timeout_ms() -> u64 {
    ASCII_TIMEOUT.as_millis() as u64
}

fn default_weight_model_id() -> u16 {
    AsciiScaleConfig::default().weight_model_id
}

fn default_weight_dimension() -> u16 {
    AsciiScaleConfig::default().weight_dimension
}

fn default_tare_model_id() -> u16 {
    AsciiScaleConfig::default().tare_model_id
}

fn default_tare_dimension() -> u16 {
    AsciiScaleConfig::default().tare_dimension
}

/// 传感器变体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SensorConfig {
    ModbusRtu {
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        #[serde(default = "default_slave_id")]
        slave_id: u8,
        #[serde(default = "default_modbus_timeout_ms")]
        timeout_ms: u64,
    },
    AsciiTcp {
        address: String,
        #[serde(default = "default_weight_model_id")]
        weight_model_id: u16,
        #[serde(default = "default_weight_dimension")]
        weight_dimension: u16,
        #[serde(default = "default_tare_model_id")]
        tare_model_id: u16,
        #[serde(default = "default_tare_dimension")]
        tare_dimension: u16,
        #[serde(default = "default_ascii_timeout_ms")]
        timeout_ms: u64,
    },
    Simulated {
        #[serde(default)]
        initial_kg: f64,
    },
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig::ModbusRtu {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: default_baud_rate(),
            slave_id: default_slave_id(),
            timeout_ms: default_modbus_timeout_ms(),
        }
    }
}

impl SensorConfig {
    /// 转换为传感器 Builder
    pub fn to_builder(&self) -> ScaleBuilder {
        match self {
            SensorConfig::ModbusRtu {
                port,
                baud_rate,
                slave_id,
                timeout_ms,
            } => ScaleBuilder::new(SensorKind::ModbusRtu {
                port: port.clone(),
                baud_rate: *baud_rate,
                slave_id: *slave_id,
            })
            .timeout(Duration::from_millis(*timeout_ms)),
            SensorConfig::AsciiTcp {
                address,
                weight_model_id,
                weight_dimension,
                tare_model_id,
                tare_dimension,
                timeout_ms,
            } => {
                let timeout = Duration::from_millis(*timeout_ms);
                ScaleBuilder::new(SensorKind::AsciiTcp {
                    address: address.clone(),
                })
                .ascii_config(AsciiScaleConfig {
                    weight_model_id: *weight_model_id,
                    weight_dimension: *weight_dimension,
                    tare_model_id: *tare_model_id,
                    tare_dimension: *tare_dimension,
                    timeout,
                    ..AsciiScaleConfig::default()
                })
                .timeout(timeout)
            },
            SensorConfig::Simulated { initial_kg } => ScaleBuilder::new(SensorKind::Simulated {
                initial_kg: *initial_kg,
            }),
        }
    }

    fn timeout_ms(&self) -> Option<u64> {
        match self {
            SensorConfig::ModbusRtu { timeout_ms, .. }
            | SensorConfig::AsciiTcp { timeout_ms, .. } => Some(*timeout_ms),
            SensorConfig::Simulated { .. } => None,
        }
    }
}

/// 遥测推送配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// 推送端点（`host:port`），未设置时不启动遥测
    pub address: Option<String>,
    pub station: String,
    pub heartbeat_secs: u64,
    pub max_reconnect_delay_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            address: None,
            station: "outbound".to_string(),
            heartbeat_secs: 30,
            max_reconnect_delay_secs: 30,
        }
    }
}

impl StationConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, StationError> {
        let config: Self =
            toml::from_str(text).map_err(|e| StationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, StationError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StationError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, StationError> {
        toml::to_string_pretty(self).map_err(|e| StationError::Config(e.to_string()))
    }

    /// 校验参数取值
    pub fn validate(&self) -> Result<(), StationError> {
        self.fill.validate()?;
        self.timing.validate()?;

        if self.sensor.timeout_ms() == Some(0) {
            return Err(StationError::Config(
                "sensor.timeout_ms must be > 0".to_string(),
            ));
        }
        match &self.sensor {
            SensorConfig::ModbusRtu { port, .. } if port.trim().is_empty() => {
                return Err(StationError::Config("sensor.port is empty".to_string()));
            },
            SensorConfig::AsciiTcp { address, .. } if address.trim().is_empty() => {
                return Err(StationError::Config("sensor.address is empty".to_string()));
            },
            _ => {},
        }

        if self.telemetry.station.trim().is_empty() {
            return Err(StationError::Config(
                "telemetry.station must not be empty".to_string(),
            ));
        }
        if self.telemetry.heartbeat_secs == 0 || self.telemetry.max_reconnect_delay_secs == 0 {
            return Err(StationError::Config(
                "telemetry intervals must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
