//! Builder 模式实现
//!
//! 在**构造时**选择传感器协议变体，返回统一的 `Box<dyn WeightSensorClient>`。

use crate::ascii_client::{AsciiScaleClient, AsciiScaleConfig};
use crate::client::WeightSensorClient;
use crate::error::SensorError;
use crate::metrics::SensorMetrics;
use crate::sim::SimulatedScale;
use std::sync::Arc;
use std::time::Duration;
use tote_transport::{LineTransport, TcpLineClient};
use tracing::{info, warn};

/// 传感器变体选择
#[derive(Debug, Clone, PartialEq)]
pub enum SensorKind {
    /// RS-485 串口上的 Modbus RTU
    ModbusRtu {
        port: String,
        baud_rate: u32,
        slave_id: u8,
    },
    /// TCP 上的 ASCII 行协议
    AsciiTcp { address: String },
    /// 模拟仪表（无硬件）
    Simulated { initial_kg: f64 },
}

/// 称重客户端 Builder
///
/// # Example
///
/// ```no_run
/// use tote_sensor::{ScaleBuilder, SensorKind};
///
/// let scale = ScaleBuilder::new(SensorKind::ModbusRtu {
///     port: "/dev/ttyUSB0".into(),
///     baud_rate: 9600,
///     slave_id: 1,
/// })
/// .build()
/// .unwrap();
/// ```
pub struct ScaleBuilder {
    kind: SensorKind,
    timeout: Option<Duration>,
    ascii: AsciiScaleConfig,
    metrics: Option<Arc<SensorMetrics>>,
}

impl ScaleBuilder {
    pub fn new(kind: SensorKind) -> Self {
        Self {
            kind,
            timeout: None,
            ascii: AsciiScaleConfig::default(),
            metrics: None,
        }
    }

    /// 覆盖默认事务超时（Modbus 1 s / ASCII 2 s）
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// ASCII 协议参数（仅 `AsciiTcp` 使用）
    pub fn ascii_config(mut self, config: AsciiScaleConfig) -> Self {
        self.ascii = config;
        self
    }

    /// 共享外部指标实例
    pub fn metrics(mut self, metrics: Arc<SensorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// 构建客户端
    ///
    /// # Errors
    /// - `SensorError::Transport`: 串口打开失败
    /// - `SensorError::Unsupported`: 编译时未启用 `serial` 特性却请求 Modbus RTU
    ///
    /// ASCII 变体连接失败不会导致构建失败，首次读取时会再尝试连接。
    pub fn build(self) -> Result<Box<dyn WeightSensorClient>, SensorError> {
        let metrics = self.metrics.unwrap_or_default();
        match self.kind {
            SensorKind::ModbusRtu {
                port,
                baud_rate,
                slave_id,
            } => build_modbus(&port, baud_rate, slave_id, self.timeout, metrics),
            SensorKind::AsciiTcp { address } => {
                let mut config = self.ascii;
                if let Some(timeout) = self.timeout {
                    config.timeout = timeout;
                }
                let mut link = TcpLineClient::new(address.clone(), config.timeout);
                match link.connect() {
                    Ok(()) => info!("ASCII scale connected at {}", address),
                    Err(e) => warn!(
                        "ASCII scale at {} not reachable yet ({}), will retry on first read",
                        address, e
                    ),
                }
                Ok(Box::new(
                    AsciiScaleClient::new(link, config).with_metrics(metrics),
                ))
            },
            SensorKind::Simulated { initial_kg } => {
                info!("Using simulated scale (initial {:.2} kg)", initial_kg);
                Ok(Box::new(SimulatedScale::new(initial_kg)))
            },
        }
    }
}

#[cfg(feature = "serial")]
fn build_modbus(
    port: &str,
    baud_rate: u32,
    slave_id: u8,
    timeout: Option<Duration>,
    metrics: Arc<SensorMetrics>,
) -> Result<Box<dyn WeightSensorClient>, SensorError> {
    use crate::modbus_client::ModbusScaleClient;
    use tote_transport::SerialBus;

    let bus = SerialBus::open(port, baud_rate).map_err(SensorError::Transport)?;
    info!(
        "Modbus RTU scale on {} ({} baud, slave {})",
        port, baud_rate, slave_id
    );
    let mut client = ModbusScaleClient::new(bus, slave_id).with_metrics(metrics);
    if let Some(timeout) = timeout {
        client = client.with_timeout(timeout);
    }
    Ok(Box::new(client))
}

#[cfg(not(feature = "serial"))]
fn build_modbus(
    _port: &str,
    _baud_rate: u32,
    _slave_id: u8,
    _timeout: Option<Duration>,
    _metrics: Arc<SensorMetrics>,
) -> Result<Box<dyn WeightSensorClient>, SensorError> {
    Err(SensorError::Unsupported(
        "Modbus RTU requires the `serial` feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_simulated() {
        let mut scale = ScaleBuilder::new(SensorKind::Simulated { initial_kg: 12.0 })
            .build()
            .unwrap();
        assert_eq!(scale.variant(), "simulated");
        assert_eq!(scale.read_gross_weight_kg().kg(), Some(12.0));
    }

    #[test]
    fn test_build_ascii_without_server_is_lazy() {
        let scale = ScaleBuilder::new(SensorKind::AsciiTcp {
            address: "127.0.0.1:1".into(),
        })
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();
        assert_eq!(scale.variant(), "ascii-tcp");
        assert!(!scale.is_reachable());
    }

    #[cfg(feature = "serial")]
    #[test]
    fn test_build_modbus_missing_port() {
        let result = ScaleBuilder::new(SensorKind::ModbusRtu {
            port: "/dev/tote-does-not-exist".into(),
            baud_rate: 9600,
            slave_id: 1,
        })
        .build();
        assert!(matches!(result, Err(SensorError::Transport(_))));
    }
}
