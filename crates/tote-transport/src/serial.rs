//! RS-485 串口总线
//!
//! 基于 `serialport` crate。方向控制（DE/RE）由 USB-RS485 转换器硬件自动完成，
//! 应用层只做半双工的"写请求 → 读响应"。
//!
//! ## 限制
//!
//! - 无重连概念：端口打开失败即构造失败，之后每次读取独立超时
//! - **权限要求**：Linux 下可能需要 `dialout` 组权限

use crate::{FrameTransport, TransportDeviceError, TransportDeviceErrorKind, TransportError};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::{trace, warn};

/// 串口总线（8N1）
pub struct SerialBus {
    port: Box<dyn SerialPort>,
    port_name: String,
    baud_rate: u32,
    /// 当前端口读超时（避免每次调用都重复设置）
    read_timeout: Duration,
}

impl std::fmt::Debug for SerialBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialBus")
            .field("port_name", &self.port_name)
            .field("baud_rate", &self.baud_rate)
            .finish()
    }
}

impl SerialBus {
    /// 打开串口
    ///
    /// # 参数
    /// - `port_name`: 设备路径（如 "/dev/ttyUSB0" 或 "COM3"）
    /// - `baud_rate`: 波特率（仪表默认 9600）
    ///
    /// # 错误
    /// - `TransportError::Device`: 设备不存在、无权限或配置不被支持
    ///
    /// # 示例
    ///
    /// ```no_run
    /// use tote_transport::SerialBus;
    ///
    /// let bus = SerialBus::open("/dev/ttyUSB0", 9600).unwrap();
    /// ```
    pub fn open(port_name: impl Into<String>, baud_rate: u32) -> Result<Self, TransportError> {
        let port_name = port_name.into();
        let read_timeout = Duration::from_millis(100);

        let port = serialport::new(&port_name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(read_timeout)
            .open()
            .map_err(|e| map_serial_error(&port_name, e))?;

        trace!("Serial port '{}' opened at {} baud (8N1)", port_name, baud_rate);

        Ok(Self {
            port,
            port_name,
            baud_rate,
            read_timeout,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

fn map_serial_error(port_name: &str, err: serialport::Error) -> TransportError {
    let kind = match err.kind() {
        serialport::ErrorKind::NoDevice => TransportDeviceErrorKind::NoDevice,
        serialport::ErrorKind::InvalidInput => TransportDeviceErrorKind::UnsupportedConfig,
        serialport::ErrorKind::Io(ErrorKind::NotFound) => TransportDeviceErrorKind::NotFound,
        serialport::ErrorKind::Io(ErrorKind::PermissionDenied) => {
            TransportDeviceErrorKind::AccessDenied
        },
        serialport::ErrorKind::Io(_) => TransportDeviceErrorKind::Backend,
        _ => TransportDeviceErrorKind::Unknown,
    };
    TransportError::Device(TransportDeviceError::new(
        kind,
        format!("Serial port '{}': {}", port_name, err.description),
    ))
}

impl FrameTransport for SerialBus {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        trace!("TX [{}] {}", self.port_name, hex::encode(frame));
        self.port.write_all(frame)?;
        self.port.flush()?;
        Ok(())
    }

    fn receive_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        if timeout.is_zero() {
            return Err(TransportError::Timeout);
        }
        if timeout != self.read_timeout {
            self.port
                .set_timeout(timeout)
                .map_err(|e| map_serial_error(&self.port_name, e))?;
            self.read_timeout = timeout;
        }

        match self.port.read(buf) {
            Ok(0) => Err(TransportError::Timeout),
            Ok(n) => {
                trace!("RX [{}] {}", self.port_name, hex::encode(&buf[..n]));
                Ok(n)
            },
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Err(TransportError::Timeout)
            },
            Err(e) => {
                warn!("Serial read error on '{}': {}", self.port_name, e);
                Err(TransportError::Io(e))
            },
        }
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| map_serial_error(&self.port_name, e))
    }

    fn is_open(&self) -> bool {
        true
    }
}
