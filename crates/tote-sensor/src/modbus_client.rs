//! Modbus RTU 寄存器/线圈客户端
//!
//! 主站轮询：每次操作发送一个请求帧，阻塞读取直到凑齐完整响应或超时（默认 1 秒）。
//! 总线没有"连接"概念，不做重连，超时即返回。
//!
//! 发送前清空接收缓冲区，防止上一次超时的迟到响应被当成本次的应答。

use crate::client::WeightSensorClient;
use crate::error::SensorError;
use crate::metrics::SensorMetrics;
use crate::sample::WeightSample;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tote_protocol::{
    COIL_CLEAR_TARE, COIL_TARE, COIL_WEIGHT_STABLE, COIL_ZERO, DEFAULT_SLAVE_ID, ModbusRequest,
    ModbusResponse, WEIGHT_REGISTER_COUNT, WeightRegister, WeightRegisters, decode_response,
};
use tote_transport::{FrameTransport, TransportError};
use tracing::{debug, trace, warn};

/// 默认事务超时
pub const MODBUS_TIMEOUT: Duration = Duration::from_secs(1);

/// 响应缓冲区大小（本协议最长响应 9 字节）
const RESPONSE_BUFFER_LEN: usize = 32;

/// Modbus RTU 称重客户端
///
/// # 示例
///
/// ```no_run
/// use tote_sensor::{ModbusScaleClient, WeightSensorClient};
/// use tote_transport::SerialBus;
///
/// let bus = SerialBus::open("/dev/ttyUSB0", 9600).unwrap();
/// let mut scale = ModbusScaleClient::new(bus, 1);
/// println!("gross = {}", scale.read_gross_weight_kg());
/// ```
pub struct ModbusScaleClient<T: FrameTransport> {
    bus: T,
    slave_id: u8,
    timeout: Duration,
    metrics: Arc<SensorMetrics>,
}

impl<T: FrameTransport> ModbusScaleClient<T> {
    pub fn new(bus: T, slave_id: u8) -> Self {
        Self {
            bus,
            slave_id,
            timeout: MODBUS_TIMEOUT,
            metrics: Arc::new(SensorMetrics::new()),
        }
    }

    /// 使用默认从站地址（1）
    pub fn with_default_slave(bus: T) -> Self {
        Self::new(bus, DEFAULT_SLAVE_ID)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SensorMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<SensorMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    /// 执行一次请求/响应事务
    fn transact(&mut self, request: ModbusRequest) -> Result<ModbusResponse, SensorError> {
        self.metrics.transactions.fetch_add(1, Ordering::Relaxed);
        if !self.bus.is_open() {
            return Err(SensorError::NotConnected);
        }
        if let Err(e) = self.bus.clear_input() {
            debug!("Failed to clear serial input buffer: {}", e);
        }

        let frame = request.encode(self.slave_id);
        self.bus.send(&frame)?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = [0u8; RESPONSE_BUFFER_LEN];
        let mut len = 0usize;
        loop {
            let needed = request.response_len_for(&buf[..len]).min(RESPONSE_BUFFER_LEN);
            if len >= needed {
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SensorError::Timeout);
            }
            match self.bus.receive_timeout(&mut buf[len..needed], remaining) {
                Ok(n) => len += n,
                Err(TransportError::Timeout) => {
                    trace!("Modbus {:?} timed out after {} bytes", request.function(), len);
                    return Err(SensorError::Timeout);
                },
                Err(e) => return Err(e.into()),
            }
        }

        Ok(decode_response(&request, self.slave_id, &buf[..len])?)
    }

    fn try_read_weight(&mut self, register: WeightRegister) -> Result<f64, SensorError> {
        let response = self.transact(ModbusRequest::ReadHoldingRegisters {
            address: register.low_address(),
            quantity: WEIGHT_REGISTER_COUNT,
        })?;
        match response {
            ModbusResponse::Registers(regs) => {
                let pair = WeightRegisters::from_slice(&regs)?;
                let kg = pair.to_kg();
                trace!(
                    "Modbus read {}: regs [{:04X}, {:04X}] = {:.2} kg",
                    register.name(),
                    pair.low,
                    pair.high,
                    kg
                );
                Ok(kg)
            },
            other => Err(SensorError::Malformed(format!(
                "unexpected response {:?}",
                other
            ))),
        }
    }

    fn read_weight(&mut self, register: WeightRegister) -> WeightSample {
        let sample = WeightSample::from(self.try_read_weight(register));
        match sample.failure() {
            None => {
                self.metrics.weight_reads_ok.fetch_add(1, Ordering::Relaxed);
            },
            Some(failure) => {
                self.metrics.record_failure(failure);
                warn!("Modbus {} weight read failed: {}", register.name(), failure);
            },
        }
        sample
    }

    fn write_coil(&mut self, address: u16) -> Result<(), SensorError> {
        match self.transact(ModbusRequest::WriteSingleCoil {
            address,
            value: true,
        }) {
            Ok(_) => Ok(()),
            Err(e) => {
                self.metrics.record_failure(e.failure());
                Err(e)
            },
        }
    }

    fn read_coil(&mut self, address: u16) -> Result<bool, SensorError> {
        let response = self.transact(ModbusRequest::ReadCoils {
            address,
            quantity: 1,
        });
        match response {
            Ok(ModbusResponse::Coils(coils)) => coils
                .first()
                .copied()
                .ok_or_else(|| SensorError::Malformed("empty coil response".into())),
            Ok(other) => Err(SensorError::Malformed(format!(
                "unexpected response {:?}",
                other
            ))),
            Err(e) => {
                self.metrics.record_failure(e.failure());
                Err(e)
            },
        }
    }
}

impl<T: FrameTransport> WeightSensorClient for ModbusScaleClient<T> {
    fn read_gross_weight_kg(&mut self) -> WeightSample {
        self.read_weight(WeightRegister::Gross)
    }

    fn read_net_weight_kg(&mut self) -> WeightSample {
        self.read_weight(WeightRegister::Net)
    }

    fn set_tare(&mut self) -> bool {
        match self.write_coil(COIL_TARE) {
            Ok(()) => {
                debug!("Modbus tare acknowledged");
                true
            },
            Err(e) => {
                warn!("Modbus tare command failed: {}", e);
                false
            },
        }
    }

    fn is_reachable(&self) -> bool {
        self.bus.is_open()
    }

    fn variant(&self) -> &'static str {
        "modbus-rtu"
    }

    fn read_tare_kg(&mut self) -> Result<f64, SensorError> {
        self.try_read_weight(WeightRegister::Tare)
    }

    fn set_zero(&mut self) -> Result<(), SensorError> {
        self.write_coil(COIL_ZERO)
    }

    fn clear_tare(&mut self) -> Result<(), SensorError> {
        self.write_coil(COIL_CLEAR_TARE)
    }

    fn is_weight_stable(&mut self) -> Result<bool, SensorError> {
        self.read_coil(COIL_WEIGHT_STABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleFailure;
    use tote_protocol::{RtuFrame, append_crc};
    use tote_transport::mock::MockBus;

    fn register_reply(slave: u8, kg: f64) -> Vec<u8> {
        let regs = WeightRegisters::from_kg(kg).unwrap();
        let mut frame = RtuFrame::from_slice(&[slave, 0x03, 0x04]);
        frame.extend_from_slice(&regs.low.to_be_bytes());
        frame.extend_from_slice(&regs.high.to_be_bytes());
        append_crc(&mut frame);
        frame.to_vec()
    }

    #[test]
    fn test_read_gross_weight() {
        let bus = MockBus::new();
        bus.push_reply(register_reply(1, 123.45));
        let mut client = ModbusScaleClient::new(bus.clone(), 1);

        assert_eq!(client.read_gross_weight_kg(), WeightSample::Kg(123.45));
        let sent = bus.sent_frames();
        assert_eq!(&sent[0][..6], &[0x01, 0x03, 0x00, 0x02, 0x00, 0x02]);
    }

    #[test]
    fn test_read_net_weight_uses_net_registers() {
        let bus = MockBus::new();
        bus.push_reply(register_reply(1, -2.5));
        let mut client = ModbusScaleClient::new(bus.clone(), 1);

        assert_eq!(client.read_net_weight_kg(), WeightSample::Kg(-2.5));
        assert_eq!(&bus.sent_frames()[0][2..4], &[0x00, 0x04]);
    }

    #[test]
    fn test_fragmented_response() {
        let bus = MockBus::new();
        bus.set_chunk_limit(3);
        bus.push_reply(register_reply(1, 7.0));
        let mut client = ModbusScaleClient::new(bus, 1);
        assert_eq!(client.read_gross_weight_kg(), WeightSample::Kg(7.0));
    }

    #[test]
    fn test_silence_is_timeout() {
        let bus = MockBus::new();
        bus.push_silence();
        let mut client = ModbusScaleClient::new(bus, 1);
        assert_eq!(
            client.read_gross_weight_kg(),
            WeightSample::Failed(SampleFailure::Timeout)
        );
        assert_eq!(client.metrics().snapshot().timeouts, 1);
    }

    #[test]
    fn test_truncated_response_is_timeout() {
        let bus = MockBus::new();
        let mut reply = register_reply(1, 7.0);
        reply.truncate(5);
        bus.push_reply(reply);
        let mut client = ModbusScaleClient::new(bus, 1);
        assert_eq!(
            client.read_gross_weight_kg(),
            WeightSample::Failed(SampleFailure::Timeout)
        );
    }

    #[test]
    fn test_corrupted_response_is_malformed() {
        let bus = MockBus::new();
        let mut reply = register_reply(1, 7.0);
        reply[4] ^= 0x01;
        bus.push_reply(reply);
        let mut client = ModbusScaleClient::new(bus, 1);
        assert_eq!(
            client.read_gross_weight_kg(),
            WeightSample::Failed(SampleFailure::Malformed)
        );
        assert_eq!(client.metrics().snapshot().malformed, 1);
    }

    #[test]
    fn test_stale_bytes_cleared_before_request() {
        let bus = MockBus::new();
        bus.inject_rx(&[0xDE, 0xAD]);
        bus.push_reply(register_reply(1, 1.0));
        let mut client = ModbusScaleClient::new(bus, 1);
        assert_eq!(client.read_gross_weight_kg(), WeightSample::Kg(1.0));
    }

    #[test]
    fn test_set_tare_writes_coil() {
        let bus = MockBus::new();
        bus.set_responder(|req| Some(req.to_vec()));
        let mut client = ModbusScaleClient::new(bus.clone(), 1);

        assert!(client.set_tare());
        assert_eq!(&bus.sent_frames()[0][..6], &[0x01, 0x05, 0x03, 0xEA, 0xFF, 0x00]);
    }

    #[test]
    fn test_set_tare_unacknowledged() {
        let bus = MockBus::new();
        bus.push_silence();
        let mut client = ModbusScaleClient::new(bus, 1);
        assert!(!client.set_tare());
    }

    #[test]
    fn test_exception_reply() {
        let bus = MockBus::new();
        let mut frame = RtuFrame::from_slice(&[0x01, 0x85, 0x02]);
        append_crc(&mut frame);
        bus.push_reply(frame.to_vec());
        let mut client = ModbusScaleClient::new(bus, 1);
        assert!(matches!(
            client.set_zero(),
            Err(SensorError::Protocol(tote_protocol::ProtocolError::Exception {
                function: 0x05,
                code: 0x02
            }))
        ));
    }

    #[test]
    fn test_weight_stable_coil() {
        let bus = MockBus::new();
        let mut frame = RtuFrame::from_slice(&[0x01, 0x01, 0x01, 0x01]);
        append_crc(&mut frame);
        bus.push_reply(frame.to_vec());
        let mut client = ModbusScaleClient::new(bus.clone(), 1);
        assert!(client.is_weight_stable().unwrap());
        assert_eq!(&bus.sent_frames()[0][..6], &[0x01, 0x01, 0x00, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_closed_bus_not_reachable() {
        let bus = MockBus::new();
        bus.set_closed(true);
        let mut client = ModbusScaleClient::new(bus, 1);
        assert!(!client.is_reachable());
        assert_eq!(
            client.read_gross_weight_kg(),
            WeightSample::Failed(SampleFailure::NotConnected)
        );
    }
}
