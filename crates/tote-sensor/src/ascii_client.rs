//! ASCII 行协议客户端（TCP）
//!
//! 请求 `.R<model>:<dim>\n`，应答中 `:` 与 `kg` 之间为数值。默认超时 2 秒。
//!
//! # 断线处理
//!
//! 每次调用最多**一次**"重连 + 重试"：第一次事务因连接失效失败时，
//! 断开、重新连接并再发一次；第二次仍失败则本次调用返回失败。
//! 超时和格式错误不会触发重试。
//!
//! 首次读取时如果尚未连接，同样走这一次重连机会（惰性连接）。
//!
//! # 应答对齐
//!
//! 协议没有请求序号。每次发送前先丢弃接收缓冲区中的残留数据；
//! 事务超时后，仪表的迟到应答可能随时到达，因此下一次事务前先重建连接。

use crate::client::WeightSensorClient;
use crate::error::SensorError;
use crate::metrics::SensorMetrics;
use crate::sample::WeightSample;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tote_protocol::{
    AsciiCommand, TARE_DIMENSION, TARE_MODEL_ID, WEIGHT_DIMENSION, WEIGHT_MODEL_ID,
    parse_weight_reply,
};
use tote_transport::LineTransport;
use tracing::{debug, trace, warn};

/// 默认事务超时
pub const ASCII_TIMEOUT: Duration = Duration::from_secs(2);

/// ASCII 协议参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsciiScaleConfig {
    pub weight_model_id: u16,
    pub weight_dimension: u16,
    pub tare_model_id: u16,
    pub tare_dimension: u16,
    /// 去皮写入的值
    pub tare_value: String,
    pub timeout: Duration,
}

impl Default for AsciiScaleConfig {
    fn default() -> Self {
        Self {
            weight_model_id: WEIGHT_MODEL_ID,
            weight_dimension: WEIGHT_DIMENSION,
            tare_model_id: TARE_MODEL_ID,
            tare_dimension: TARE_DIMENSION,
            tare_value: "1".to_string(),
            timeout: ASCII_TIMEOUT,
        }
    }
}

/// ASCII 称重客户端
pub struct AsciiScaleClient<L: LineTransport> {
    link: L,
    config: AsciiScaleConfig,
    metrics: Arc<SensorMetrics>,
    /// 上一次事务超时，连接上可能还有迟到的应答
    resync: bool,
}

impl<L: LineTransport> AsciiScaleClient<L> {
    pub fn new(link: L, config: AsciiScaleConfig) -> Self {
        Self {
            link,
            config,
            metrics: Arc::new(SensorMetrics::new()),
            resync: false,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SensorMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<SensorMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn config(&self) -> &AsciiScaleConfig {
        &self.config
    }

    /// 主动建立连接（可选，读取时也会惰性连接）
    pub fn connect(&mut self) -> Result<(), SensorError> {
        self.link.connect().map_err(SensorError::from)
    }

    /// 超时后重建连接，丢弃旧连接上的迟到应答
    fn resync_link(&mut self) -> Result<(), SensorError> {
        self.resync = false;
        if !self.link.is_connected() {
            return Ok(());
        }
        debug!("ASCII scale timed out earlier, reopening connection");
        self.metrics.reconnects.fetch_add(1, Ordering::Relaxed);
        self.link.disconnect();
        self.link.connect().map_err(|e| {
            warn!("ASCII scale reconnect failed: {}", e);
            SensorError::NotConnected
        })
    }

    fn exchange_once(&mut self, command: &AsciiCommand) -> Result<String, SensorError> {
        if self.resync {
            self.resync_link()?;
        }
        if !self.link.is_connected() {
            return Err(SensorError::NotConnected);
        }
        self.link.discard_input()?;
        self.link.send_line(&command.to_line())?;
        let reply = match self.link.receive_line(self.config.timeout) {
            Ok(reply) => reply,
            Err(e) => {
                let err = SensorError::from(e);
                if matches!(err, SensorError::Timeout) {
                    self.resync = true;
                }
                return Err(err);
            },
        };
        trace!("ASCII {} -> {:?}", command, reply);
        Ok(reply)
    }

    /// 一次事务；连接失效时重连并重试一次
    fn exchange(&mut self, command: &AsciiCommand) -> Result<String, SensorError> {
        self.metrics.transactions.fetch_add(1, Ordering::Relaxed);
        match self.exchange_once(command) {
            Err(SensorError::NotConnected) => {
                self.metrics.reconnects.fetch_add(1, Ordering::Relaxed);
                debug!("ASCII scale link down, reconnecting once");
                self.link.disconnect();
                if let Err(e) = self.link.connect() {
                    warn!("ASCII scale reconnect failed: {}", e);
                    return Err(SensorError::NotConnected);
                }
                self.exchange_once(command)
            },
            other => other,
        }
    }

    fn try_read_gross(&mut self) -> Result<f64, SensorError> {
        let command = AsciiCommand::read(self.config.weight_model_id, self.config.weight_dimension);
        let reply = self.exchange(&command)?;
        Ok(parse_weight_reply(&reply)?)
    }
}

impl<L: LineTransport> WeightSensorClient for AsciiScaleClient<L> {
    fn read_gross_weight_kg(&mut self) -> WeightSample {
        let sample = WeightSample::from(self.try_read_gross());
        match sample.failure() {
            None => {
                self.metrics.weight_reads_ok.fetch_add(1, Ordering::Relaxed);
            },
            Some(failure) => {
                self.metrics.record_failure(failure);
                warn!("ASCII weight read failed: {}", failure);
            },
        }
        sample
    }

    /// ASCII 协议没有净重概念，调用方需要自行做差
    fn read_net_weight_kg(&mut self) -> WeightSample {
        WeightSample::Failed(crate::sample::SampleFailure::Unsupported)
    }

    /// 写入去皮命令；收到任意应答行即视为确认
    fn set_tare(&mut self) -> bool {
        let command = AsciiCommand::write(
            self.config.tare_model_id,
            self.config.tare_dimension,
            self.config.tare_value.clone(),
        );
        match self.exchange(&command) {
            Ok(reply) => {
                debug!("ASCII tare acknowledged: {:?}", reply);
                true
            },
            Err(e) => {
                self.metrics.record_failure(e.failure());
                warn!("ASCII tare command failed: {}", e);
                false
            },
        }
    }

    fn is_reachable(&self) -> bool {
        self.link.is_connected()
    }

    fn variant(&self) -> &'static str {
        "ascii-tcp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleFailure;
    use tote_transport::mock::{LineEvent, MockLine};

    fn client(line: &MockLine) -> AsciiScaleClient<MockLine> {
        AsciiScaleClient::new(line.clone(), AsciiScaleConfig::default())
    }

    #[test]
    fn test_read_gross_weight() {
        let line = MockLine::connected();
        line.push_line(".D.85.2:-2.00kg");
        let mut scale = client(&line);

        assert_eq!(scale.read_gross_weight_kg(), WeightSample::Kg(-2.0));
        assert_eq!(line.sent_lines(), vec![".R85:2\n".to_string()]);
    }

    #[test]
    fn test_malformed_reply_not_zero() {
        let line = MockLine::connected();
        line.push_line(".D.85.2:kg");
        let mut scale = client(&line);
        assert_eq!(
            scale.read_gross_weight_kg(),
            WeightSample::Failed(SampleFailure::Malformed)
        );
    }

    #[test]
    fn test_timeout_does_not_retry() {
        let line = MockLine::connected();
        line.push_event(LineEvent::Timeout);
        line.push_line(".D.85.2:5.00kg");
        let mut scale = client(&line);

        assert_eq!(
            scale.read_gross_weight_kg(),
            WeightSample::Failed(SampleFailure::Timeout)
        );
        assert_eq!(line.sent_lines().len(), 1);
    }

    #[test]
    fn test_stale_line_discarded_before_request() {
        let line = MockLine::connected();
        line.inject_buffered(".D.85.2:1.00kg");
        line.push_line(".D.85.2:2.00kg");
        let mut scale = client(&line);

        assert_eq!(scale.read_gross_weight_kg(), WeightSample::Kg(2.0));
        assert_eq!(line.discards(), 1);
    }

    #[test]
    fn test_timeout_reopens_connection_before_next_read() {
        let line = MockLine::connected();
        line.push_event(LineEvent::Timeout);
        let mut scale = client(&line);

        assert_eq!(
            scale.read_gross_weight_kg(),
            WeightSample::Failed(SampleFailure::Timeout)
        );
        // 超时不影响可达性判断
        assert!(scale.is_reachable());

        // 迟到的应答到达旧连接，重连时被丢弃
        line.inject_buffered(".D.85.2:1.00kg");
        line.push_line(".D.85.2:2.00kg");
        assert_eq!(scale.read_gross_weight_kg(), WeightSample::Kg(2.0));
        assert_eq!(line.connect_attempts(), 1);
        assert_eq!(scale.metrics().snapshot().reconnects, 1);

        line.push_line(".D.85.2:3.00kg");
        assert_eq!(scale.read_gross_weight_kg(), WeightSample::Kg(3.0));
        assert_eq!(line.connect_attempts(), 1);
    }

    #[test]
    fn test_tare_not_acknowledged_by_stale_line() {
        let line = MockLine::connected();
        line.inject_buffered(".D.85.2:1.00kg");
        let mut scale = client(&line);
        assert!(!scale.set_tare());
    }

    #[test]
    fn test_single_reconnect_then_success() {
        let line = MockLine::connected();
        line.push_event(LineEvent::Disconnect);
        line.push_line(".D.85.2:3.25kg");
        let mut scale = client(&line);

        assert_eq!(scale.read_gross_weight_kg(), WeightSample::Kg(3.25));
        assert_eq!(line.connect_attempts(), 1);
        assert_eq!(line.sent_lines().len(), 2);
        assert_eq!(scale.metrics().snapshot().reconnects, 1);
    }

    #[test]
    fn test_second_disconnect_gives_up() {
        let line = MockLine::connected();
        line.push_event(LineEvent::Disconnect);
        line.push_event(LineEvent::Disconnect);
        line.push_line(".D.85.2:3.25kg");
        let mut scale = client(&line);

        assert_eq!(
            scale.read_gross_weight_kg(),
            WeightSample::Failed(SampleFailure::NotConnected)
        );
        assert_eq!(line.connect_attempts(), 1);
        assert_eq!(line.sent_lines().len(), 2);
    }

    #[test]
    fn test_lazy_connect_on_first_read() {
        let line = MockLine::new();
        line.push_line(".D.85.2:1.00kg");
        let mut scale = client(&line);
        assert!(!scale.is_reachable());

        assert_eq!(scale.read_gross_weight_kg(), WeightSample::Kg(1.0));
        assert!(scale.is_reachable());
    }

    #[test]
    fn test_reconnect_refused() {
        let line = MockLine::new();
        line.push_connect_result(false);
        let mut scale = client(&line);
        assert_eq!(
            scale.read_gross_weight_kg(),
            WeightSample::Failed(SampleFailure::NotConnected)
        );
        assert!(line.sent_lines().is_empty());
    }

    #[test]
    fn test_set_tare() {
        let line = MockLine::connected();
        line.set_responder(|req| (req == ".W113:1:1").then(|| "OK".to_string()));
        let mut scale = client(&line);
        assert!(scale.set_tare());
        assert_eq!(line.sent_lines(), vec![".W113:1:1\n".to_string()]);
    }

    #[test]
    fn test_set_tare_unacknowledged() {
        let line = MockLine::connected();
        let mut scale = client(&line);
        assert!(!scale.set_tare());
    }

    #[test]
    fn test_net_weight_unsupported() {
        let line = MockLine::connected();
        let mut scale = client(&line);
        assert_eq!(
            scale.read_net_weight_kg(),
            WeightSample::Failed(SampleFailure::Unsupported)
        );
        assert!(matches!(scale.set_zero(), Err(SensorError::Unsupported(_))));
    }
}
