//! 工位事件与外部消息
//!
//! 出站事件按 JSON 发送，`type` 字段区分类型，并附带工位名 `station`：
//!
//! ```json
//! {"type":"state_change","state":"DISPENSING_ICE","station":"outbound"}
//! {"type":"weight_update","weight":12.34,"station":"outbound"}
//! ```
//!
//! 入站消息（`command` / `qr_scanned` / `heartbeat`）解析为 [`RemoteMessage`]。

use crate::types::ToteFillState;
use crossbeam_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// 出站事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StationEvent {
    StateChange {
        state: ToteFillState,
    },
    WeightUpdate {
        weight: f64,
    },
    IceDispensed {
        ice_kg: f64,
    },
    WaterDispensed {
        water_kg: f64,
    },
    ToteValidated {
        #[serde(rename = "toteId")]
        tote_id: String,
    },
    ToteCompleted {
        #[serde(rename = "toteId")]
        tote_id: String,
    },
    Error {
        message: String,
    },
    /// WAITING_ID 期间的周期状态
    Status {
        state: ToteFillState,
        fish_kg: f64,
        ice_kg: f64,
        water_kg: f64,
    },
    Heartbeat,
}

impl StationEvent {
    pub fn error(message: impl Into<String>) -> Self {
        StationEvent::Error {
            message: message.into(),
        }
    }

    /// 带工位名的 JSON 文本
    pub fn to_json(&self, station: &str) -> Result<String, serde_json::Error> {
        serde_json::to_string(&Envelope {
            event: self,
            station,
        })
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(flatten)]
    event: &'a StationEvent,
    station: &'a str,
}

/// 连接建立后的身份声明（不带工位名）
pub fn identify_message(client_type: &str) -> String {
    serde_json::json!({ "type": "identify", "clientType": client_type }).to_string()
}

/// 远程命令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteCommand {
    Start,
    Stop,
    ManualIce,
    ManualWater,
}

/// 入站消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteMessage {
    Command {
        command: RemoteCommand,
    },
    QrScanned {
        #[serde(rename = "toteId")]
        tote_id: String,
    },
    Heartbeat,
}

impl RemoteMessage {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

/// 事件接收端
///
/// 在控制线程上调用，实现不得阻塞。
pub trait EventSink: Send {
    fn emit(&self, event: StationEvent);
}

impl<T: EventSink + ?Sized> EventSink for Box<T> {
    fn emit(&self, event: StationEvent) {
        (**self).emit(event)
    }
}

/// 丢弃所有事件
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: StationEvent) {}
}

/// 以日志形式输出事件（重量更新降为 debug）
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: StationEvent) {
        match &event {
            StationEvent::WeightUpdate { weight } => tracing::debug!("weight {:.2} kg", weight),
            StationEvent::Error { message } => warn!("event: error: {}", message),
            other => info!("event: {:?}", other),
        }
    }
}

/// 有界通道发送（满时丢弃并计数）
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<StationEvent>,
    dropped: Arc<AtomicU64>,
}

impl ChannelSink {
    pub fn new(tx: Sender<StationEvent>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: StationEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    warn!("Event channel full, {} events dropped so far", dropped);
                }
            },
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            },
        }
    }
}

/// 广播到多个接收端
#[derive(Default)]
pub struct FanOutSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl FanOutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl EventSink for FanOutSink {
    fn emit(&self, event: StationEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}

/// 记录所有事件（测试与状态检查）
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<StationEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StationEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<StationEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// 按顺序返回所有状态变化
    pub fn states(&self) -> Vec<ToteFillState> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                StationEvent::StateChange { state } => Some(*state),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                StationEvent::Error { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: StationEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use serde_json::Value;

    #[test]
    fn test_outbound_wire_format() {
        let json = StationEvent::StateChange {
            state: ToteFillState::WaitingId,
        }
        .to_json("outbound")
        .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "state_change");
        assert_eq!(value["state"], "WAITING_ID");
        assert_eq!(value["station"], "outbound");

        let json = StationEvent::ToteCompleted {
            tote_id: "T-9".into(),
        }
        .to_json("outbound")
        .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "tote_completed");
        assert_eq!(value["toteId"], "T-9");

        let value: Value =
            serde_json::from_str(&StationEvent::Heartbeat.to_json("outbound").unwrap()).unwrap();
        assert_eq!(value["type"], "heartbeat");
    }

    #[test]
    fn test_identify() {
        let value: Value = serde_json::from_str(&identify_message("esp32")).unwrap();
        assert_eq!(value["type"], "identify");
        assert_eq!(value["clientType"], "esp32");
        assert!(value.get("station").is_none());
    }

    #[test]
    fn test_inbound_parse() {
        assert_eq!(
            RemoteMessage::parse(r#"{"type":"command","command":"manual_ice"}"#).unwrap(),
            RemoteMessage::Command {
                command: RemoteCommand::ManualIce
            }
        );
        assert_eq!(
            RemoteMessage::parse(r#"{"type":"qr_scanned","toteId":"T-1","station":"outbound"}"#)
                .unwrap(),
            RemoteMessage::QrScanned {
                tote_id: "T-1".into()
            }
        );
        assert_eq!(
            RemoteMessage::parse("{\"type\":\"heartbeat\"}\r\n").unwrap(),
            RemoteMessage::Heartbeat
        );
        assert!(RemoteMessage::parse(r#"{"type":"command","command":"explode"}"#).is_err());
        assert!(RemoteMessage::parse("not json").is_err());
    }

    #[test]
    fn test_channel_sink_counts_drops() {
        let (tx, rx) = bounded(1);
        let sink = ChannelSink::new(tx);
        sink.emit(StationEvent::Heartbeat);
        sink.emit(StationEvent::Heartbeat);
        assert_eq!(sink.dropped(), 1);
        assert_eq!(rx.try_recv().unwrap(), StationEvent::Heartbeat);
    }

    #[test]
    fn test_fan_out() {
        let a = RecordingSink::new();
        let b = RecordingSink::new();
        let sink = FanOutSink::new().with(a.clone()).with(b.clone());
        sink.emit(StationEvent::error("x"));
        assert_eq!(a.errors(), vec!["x".to_string()]);
        assert_eq!(b.errors(), vec!["x".to_string()]);
    }
}
