//! 遥测推送
//!
//! 后台线程把工位事件序列化为 JSON 行发送给中控服务器，并把服务器下发的
//! 命令（开始/停止/手动超控/扫码 ID）转发到控制线程的命令通道。
//!
//! - 连接建立后先发送 `identify`
//! - 每 `heartbeat_interval` 发送一次 `heartbeat`
//! - 断线后按 1 s 起步、翻倍、封顶 `max_reconnect_delay` 的间隔重连
//! - 离线期间的事件直接丢弃（计数），不做积压重放

use crate::config::TelemetryConfig;
use crate::events::{RemoteCommand, RemoteMessage, StationEvent, identify_message};
use crate::runner::StationCommand;
use crate::valves::Valve;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tote_transport::{LineTransport, TransportError};
use tracing::{debug, info, warn};

/// 身份声明中的客户端类型（服务器按此区分工位控制器）
pub const DEFAULT_CLIENT_TYPE: &str = "esp32";

/// 无数据时的休眠间隔
const IDLE_SLEEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub station: String,
    pub client_type: String,
    pub heartbeat_interval: Duration,
    pub initial_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    /// 每次等待入站消息的时长
    pub poll_timeout: Duration,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            station: "outbound".to_string(),
            client_type: DEFAULT_CLIENT_TYPE.to_string(),
            heartbeat_interval: Duration::from_secs(30),
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            poll_timeout: Duration::from_millis(50),
        }
    }
}

impl From<&TelemetryConfig> for TelemetrySettings {
    fn from(config: &TelemetryConfig) -> Self {
        Self {
            station: config.station.clone(),
            heartbeat_interval: Duration::from_secs(config.heartbeat_secs),
            max_reconnect_delay: Duration::from_secs(config.max_reconnect_delay_secs),
            ..Self::default()
        }
    }
}

/// 遥测计数器
#[derive(Debug, Default)]
pub struct TelemetryStats {
    pub sent: AtomicU64,
    pub discarded: AtomicU64,
    pub inbound: AtomicU64,
    pub connects: AtomicU64,
}

impl TelemetryStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    pub fn inbound(&self) -> u64 {
        self.inbound.load(Ordering::Relaxed)
    }

    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }
}

/// 入站消息对应的工位命令
pub fn remote_to_command(message: RemoteMessage) -> Option<StationCommand> {
    match message {
        RemoteMessage::Command { command } => Some(match command {
            RemoteCommand::Start => StationCommand::Start,
            RemoteCommand::Stop => StationCommand::Stop,
            RemoteCommand::ManualIce => StationCommand::Manual(Valve::Ice),
            RemoteCommand::ManualWater => StationCommand::Manual(Valve::Water),
        }),
        RemoteMessage::QrScanned { tote_id } => Some(StationCommand::SubmitId {
            id: tote_id,
            reply: None,
        }),
        RemoteMessage::Heartbeat => None,
    }
}

pub struct TelemetryWorker<L: LineTransport> {
    link: L,
    settings: TelemetrySettings,
    events: Receiver<StationEvent>,
    commands: Option<Sender<StationCommand>>,
    reconnect_delay: Duration,
    next_attempt: Option<Instant>,
    last_heartbeat: Option<Instant>,
    stats: Arc<TelemetryStats>,
}

impl<L: LineTransport> TelemetryWorker<L> {
    pub fn new(link: L, settings: TelemetrySettings, events: Receiver<StationEvent>) -> Self {
        let reconnect_delay = settings.initial_reconnect_delay;
        Self {
            link,
            settings,
            events,
            commands: None,
            reconnect_delay,
            next_attempt: None,
            last_heartbeat: None,
            stats: Arc::new(TelemetryStats::default()),
        }
    }

    /// 入站命令的转发目标
    pub fn with_commands(mut self, commands: Sender<StationCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn stats(&self) -> Arc<TelemetryStats> {
        Arc::clone(&self.stats)
    }

    /// 执行一轮收发；返回 `true` 表示本轮有数据往来
    pub fn step(&mut self, now: Instant) -> bool {
        if !self.link.is_connected() && !self.try_connect(now) {
            return false;
        }

        let mut busy = false;
        while let Ok(event) = self.events.try_recv() {
            busy = true;
            if !self.send_event(&event, now) {
                return busy;
            }
        }

        match self.last_heartbeat {
            None => self.last_heartbeat = Some(now),
            Some(at) if now.duration_since(at) >= self.settings.heartbeat_interval => {
                self.last_heartbeat = Some(now);
                if !self.send_event(&StationEvent::Heartbeat, now) {
                    return busy;
                }
            },
            Some(_) => {},
        }

        match self.link.receive_line(self.settings.poll_timeout) {
            Ok(line) => {
                self.handle_inbound(&line);
                true
            },
            Err(TransportError::Timeout) => busy,
            Err(e) => {
                self.link_lost(now, &e);
                busy
            },
        }
    }

    fn try_connect(&mut self, now: Instant) -> bool {
        self.discard_backlog();
        if self.next_attempt.is_some_and(|at| now < at) {
            return false;
        }
        match self.link.connect() {
            Ok(()) => {
                info!("Telemetry connected");
                self.stats.connects.fetch_add(1, Ordering::Relaxed);
                self.reconnect_delay = self.settings.initial_reconnect_delay;
                self.next_attempt = None;
                self.last_heartbeat = Some(now);
                let identify = identify_message(&self.settings.client_type);
                self.send_line(&identify, now)
            },
            Err(e) => {
                warn!(
                    "Telemetry connect failed: {} (retry in {:?})",
                    e, self.reconnect_delay
                );
                self.schedule_reconnect(now);
                false
            },
        }
    }

    fn schedule_reconnect(&mut self, now: Instant) {
        self.next_attempt = Some(now + self.reconnect_delay);
        self.reconnect_delay = (self.reconnect_delay * 2).min(self.settings.max_reconnect_delay);
    }

    fn link_lost(&mut self, now: Instant, err: &TransportError) {
        warn!("Telemetry link lost: {}", err);
        self.link.disconnect();
        self.schedule_reconnect(now);
    }

    fn discard_backlog(&mut self) {
        let discarded = self.events.try_iter().count() as u64;
        if discarded > 0 {
            debug!("Telemetry offline, discarded {} events", discarded);
            self.stats
                .discarded
                .fetch_add(discarded, Ordering::Relaxed);
        }
    }

    fn send_event(&mut self, event: &StationEvent, now: Instant) -> bool {
        match event.to_json(&self.settings.station) {
            Ok(json) => self.send_line(&json, now),
            Err(e) => {
                warn!("Failed to serialize {:?}: {}", event, e);
                true
            },
        }
    }

    /// 发送一行；返回 `false` 表示连接已失效
    fn send_line(&mut self, json: &str, now: Instant) -> bool {
        let mut line = String::with_capacity(json.len() + 1);
        line.push_str(json);
        line.push('\n');
        match self.link.send_line(&line) {
            Ok(()) => {
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
                true
            },
            Err(e) if e.is_disconnect() => {
                self.stats.discarded.fetch_add(1, Ordering::Relaxed);
                self.link_lost(now, &e);
                false
            },
            Err(e) => {
                warn!("Telemetry send failed: {}", e);
                self.stats.discarded.fetch_add(1, Ordering::Relaxed);
                true
            },
        }
    }

    fn handle_inbound(&mut self, line: &str) {
        self.stats.inbound.fetch_add(1, Ordering::Relaxed);
        let message = match RemoteMessage::parse(line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring telemetry message {:?}: {}", line, e);
                return;
            },
        };
        debug!("Telemetry inbound: {:?}", message);
        let Some(command) = remote_to_command(message) else {
            return;
        };
        match &self.commands {
            Some(tx) => {
                if tx.send(command).is_err() {
                    warn!("Station command channel closed, dropping remote command");
                }
            },
            None => debug!("No command target, dropping {:?}", command),
        }
    }

    /// 在后台线程中运行
    pub fn spawn(mut self) -> std::io::Result<TelemetryHandle>
    where
        L: 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let stats = self.stats();
        let handle = thread::Builder::new()
            .name("tote-telemetry".to_string())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    if !self.step(Instant::now()) {
                        thread::sleep(IDLE_SLEEP);
                    }
                }
                self.link.disconnect();
                info!("Telemetry stopped");
            })?;
        Ok(TelemetryHandle {
            handle: Some(handle),
            shutdown,
            stats,
        })
    }
}

/// 遥测线程句柄；drop 时停止线程
pub struct TelemetryHandle {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<TelemetryStats>,
}

impl TelemetryHandle {
    pub fn stats(&self) -> Arc<TelemetryStats> {
        Arc::clone(&self.stats)
    }

    /// 设置关闭标志并等待线程结束
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TelemetryHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToteFillState;
    use crossbeam_channel::{bounded, unbounded};
    use serde_json::Value;
    use tote_transport::mock::{LineEvent, MockLine};

    fn parse(line: &str) -> Value {
        assert!(line.ends_with('\n'), "missing newline: {:?}", line);
        serde_json::from_str(line.trim_end()).unwrap()
    }

    #[test]
    fn test_identify_then_events() {
        let link = MockLine::new();
        let (tx, rx) = bounded(8);
        let mut worker = TelemetryWorker::new(link.clone(), TelemetrySettings::default(), rx);

        let t0 = Instant::now();
        worker.step(t0);
        assert!(link.is_connected());
        tx.send(StationEvent::StateChange {
            state: ToteFillState::DispensingIce,
        })
        .unwrap();
        assert!(worker.step(t0));

        let sent = link.sent_lines();
        assert_eq!(sent.len(), 2);
        let identify = parse(&sent[0]);
        assert_eq!(identify["type"], "identify");
        assert_eq!(identify["clientType"], "esp32");
        let event = parse(&sent[1]);
        assert_eq!(event["type"], "state_change");
        assert_eq!(event["state"], "DISPENSING_ICE");
        assert_eq!(event["station"], "outbound");
        assert_eq!(worker.stats().connects(), 1);
    }

    #[test]
    fn test_reconnect_backoff_doubles_and_caps() {
        let link = MockLine::new();
        for _ in 0..8 {
            link.push_connect_result(false);
        }
        let (_tx, rx) = bounded(8);
        let settings = TelemetrySettings {
            max_reconnect_delay: Duration::from_secs(4),
            ..TelemetrySettings::default()
        };
        let mut worker = TelemetryWorker::new(link.clone(), settings, rx);

        let t0 = Instant::now();
        worker.step(t0);
        assert_eq!(link.connect_attempts(), 1);

        // 1 s 内不重试
        worker.step(t0 + Duration::from_millis(900));
        assert_eq!(link.connect_attempts(), 1);

        // 1 s, 2 s, 4 s, 4 s
        let mut at = t0;
        for (delay, attempts) in [(1, 2), (2, 3), (4, 4), (4, 5)] {
            at += Duration::from_secs(delay);
            worker.step(at - Duration::from_millis(1));
            assert_eq!(link.connect_attempts(), attempts - 1);
            worker.step(at);
            assert_eq!(link.connect_attempts(), attempts);
        }
    }

    #[test]
    fn test_inbound_commands_forwarded() {
        let link = MockLine::connected();
        link.push_line(r#"{"type":"command","command":"start"}"#);
        link.push_line(r#"{"type":"qr_scanned","toteId":"T-5"}"#);
        link.push_line(r#"{"type":"command","command":"manual_water"}"#);
        link.push_line("garbage");
        link.push_line(r#"{"type":"heartbeat"}"#);
        let (_tx, rx) = bounded(8);
        let (cmd_tx, cmd_rx) = unbounded();
        let mut worker = TelemetryWorker::new(link, TelemetrySettings::default(), rx)
            .with_commands(cmd_tx);

        let t0 = Instant::now();
        for _ in 0..5 {
            assert!(worker.step(t0));
        }
        let commands: Vec<StationCommand> = cmd_rx.try_iter().collect();
        assert_eq!(commands.len(), 3);
        assert!(matches!(commands[0], StationCommand::Start));
        assert!(matches!(
            &commands[1],
            StationCommand::SubmitId { id, reply: None } if id == "T-5"
        ));
        assert!(matches!(commands[2], StationCommand::Manual(Valve::Water)));
        assert_eq!(worker.stats().inbound(), 5);
    }

    #[test]
    fn test_heartbeat_interval() {
        let link = MockLine::connected();
        let (_tx, rx) = bounded(8);
        let mut worker = TelemetryWorker::new(link.clone(), TelemetrySettings::default(), rx);

        let t0 = Instant::now();
        worker.step(t0);
        worker.step(t0 + Duration::from_secs(29));
        assert!(link.sent_lines().is_empty());
        worker.step(t0 + Duration::from_secs(30));
        let sent = link.sent_lines();
        assert_eq!(sent.len(), 1);
        assert_eq!(parse(&sent[0])["type"], "heartbeat");
    }

    #[test]
    fn test_disconnect_discards_and_reconnects() {
        let link = MockLine::connected();
        link.push_event(LineEvent::Disconnect);
        let (tx, rx) = bounded(8);
        let mut worker = TelemetryWorker::new(link.clone(), TelemetrySettings::default(), rx);

        let t0 = Instant::now();
        worker.step(t0);
        assert!(!link.is_connected());

        tx.send(StationEvent::WeightUpdate { weight: 1.0 }).unwrap();
        tx.send(StationEvent::WeightUpdate { weight: 2.0 }).unwrap();
        worker.step(t0 + Duration::from_millis(500));
        assert_eq!(worker.stats().discarded(), 2);
        assert_eq!(link.connect_attempts(), 0);

        worker.step(t0 + Duration::from_secs(1));
        assert!(link.is_connected());
        assert_eq!(link.connect_attempts(), 1);
        assert_eq!(parse(&link.sent_lines()[0])["type"], "identify");
    }

    #[test]
    fn test_spawned_worker_stops_on_shutdown() {
        let link = MockLine::connected();
        let (tx, rx) = bounded(8);
        let handle = TelemetryWorker::new(link.clone(), TelemetrySettings::default(), rx)
            .spawn()
            .unwrap();
        tx.send(StationEvent::error("scale offline")).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while handle.stats().sent() == 0 {
            assert!(Instant::now() < deadline, "event never sent");
            thread::sleep(Duration::from_millis(5));
        }
        handle.shutdown();
        assert!(!link.is_connected());
        assert_eq!(parse(&link.sent_lines()[0])["message"], "scale offline");
    }
}
