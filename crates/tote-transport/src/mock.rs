//! Mock 传输（无硬件依赖，用于测试）
//!
//! 两种 mock 都是可克隆的句柄：测试代码保留一份用于脚本化响应和检查发送记录，
//! 另一份交给被测对象。读取**不会真的等待**，没有脚本化数据时立即返回 `Timeout`。

use crate::{FrameTransport, LineTransport, TransportError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// 总线响应生成器：输入请求帧，输出响应字节（`None` 表示从站无应答）
pub type BusResponder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// 行响应生成器：输入请求行，输出应答行（`None` 表示无应答）
pub type LineResponder = Box<dyn FnMut(&str) -> Option<String> + Send>;

#[derive(Default)]
struct MockBusState {
    /// 按顺序消费的脚本化应答（优先于 responder）
    scripted: VecDeque<Option<Vec<u8>>>,
    responder: Option<BusResponder>,
    /// 当前可读字节
    rx: VecDeque<u8>,
    sent: Vec<Vec<u8>>,
    closed: bool,
    /// 单次读取最多返回的字节数（模拟分片到达）
    chunk_limit: Option<usize>,
}

/// Mock 字节总线
#[derive(Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<MockBusState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为下一次请求排队一个应答
    pub fn push_reply(&self, bytes: impl Into<Vec<u8>>) {
        self.state.lock().scripted.push_back(Some(bytes.into()));
    }

    /// 下一次请求不应答（读取将超时）
    pub fn push_silence(&self) {
        self.state.lock().scripted.push_back(None);
    }

    pub fn set_responder(&self, responder: impl FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static) {
        self.state.lock().responder = Some(Box::new(responder));
    }

    pub fn set_chunk_limit(&self, limit: usize) {
        self.state.lock().chunk_limit = Some(limit.max(1));
    }

    pub fn set_closed(&self, closed: bool) {
        self.state.lock().closed = closed;
    }

    /// 已发送的帧
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    /// 直接注入可读字节（模拟迟到的响应）
    pub fn inject_rx(&self, bytes: &[u8]) {
        self.state.lock().rx.extend(bytes.iter().copied());
    }
}

impl FrameTransport for MockBus {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::NotConnected);
        }
        state.sent.push(frame.to_vec());
        let reply = match state.scripted.pop_front() {
            Some(reply) => reply,
            None => state.responder.as_mut().and_then(|r| r(frame)),
        };
        if let Some(bytes) = reply {
            state.rx.extend(bytes);
        }
        Ok(())
    }

    fn receive_timeout(
        &mut self,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::NotConnected);
        }
        if state.rx.is_empty() {
            return Err(TransportError::Timeout);
        }
        let limit = state.chunk_limit.unwrap_or(usize::MAX).min(buf.len());
        let n = limit.min(state.rx.len());
        for slot in buf.iter_mut().take(n) {
            // n <= rx.len()
            *slot = state.rx.pop_front().unwrap_or_default();
        }
        Ok(n)
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        self.state.lock().rx.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.state.lock().closed
    }
}

/// 脚本化的行事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Line(String),
    Timeout,
    /// 对端断开（连接状态变为未连接）
    Disconnect,
}

#[derive(Default)]
struct MockLineState {
    connected: bool,
    /// 依次消费的连接结果（空时连接总是成功）
    connect_results: VecDeque<bool>,
    connect_attempts: usize,
    inbound: VecDeque<LineEvent>,
    /// 已经到达接收缓冲区的行（`discard_input()` 会清空）
    buffered: VecDeque<String>,
    discards: usize,
    responder: Option<LineResponder>,
    sent: Vec<String>,
}

/// Mock 行连接
#[derive(Clone, Default)]
pub struct MockLine {
    state: Arc<Mutex<MockLineState>>,
}

impl MockLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建已连接的 mock
    pub fn connected() -> Self {
        let line = Self::default();
        line.state.lock().connected = true;
        line
    }

    pub fn push_line(&self, line: impl Into<String>) {
        self.state.lock().inbound.push_back(LineEvent::Line(line.into()));
    }

    pub fn push_event(&self, event: LineEvent) {
        self.state.lock().inbound.push_back(event);
    }

    /// 放入一行已到达但未读取的数据（例如上一次超时后的迟到应答）
    pub fn inject_buffered(&self, line: impl Into<String>) {
        self.state.lock().buffered.push_back(line.into());
    }

    /// `discard_input()` 被调用的次数
    pub fn discards(&self) -> usize {
        self.state.lock().discards
    }

    /// 排队下一次 `connect()` 的结果
    pub fn push_connect_result(&self, ok: bool) {
        self.state.lock().connect_results.push_back(ok);
    }

    pub fn set_responder(&self, responder: impl FnMut(&str) -> Option<String> + Send + 'static) {
        self.state.lock().responder = Some(Box::new(responder));
    }

    /// 模拟对端立即断开
    pub fn drop_peer(&self) {
        self.state.lock().connected = false;
    }

    pub fn sent_lines(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().connect_attempts
    }
}

impl LineTransport for MockLine {
    fn connect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.connected {
            return Ok(());
        }
        state.connect_attempts += 1;
        if state.connect_results.pop_front().unwrap_or(true) {
            state.connected = true;
            Ok(())
        } else {
            Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "mock connection refused",
            )))
        }
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.sent.push(line.to_string());
        let request = line.trim_end();
        if let Some(reply) = state.responder.as_mut().and_then(|r| r(request)) {
            state.inbound.push_back(LineEvent::Line(reply));
        }
        Ok(())
    }

    fn receive_line(&mut self, _timeout: Duration) -> Result<String, TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if let Some(line) = state.buffered.pop_front() {
            return Ok(line);
        }
        match state.inbound.pop_front() {
            Some(LineEvent::Line(line)) => Ok(line),
            Some(LineEvent::Timeout) | None => Err(TransportError::Timeout),
            Some(LineEvent::Disconnect) => {
                state.connected = false;
                Err(TransportError::Closed)
            },
        }
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.discards += 1;
        state.buffered.clear();
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.buffered.clear();
    }
}
