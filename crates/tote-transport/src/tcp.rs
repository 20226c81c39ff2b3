//! TCP 行连接
//!
//! 基于 `std::net::TcpStream` 的阻塞实现，所有读写都带超时：
//! - 连接：`connect_timeout`
//! - 读取：每次 `receive_line` 按剩余时间设置 `read_timeout`
//!
//! 对端关闭或连接被重置时，内部流被丢弃，后续调用返回 `NotConnected`，
//! 由上层决定何时 `connect()` 重连。

use crate::{LineTransport, TransportDeviceError, TransportDeviceErrorKind, TransportError};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// 单行最大长度（超过视为对端异常）
const MAX_LINE_LEN: usize = 4096;

/// TCP 行客户端
#[derive(Debug)]
pub struct TcpLineClient {
    address: String,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
    /// 已收到但尚未组成完整行的字节
    pending: Vec<u8>,
}

impl TcpLineClient {
    /// 创建客户端（不立即连接）
    ///
    /// # 示例
    ///
    /// ```no_run
    /// use tote_transport::{LineTransport, TcpLineClient};
    /// use std::time::Duration;
    ///
    /// let mut client = TcpLineClient::new("192.168.1.50:4001", Duration::from_secs(2));
    /// client.connect().unwrap();
    /// client.send_line(".R85:2\n").unwrap();
    /// let reply = client.receive_line(Duration::from_secs(2)).unwrap();
    /// ```
    pub fn new(address: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
            stream: None,
            pending: Vec::new(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn resolve(&self) -> Result<SocketAddr, TransportError> {
        self.address
            .to_socket_addrs()
            .map_err(|e| {
                TransportDeviceError::new(
                    TransportDeviceErrorKind::InvalidAddress,
                    format!("Cannot resolve '{}': {}", self.address, e),
                )
            })?
            .next()
            .ok_or_else(|| {
                TransportDeviceError::new(
                    TransportDeviceErrorKind::InvalidAddress,
                    format!("No address for '{}'", self.address),
                )
                .into()
            })
    }

    fn drop_connection(&mut self, reason: &str) {
        if self.stream.take().is_some() {
            debug!("TCP connection to {} dropped: {}", self.address, reason);
        }
        self.pending.clear();
    }

    /// 从缓冲区取出一行（不含行尾）
    fn take_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&line);
        Some(text.trim_end_matches(['\r', '\n']).to_string())
    }
}

fn is_disconnect_kind(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}

impl LineTransport for TcpLineClient {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let addr = self.resolve()?;
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(self.connect_timeout))?;
        debug!("TCP connected to {} ({})", self.address, addr);
        self.pending.clear();
        self.stream = Some(stream);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        trace!("TX [{}] {:?}", self.address, line);
        let result = stream.write_all(line.as_bytes()).and_then(|_| stream.flush());
        match result {
            Ok(()) => Ok(()),
            Err(e) if is_disconnect_kind(e.kind()) => {
                self.drop_connection("write failed");
                Err(TransportError::Closed)
            },
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn receive_line(&mut self, timeout: Duration) -> Result<String, TransportError> {
        if let Some(line) = self.take_line() {
            return Ok(line);
        }
        if self.stream.is_none() {
            return Err(TransportError::NotConnected);
        }

        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 256];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout);
            }
            let Some(stream) = self.stream.as_mut() else {
                return Err(TransportError::NotConnected);
            };
            stream.set_read_timeout(Some(remaining))?;

            match stream.read(&mut chunk) {
                Ok(0) => {
                    self.drop_connection("closed by peer");
                    return Err(TransportError::Closed);
                },
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    if let Some(line) = self.take_line() {
                        trace!("RX [{}] {:?}", self.address, line);
                        return Ok(line);
                    }
                    if self.pending.len() > MAX_LINE_LEN {
                        warn!(
                            "Line from {} exceeds {} bytes, dropping connection",
                            self.address, MAX_LINE_LEN
                        );
                        self.drop_connection("line too long");
                        return Err(TransportError::Closed);
                    }
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    return Err(TransportError::Timeout);
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if is_disconnect_kind(e.kind()) => {
                    self.drop_connection("connection reset");
                    return Err(TransportError::Closed);
                },
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        let mut discarded = self.pending.len();
        self.pending.clear();
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotConnected);
        };

        stream.set_nonblocking(true)?;
        let mut chunk = [0u8; 256];
        let result = loop {
            match stream.read(&mut chunk) {
                Ok(0) => break Err(TransportError::Closed),
                Ok(n) => discarded += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if is_disconnect_kind(e.kind()) => break Err(TransportError::Closed),
                Err(e) => break Err(TransportError::Io(e)),
            }
        };
        let restored = stream.set_nonblocking(false);

        if discarded > 0 {
            debug!("Discarded {} stale bytes from {}", discarded, self.address);
        }
        match result {
            Err(TransportError::Closed) => {
                self.drop_connection("closed by peer");
                Err(TransportError::Closed)
            },
            Err(e) => Err(e),
            Ok(()) => restored.map_err(TransportError::from),
        }
    }

    fn disconnect(&mut self) {
        self.drop_connection("disconnect requested");
    }
}
