// devices/kasa/protocol.rs
use super::cipher;
use crate::error::ProtocolError;
use async_trait::async_trait;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

pub const DEFAULT_PORT: u16 = 9999;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// Sysinfo replies are a few KiB; anything near this is not a Kasa device.
const MAX_RESPONSE_LEN: usize = 64 * 1024;

/// One request/response exchange with a device.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, payload: &Value) -> Result<Value, ProtocolError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn request(&self, payload: &Value) -> Result<Value, ProtocolError> {
        (**self).request(payload).await
    }
}

/// Opens a fresh TCP connection per request. The whole exchange (connect,
/// write, read) shares a single deadline; on expiry the socket is dropped.
pub struct TcpTransport {
    address: String,
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(address: &str, default_port: u16, timeout: Duration) -> Self {
        Self {
            address: with_port(address, default_port),
            timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn exchange(&self, frame: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let mut stream =
            TcpStream::connect(&self.address)
                .await
                .map_err(|source| ProtocolError::Connect {
                    address: self.address.clone(),
                    source,
                })?;
        stream.write_all(frame).await?;

        let mut header = [0u8; 4];
        stream.read_exact(&mut header).await?;
        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_RESPONSE_LEN {
            return Err(ProtocolError::Parse(format!(
                "declared response length {} exceeds {}",
                len, MAX_RESPONSE_LEN
            )));
        }

        let mut data = Vec::with_capacity(len + 4);
        data.extend_from_slice(&header);
        data.resize(len + 4, 0);
        stream.read_exact(&mut data[4..]).await?;
        Ok(data)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn request(&self, payload: &Value) -> Result<Value, ProtocolError> {
        let body = serde_json::to_vec(payload)?;
        debug!(address = %self.address, bytes = body.len(), "Sending Kasa request");

        let raw = tokio::time::timeout(self.timeout, self.exchange(&cipher::frame(&body)))
            .await
            .map_err(|_| ProtocolError::Timeout(self.timeout))??;

        let plain = cipher::unframe(&raw);
        Ok(serde_json::from_slice(&plain)?)
    }
}

/// Appends the default port unless the address already carries one.
fn with_port(address: &str, default_port: u16) -> String {
    if address.parse::<SocketAddr>().is_ok() {
        return address.to_string();
    }
    if address.starts_with('[') && address.ends_with(']') {
        return format!("{}:{}", address, default_port);
    }
    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => {
            address.to_string()
        }
        _ if address.contains(':') => format!("[{}]:{}", address, default_port),
        _ => format!("{}:{}", address, default_port),
    }
}
