//! Common SCPI communication abstractions.
//!
//! This module provides reusable components for SCPI-based instruments,
//! keeping the command vocabulary of a driver separate from the transport it
//! happens to run over.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

/// Trait for SCPI communication transports.
///
/// Abstracts the underlying communication mechanism (raw TCP socket, serial,
/// VISA) to enable protocol-agnostic SCPI operations.
#[async_trait]
pub trait ScpiTransport: Send + Sync {
    /// Send a query command and return the response.
    async fn query(&self, command: &str) -> Result<String>;

    /// Send a command without expecting a response.
    async fn command(&self, command: &str) -> Result<()>;
}

/// SCPI transport over the instrument's raw LAN socket.
///
/// Commands and responses are newline-terminated. The Keithley 2701 exposes
/// this service on port 1394.
pub struct TcpScpiTransport {
    stream: Mutex<BufReader<TcpStream>>,
    timeout: Duration,
}

impl TcpScpiTransport {
    /// Open a socket to the instrument.
    ///
    /// The same timeout bounds the connection attempt and each query
    /// round-trip.
    pub async fn connect(address: &str, port: u16, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((address, port)))
            .await
            .map_err(|_| anyhow!("connection to {address}:{port} timed out"))?
            .with_context(|| format!("failed to connect to {address}:{port}"))?;
        stream.set_nodelay(true).ok();
        debug!(address, port, "SCPI socket opened");
        Ok(Self {
            stream: Mutex::new(BufReader::new(stream)),
            timeout,
        })
    }
}

#[async_trait]
impl ScpiTransport for TcpScpiTransport {
    async fn query(&self, command: &str) -> Result<String> {
        let mut guard = self.stream.lock().await;
        guard
            .get_mut()
            .write_all(format!("{command}\n").as_bytes())
            .await
            .with_context(|| format!("failed to send '{command}'"))?;

        let mut line = String::new();
        let read = tokio::time::timeout(self.timeout, guard.read_line(&mut line))
            .await
            .map_err(|_| anyhow!("timed out waiting for response to '{command}'"))?
            .with_context(|| format!("failed to read response to '{command}'"))?;
        if read == 0 {
            bail!("connection closed by instrument while waiting for '{command}'");
        }
        Ok(line.trim_end().to_string())
    }

    async fn command(&self, command: &str) -> Result<()> {
        let mut guard = self.stream.lock().await;
        guard
            .get_mut()
            .write_all(format!("{command}\n").as_bytes())
            .await
            .with_context(|| format!("failed to send '{command}'"))?;
        Ok(())
    }
}
