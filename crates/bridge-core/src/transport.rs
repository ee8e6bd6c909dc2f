//! Simulation transport layer
//!
//! The session loop talks to the simulation through [`SimTransport`]: one
//! text frame per JSON message. The production transport is a WebSocket;
//! [`ChannelTransport`] connects a session to in-process channels.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

/// A bidirectional stream of text frames
#[async_trait]
pub trait SimTransport: Send {
    /// Next text frame; `Ok(None)` once the peer has closed the connection
    async fn recv(&mut self) -> Result<Option<String>>;

    /// Send one text frame
    async fn send(&mut self, text: String) -> Result<()>;

    /// Close the connection; further sends fail
    async fn close(&mut self) -> Result<()>;
}

/// WebSocket transport to the simulation server
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

impl WebSocketTransport {
    /// Connect to a `ws://` or `wss://` endpoint
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, response) = tokio_tungstenite::connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;

        info!(url = %url, status = %response.status(), "Connected to simulation");
        Ok(Self {
            stream,
            closed: false,
        })
    }
}

#[async_trait]
impl SimTransport for WebSocketTransport {
    async fn recv(&mut self) -> Result<Option<String>> {
        if self.closed {
            return Ok(None);
        }

        while let Some(frame) = self.stream.next().await {
            match frame.context("WebSocket receive failed")? {
                Message::Text(text) => return Ok(Some(text)),
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => debug!("Ignoring non-UTF-8 binary frame"),
                },
                Message::Close(frame) => {
                    debug!(frame = ?frame, "Server closed connection");
                    self.closed = true;
                    return Ok(None);
                }
                // Pings are answered by tungstenite on the next read/write
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }

        self.closed = true;
        Ok(None)
    }

    async fn send(&mut self, text: String) -> Result<()> {
        if self.closed {
            anyhow::bail!("WebSocket is closed");
        }
        self.stream
            .send(Message::Text(text))
            .await
            .context("WebSocket send failed")
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .context("Failed to close WebSocket")
    }
}

/// In-process transport over unbounded channels
pub struct ChannelTransport {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

impl ChannelTransport {
    pub fn new(
        inbound: mpsc::UnboundedReceiver<String>,
        outbound: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            inbound,
            outbound: Some(outbound),
        }
    }

    /// A transport plus the simulation-side ends: a sender for frames the
    /// session will receive, and a receiver for frames the session sends.
    pub fn pair() -> (
        Self,
        mpsc::UnboundedSender<String>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (to_session, inbound) = mpsc::unbounded_channel();
        let (outbound, from_session) = mpsc::unbounded_channel();
        (Self::new(inbound, outbound), to_session, from_session)
    }
}

#[async_trait]
impl SimTransport for ChannelTransport {
    async fn recv(&mut self) -> Result<Option<String>> {
        Ok(self.inbound.recv().await)
    }

    async fn send(&mut self, text: String) -> Result<()> {
        self.outbound
            .as_ref()
            .context("Channel transport is closed")?
            .send(text)
            .map_err(|_| anyhow::anyhow!("Simulation side of the channel is gone"))
    }

    async fn close(&mut self) -> Result<()> {
        self.outbound = None;
        self.inbound.close();
        Ok(())
    }
}
