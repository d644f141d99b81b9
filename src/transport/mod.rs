//! Signaling transport abstraction
//!
//! The orchestrator consumes the reliable, ordered text channel through
//! [`SignalingTransport`]; delivery happens over an event channel so the
//! orchestrator can `select!`-free loop on a single receiver. The default
//! WebSocket implementation lives in [`websocket`] (feature
//! `ws-signaling`).

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;

#[cfg(feature = "ws-signaling")]
pub mod websocket;

#[cfg(feature = "ws-signaling")]
pub use self::websocket::WebSocketTransport;

/// Events the transport delivers to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel is open; signaling may be sent
    Opened,
    /// One inbound text frame
    Message(String),
    /// The channel closed normally
    Closed,
    /// The channel failed
    Error(String),
}

/// Connection state reported outward through the event surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Signaling channel is open
    Open,
    /// Signaling channel closed
    Closed,
    /// Signaling channel failed
    Error,
}

/// A reliable, ordered, text-frame signaling channel
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Open the channel to `endpoint`.
    ///
    /// Returns the event receiver; an [`TransportEvent::Opened`] event is
    /// delivered once the channel is usable. Calling `open` on an
    /// already-open transport is an error.
    async fn open(&self, endpoint: &str) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Send one text frame
    async fn send(&self, text: &str) -> Result<()>;

    /// Close the channel
    async fn close(&self) -> Result<()>;
}
