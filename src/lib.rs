//! # peermesh
//!
//! A peer-to-peer connection orchestrator. Given a reliable, ordered,
//! text-message signaling channel shared by N participants, `peermesh`
//! establishes, multiplexes, and tears down direct peer-to-peer sessions
//! — media tracks plus a bidirectional data channel — between pairs of
//! participants, without a central relay.
//!
//! The crate's core is the signaling-protocol state machine: per-peer
//! negotiation (discovery → offer/answer → candidate exchange →
//! established → torn down), the wire protocol driving it, and the
//! bookkeeping that keeps local senders, channels, and received tracks
//! consistent with remote state under interleaved signaling traffic.
//!
//! The connection engine (ICE/DTLS/SRTP mechanics) and the signaling
//! transport are consumed through traits; default adapters over
//! webrtc-rs and tokio-tungstenite ship behind the `webrtc-engine` and
//! `ws-signaling` features (both on by default).
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use peermesh::{MeshConfig, MeshEvents, Orchestrator, WebRtcEngine, WebSocketTransport};
//!
//! struct App;
//!
//! #[async_trait::async_trait]
//! impl MeshEvents for App {
//!     async fn on_data_received(&self, peer_id: &str, payload: &str) {
//!         println!("{} says: {}", peer_id, payload);
//!     }
//! }
//!
//! let config = MeshConfig::new().with_local_id("alice");
//! let engine = Arc::new(WebRtcEngine::new(&config.ice_servers));
//! let mesh = Orchestrator::new(config, engine, Arc::new(WebSocketTransport::new()), Arc::new(App));
//!
//! mesh.connect("wss://signal.example.org/room/42", true, true).await?;
//! mesh.send_data("hello, mesh", None).await;
//! ```

pub mod config;
pub mod engine;
mod error;
pub mod events;
pub mod media;
pub mod orchestrator;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::{IceServer, MeshConfig};
pub use engine::{
    ConnectionFactory, ConnectivityState, DataChannelHandle, IceCandidate, LocalTrack, PeerHandle,
    RemoteTrack, SdpKind, SessionDescription, TrackKind, TrackSender,
};
pub use error::{Error, Result};
pub use events::{MeshEvents, NoopEvents};
pub use media::{LocalStream, MediaPipeline, RemoteStream};
pub use orchestrator::Orchestrator;
pub use protocol::{SignalKind, SignalMessage, BROADCAST};
pub use session::{NegotiationState, PeerSession, SessionTable};
pub use transport::{SignalingTransport, TransportEvent, TransportState};

#[cfg(feature = "webrtc-engine")]
pub use engine::webrtc::WebRtcEngine;

#[cfg(feature = "ws-signaling")]
pub use transport::websocket::WebSocketTransport;
