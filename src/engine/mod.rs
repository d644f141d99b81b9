//! Connection-engine abstraction
//!
//! The orchestrator negotiates against these traits instead of a concrete
//! WebRTC stack: an engine supplies "create offer / create answer / set
//! descriptions / add candidate" plus event hooks for candidates,
//! connectivity, inbound channels, inbound tracks, and renegotiation.
//! The default implementation over webrtc-rs lives in [`webrtc`]
//! (feature `webrtc-engine`); tests drive the orchestrator with a
//! scripted engine instead.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

#[cfg(feature = "webrtc-engine")]
#[allow(clippy::module_inception)]
pub mod webrtc;

#[cfg(feature = "webrtc-engine")]
pub use self::webrtc::{WebRtcEngine, WebRtcLocalTrack};

/// Boxed future returned by event handlers
pub type EventFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Handler for locally-gathered ICE candidates; `None` signals the end of
/// gathering
pub type CandidateHandler = Box<dyn Fn(Option<IceCandidate>) -> EventFuture + Send + Sync>;

/// Handler for connectivity-state transitions
pub type ConnectivityHandler = Box<dyn Fn(ConnectivityState) -> EventFuture + Send + Sync>;

/// Handler for data channels opened by the remote side
pub type ChannelHandler = Box<dyn Fn(Arc<dyn DataChannelHandle>) -> EventFuture + Send + Sync>;

/// Handler for inbound remote media tracks
pub type RemoteTrackHandler = Box<dyn Fn(Arc<dyn RemoteTrack>) -> EventFuture + Send + Sync>;

/// Handler for the engine's renegotiation-needed signal
pub type NegotiationHandler = Box<dyn Fn() -> EventFuture + Send + Sync>;

/// Handler for data-channel open transitions
pub type ChannelOpenHandler = Box<dyn Fn() -> EventFuture + Send + Sync>;

/// Handler for inbound data-channel text messages
pub type ChannelMessageHandler = Box<dyn Fn(String) -> EventFuture + Send + Sync>;

/// Which half of the offer/answer exchange a description belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    /// Initiating description
    Offer,
    /// Responding description
    Answer,
}

/// A session description exchanged during negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    /// Offer or answer
    pub kind: SdpKind,
    /// Serialized SDP text
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A proposed network path for a peer connection, exchanged via signaling.
///
/// Serializes to JSON for the CANDIDATE payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate attribute line
    pub candidate: String,
    /// Media stream identification tag
    #[serde(default)]
    pub sdp_mid: Option<String>,
    /// Index of the media description the candidate belongs to
    #[serde(default)]
    pub sdp_mline_index: Option<u16>,
}

/// Connectivity state of an engine handle, as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    /// Freshly created
    New,
    /// Negotiation/checks in progress
    Connecting,
    /// A direct path is established
    Connected,
    /// The path was lost; may recover or fail
    Disconnected,
    /// The path failed terminally
    Failed,
    /// The handle was closed
    Closed,
}

impl ConnectivityState {
    /// True for the states that terminate a peer session
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectivityState::Disconnected | ConnectivityState::Failed | ConnectivityState::Closed
        )
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectivityState::New => "new",
            ConnectivityState::Connecting => "connecting",
            ConnectivityState::Connected => "connected",
            ConnectivityState::Disconnected => "disconnected",
            ConnectivityState::Failed => "failed",
            ConnectivityState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Media track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

/// A locally-captured media track the host hands to the orchestrator.
///
/// Capture itself is out of scope; the orchestrator only attaches and
/// detaches these handles.
pub trait LocalTrack: Send + Sync {
    /// Track identifier
    fn id(&self) -> &str;

    /// Audio or video
    fn kind(&self) -> TrackKind;

    /// Stop capture; called when the local stream is released
    fn stop(&self);

    /// Downcast support for engine adapters
    fn as_any(&self) -> &dyn Any;
}

/// A media track received from a remote peer
pub trait RemoteTrack: Send + Sync {
    /// Track identifier
    fn id(&self) -> &str;

    /// Audio or video
    fn kind(&self) -> TrackKind;

    /// Downcast support for hosts that need the engine's native track
    fn as_any(&self) -> &dyn Any;
}

/// Handle to an outbound media sender created by [`PeerHandle::add_track`]
pub trait TrackSender: Send + Sync {
    /// Kind of the track this sender carries
    fn kind(&self) -> TrackKind;

    /// Downcast support for engine adapters
    fn as_any(&self) -> &dyn Any;
}

/// A bidirectional, ordered byte stream riding on a peer connection
#[async_trait]
pub trait DataChannelHandle: Send + Sync {
    /// Channel label
    fn label(&self) -> &str;

    /// True once the channel reached the open state
    fn is_open(&self) -> bool;

    /// Send a text payload; fails when the channel is not open
    async fn send_text(&self, payload: &str) -> Result<()>;

    /// Close the channel
    async fn close(&self) -> Result<()>;

    /// Register the open handler
    fn on_open(&self, handler: ChannelOpenHandler);

    /// Register the inbound message handler
    fn on_message(&self, handler: ChannelMessageHandler);
}

/// One peer connection owned by exactly one peer session
#[async_trait]
pub trait PeerHandle: Send + Sync {
    /// Produce a local offer description
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Produce a local answer description (requires a remote offer)
    async fn create_answer(&self) -> Result<SessionDescription>;

    /// Install a local description
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    /// Install a remote description
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Apply a remote ICE candidate
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Create an outbound data channel
    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannelHandle>>;

    /// Attach an outbound media track, yielding its sender handle
    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<Arc<dyn TrackSender>>;

    /// Detach a previously-attached sender
    async fn remove_track(&self, sender: &Arc<dyn TrackSender>) -> Result<()>;

    /// Close the connection and release engine resources
    async fn close(&self) -> Result<()>;

    /// Register the local-candidate handler
    fn on_ice_candidate(&self, handler: CandidateHandler);

    /// Register the connectivity-state handler
    fn on_connectivity_change(&self, handler: ConnectivityHandler);

    /// Register the remote-data-channel handler
    fn on_data_channel(&self, handler: ChannelHandler);

    /// Register the inbound-track handler
    fn on_track(&self, handler: RemoteTrackHandler);

    /// Register the renegotiation-needed handler
    fn on_negotiation_needed(&self, handler: NegotiationHandler);
}

/// Factory producing engine handles, configured with ICE servers at
/// construction
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Create a fresh peer connection handle
    async fn create(&self) -> Result<Arc<dyn PeerHandle>>;
}
