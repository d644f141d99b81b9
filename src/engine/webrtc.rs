//! Default connection engine over webrtc-rs
//!
//! Maps the engine traits onto `RTCPeerConnection` and friends. Each
//! [`WebRtcEngine::create`] call builds a fresh API instance so media
//! engine and interceptor state is never shared between peers.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::{
    CandidateHandler, ChannelHandler, ChannelMessageHandler, ChannelOpenHandler,
    ConnectionFactory, ConnectivityHandler, ConnectivityState, DataChannelHandle, IceCandidate,
    LocalTrack, NegotiationHandler, PeerHandle, RemoteTrack, RemoteTrackHandler, SdpKind,
    SessionDescription, TrackKind, TrackSender,
};
use crate::config::IceServer;
use crate::{Error, Result};

fn engine_err(e: impl std::fmt::Display) -> Error {
    Error::Engine(e.to_string())
}

/// Engine factory backed by webrtc-rs
pub struct WebRtcEngine {
    ice_servers: Vec<RTCIceServer>,
}

impl WebRtcEngine {
    /// Create a factory handing the given ICE servers to every connection
    pub fn new(ice_servers: &[IceServer]) -> Self {
        let ice_servers = ice_servers
            .iter()
            .map(|s| RTCIceServer {
                urls: s.urls.clone(),
                username: s.username.clone(),
                credential: s.credential.clone(),
                ..Default::default()
            })
            .collect();

        Self { ice_servers }
    }
}

#[async_trait]
impl ConnectionFactory for WebRtcEngine {
    async fn create(&self) -> Result<Arc<dyn PeerHandle>> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(engine_err)?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(engine_err)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };

        let pc = api.new_peer_connection(config).await.map_err(engine_err)?;

        Ok(Arc::new(WebRtcPeer {
            pc: Arc::new(pc),
        }))
    }
}

/// [`PeerHandle`] over an `RTCPeerConnection`
pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
}

impl WebRtcPeer {
    /// The underlying peer connection, for hosts that need engine-level
    /// access (stats, transceiver tuning)
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }
}

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription> {
    match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp).map_err(engine_err),
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp).map_err(engine_err),
    }
}

#[async_trait]
impl PeerHandle for WebRtcPeer {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await.map_err(engine_err)?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await.map_err(engine_err)?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = to_rtc_description(desc)?;
        self.pc.set_local_description(desc).await.map_err(engine_err)
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = to_rtc_description(desc)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(engine_err)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };

        self.pc.add_ice_candidate(init).await.map_err(engine_err)
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannelHandle>> {
        let dc = self
            .pc
            .create_data_channel(label, None)
            .await
            .map_err(|e| Error::DataChannel(e.to_string()))?;

        Ok(Arc::new(WebRtcDataChannel::wrap(dc)))
    }

    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<Arc<dyn TrackSender>> {
        let local = track
            .as_any()
            .downcast_ref::<WebRtcLocalTrack>()
            .ok_or_else(|| {
                Error::Media("local track was not created for the webrtc engine".to_string())
            })?;

        let sender = self
            .pc
            .add_track(Arc::clone(&local.inner))
            .await
            .map_err(engine_err)?;

        Ok(Arc::new(WebRtcTrackSender {
            kind: track.kind(),
            inner: sender,
        }))
    }

    async fn remove_track(&self, sender: &Arc<dyn TrackSender>) -> Result<()> {
        let sender = sender
            .as_any()
            .downcast_ref::<WebRtcTrackSender>()
            .ok_or_else(|| {
                Error::Media("sender was not created by the webrtc engine".to_string())
            })?;

        self.pc.remove_track(&sender.inner).await.map_err(engine_err)
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await.map_err(engine_err)
    }

    fn on_ice_candidate(&self, handler: CandidateHandler) {
        self.pc.on_ice_candidate(Box::new(move |candidate| {
            match candidate {
                Some(c) => match c.to_json() {
                    Ok(init) => handler(Some(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                    })),
                    Err(e) => {
                        // Must not masquerade as the end-of-gathering signal
                        warn!("failed to serialize local ICE candidate: {}", e);
                        Box::pin(async {})
                    }
                },
                None => handler(None),
            }
        }));
    }

    fn on_connectivity_change(&self, handler: ConnectivityHandler) {
        self.pc
            .on_peer_connection_state_change(Box::new(move |state| {
                let mapped = match state {
                    RTCPeerConnectionState::New => ConnectivityState::New,
                    RTCPeerConnectionState::Connecting => ConnectivityState::Connecting,
                    RTCPeerConnectionState::Connected => ConnectivityState::Connected,
                    RTCPeerConnectionState::Disconnected => ConnectivityState::Disconnected,
                    RTCPeerConnectionState::Failed => ConnectivityState::Failed,
                    RTCPeerConnectionState::Closed => ConnectivityState::Closed,
                    _ => ConnectivityState::New,
                };
                handler(mapped)
            }));
    }

    fn on_data_channel(&self, handler: ChannelHandler) {
        self.pc.on_data_channel(Box::new(move |dc| {
            let wrapped: Arc<dyn DataChannelHandle> = Arc::new(WebRtcDataChannel::wrap(dc));
            handler(wrapped)
        }));
    }

    fn on_track(&self, handler: RemoteTrackHandler) {
        self.pc
            .on_track(Box::new(move |track, _receiver, _transceiver| {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    _ => {
                        debug!("ignoring remote track of unspecified kind");
                        return Box::pin(async {});
                    }
                };

                let wrapped: Arc<dyn RemoteTrack> = Arc::new(WebRtcRemoteTrack {
                    id: track.id(),
                    kind,
                    inner: track,
                });
                handler(wrapped)
            }));
    }

    fn on_negotiation_needed(&self, handler: NegotiationHandler) {
        self.pc.on_negotiation_needed(Box::new(move || handler()));
    }
}

/// [`DataChannelHandle`] over an `RTCDataChannel`
pub struct WebRtcDataChannel {
    label: String,
    dc: Arc<RTCDataChannel>,
}

impl WebRtcDataChannel {
    fn wrap(dc: Arc<RTCDataChannel>) -> Self {
        Self {
            label: dc.label().to_string(),
            dc,
        }
    }
}

#[async_trait]
impl DataChannelHandle for WebRtcDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        self.dc.ready_state() == RTCDataChannelState::Open
    }

    async fn send_text(&self, payload: &str) -> Result<()> {
        self.dc
            .send_text(payload)
            .await
            .map(|_| ())
            .map_err(|e| Error::DataChannel(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        self.dc
            .close()
            .await
            .map_err(|e| Error::DataChannel(e.to_string()))
    }

    fn on_open(&self, handler: ChannelOpenHandler) {
        self.dc.on_open(Box::new(move || handler()));
    }

    fn on_message(&self, handler: ChannelMessageHandler) {
        self.dc.on_message(Box::new(move |msg| {
            let text = String::from_utf8_lossy(&msg.data).into_owned();
            handler(text)
        }));
    }
}

/// A local track backed by a webrtc-rs `TrackLocal`
pub struct WebRtcLocalTrack {
    id: String,
    kind: TrackKind,
    inner: Arc<dyn TrackLocal + Send + Sync>,
}

impl WebRtcLocalTrack {
    /// Wrap an engine-native local track (e.g. `TrackLocalStaticSample`).
    ///
    /// Fails when the track kind is unspecified.
    pub fn new(inner: Arc<dyn TrackLocal + Send + Sync>) -> Result<Self> {
        let kind = match inner.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            RTPCodecType::Video => TrackKind::Video,
            _ => {
                return Err(Error::Media(
                    "local track has unspecified codec type".to_string(),
                ))
            }
        };

        Ok(Self {
            id: inner.id().to_string(),
            kind,
            inner,
        })
    }
}

impl LocalTrack for WebRtcLocalTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&self) {
        // Capture lifecycle belongs to the host; nothing to stop here.
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A remote track received from the engine
pub struct WebRtcRemoteTrack {
    id: String,
    kind: TrackKind,
    inner: Arc<TrackRemote>,
}

impl WebRtcRemoteTrack {
    /// The engine-native remote track, for RTP consumption by the host
    pub fn inner(&self) -> &Arc<TrackRemote> {
        &self.inner
    }
}

impl RemoteTrack for WebRtcRemoteTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An outbound sender created by [`WebRtcPeer::add_track`]
pub struct WebRtcTrackSender {
    kind: TrackKind,
    inner: Arc<RTCRtpSender>,
}

impl TrackSender for WebRtcTrackSender {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
