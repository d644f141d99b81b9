//! Connection orchestrator
//!
//! The façade and message router: decodes inbound signaling, drives the
//! per-peer negotiation lifecycle, wires engine events into sessions,
//! and raises application callbacks. All per-peer failures stay inside
//! that peer's session; only signaling-transport failures are global.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::MeshConfig;
use crate::engine::{
    ConnectionFactory, ConnectivityState, DataChannelHandle, IceCandidate, RemoteTrack, TrackKind,
};
use crate::events::MeshEvents;
use crate::media::{LocalStream, MediaPipeline};
use crate::protocol::{SignalKind, SignalMessage, BROADCAST};
use crate::session::{PeerSession, SessionTable};
use crate::transport::{SignalingTransport, TransportEvent, TransportState};
use crate::{Error, Result};

/// Signaling-link lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkPhase {
    Idle,
    Connecting,
    Connected,
}

/// Peer-to-peer connection orchestrator.
///
/// Construct with [`Orchestrator::new`], then [`Orchestrator::connect`]
/// to join a signaling channel. Everything else happens reactively:
/// inbound signaling and engine events drive sessions, and results
/// surface through the injected [`MeshEvents`].
pub struct Orchestrator {
    config: MeshConfig,
    factory: Arc<dyn ConnectionFactory>,
    transport: Arc<dyn SignalingTransport>,
    events: Arc<dyn MeshEvents>,

    sessions: SessionTable,
    media: MediaPipeline,

    // Handed to engine callbacks and the event loop so neither keeps a
    // torn-down orchestrator alive.
    weak: Weak<Self>,

    link: Mutex<LinkPhase>,
    send_media: AtomicBool,
    recv_media: AtomicBool,
}

impl Orchestrator {
    /// Create an orchestrator with injected collaborators
    pub fn new(
        config: MeshConfig,
        factory: Arc<dyn ConnectionFactory>,
        transport: Arc<dyn SignalingTransport>,
        events: Arc<dyn MeshEvents>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            config,
            factory,
            transport,
            events,
            sessions: SessionTable::new(),
            media: MediaPipeline::new(),
            weak: weak.clone(),
            link: Mutex::new(LinkPhase::Idle),
            send_media: AtomicBool::new(false),
            recv_media: AtomicBool::new(false),
        })
    }

    /// Our identifier on the signaling channel
    pub fn local_id(&self) -> &str {
        &self.config.local_id
    }

    /// True while the signaling link is open
    pub fn is_connected(&self) -> bool {
        *self.link.lock() == LinkPhase::Connected
    }

    /// The session table (read access for hosts and tests)
    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Ids of every known peer
    pub async fn peer_ids(&self) -> Vec<String> {
        self.sessions.peer_ids().await
    }

    /// Number of live peer sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }

    /// Look up one peer's session
    pub async fn session(&self, peer_id: &str) -> Option<Arc<PeerSession>> {
        self.sessions.get(peer_id).await
    }

    /// The currently-installed local stream, if any
    pub async fn local_stream(&self) -> Option<Arc<LocalStream>> {
        self.media.local_stream().await
    }

    /// Open the signaling channel and announce local presence.
    ///
    /// `want_send_media` / `want_recv_media` record the media intent for
    /// the remainder of the session. Fails with [`Error::Transport`]
    /// when already connected or while another attempt is in flight.
    pub async fn connect(
        &self,
        endpoint: &str,
        want_send_media: bool,
        want_recv_media: bool,
    ) -> Result<()> {
        {
            let mut link = self.link.lock();
            if *link != LinkPhase::Idle {
                return Err(Error::Transport(
                    "already connected or a connection attempt is in flight".to_string(),
                ));
            }
            *link = LinkPhase::Connecting;
        }

        self.send_media.store(want_send_media, Ordering::SeqCst);
        self.recv_media.store(want_recv_media, Ordering::SeqCst);

        let rx = match self.transport.open(endpoint).await {
            Ok(rx) => rx,
            Err(e) => {
                *self.link.lock() = LinkPhase::Idle;
                return Err(e);
            }
        };

        let weak = self.weak.clone();
        tokio::spawn(Self::run_event_loop(weak, rx));

        Ok(())
    }

    async fn run_event_loop(weak: Weak<Self>, mut rx: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = rx.recv().await {
            let Some(orch) = weak.upgrade() else { return };

            match event {
                TransportEvent::Opened => orch.handle_opened().await,
                TransportEvent::Message(text) => orch.handle_signal(&text).await,
                TransportEvent::Closed => {
                    orch.handle_link_down(TransportState::Closed).await;
                    break;
                }
                TransportEvent::Error(e) => {
                    warn!("signaling transport error: {}", e);
                    orch.handle_link_down(TransportState::Error).await;
                    break;
                }
            }
        }

        // Sender dropped without a Closed event; no-op when close_all
        // already ran.
        if let Some(orch) = weak.upgrade() {
            orch.handle_link_down(TransportState::Closed).await;
        }
    }

    async fn handle_opened(&self) {
        *self.link.lock() = LinkPhase::Connected;

        info!("signaling link open, announcing {}", self.config.local_id);

        let announce = SignalMessage::new(SignalKind::NewPeer, &self.config.local_id, BROADCAST)
            .with_peer_count(self.sessions.len().await as u32)
            .with_media_sender(self.send_media.load(Ordering::SeqCst));
        self.send_signal(announce).await;

        self.events
            .on_connection_state_changed(TransportState::Open)
            .await;
    }

    async fn handle_link_down(&self, state: TransportState) {
        {
            let mut link = self.link.lock();
            if *link == LinkPhase::Idle {
                return;
            }
            *link = LinkPhase::Idle;
        }

        info!(
            "signaling link down ({:?}), tearing down {} sessions",
            state,
            self.sessions.len().await
        );

        self.teardown_sessions().await;
        self.events.on_connection_state_changed(state).await;
    }

    async fn teardown_sessions(&self) {
        for session in self.sessions.drain().await {
            session.destroy().await;
        }
    }

    /// Decode one signaling frame and dispatch it.
    ///
    /// Tolerates malformed input: anything undecodable or out of context
    /// is logged and dropped, never escalated.
    pub async fn handle_signal(&self, raw: &str) {
        let msg = SignalMessage::decode(raw);

        // Our own broadcasts come back on shared channels
        if msg.sender == self.config.local_id {
            return;
        }

        match msg.kind {
            SignalKind::NewPeer => self.on_new_peer(&msg).await,
            SignalKind::NewPeerAck => self.on_new_peer_ack(&msg).await,
            SignalKind::Offer => self.on_offer(&msg).await,
            SignalKind::Answer => self.on_answer(&msg).await,
            SignalKind::Candidate => self.on_candidate(&msg).await,
            SignalKind::Dispose => self.on_dispose(&msg).await,
            SignalKind::Data => self.on_data_ack(&msg).await,
            SignalKind::Complete => self.on_complete(&msg).await,
            SignalKind::Unknown => {
                debug!("ignoring message of unknown kind from '{}'", msg.sender);
            }
        }
    }

    async fn on_new_peer(&self, msg: &SignalMessage) {
        debug!(
            "peer {} announced (sessions={}, media_sender={})",
            msg.sender, msg.peer_count, msg.media_sender
        );

        let session = match self.ensure_session_entry(&msg.sender).await {
            Ok((session, _)) => session,
            Err(e) => {
                error!("failed to create session for {}: {}", msg.sender, e);
                return;
            }
        };

        // The receive-side sink must exist before the remote's offer
        // delivers its tracks
        if msg.media_sender && self.recv_media.load(Ordering::SeqCst) {
            session.remote_stream();
        }

        self.send_peer_ack().await;
    }

    async fn on_new_peer_ack(&self, msg: &SignalMessage) {
        let (session, created) = match self.ensure_session_entry(&msg.sender).await {
            Ok(pair) => pair,
            Err(e) => {
                error!("failed to create session for {}: {}", msg.sender, e);
                return;
            }
        };

        if msg.media_sender && self.recv_media.load(Ordering::SeqCst) {
            session.remote_stream();
        }

        // Mirror the NEWPEER reply, but only for a freshly-created
        // session — the existing-session case is what stops acks from
        // ping-ponging forever
        if created {
            self.send_peer_ack().await;
        }

        // Media senders drive the negotiation toward acked peers
        if self.send_media.load(Ordering::SeqCst) && session.is_stable() {
            self.try_send_offer(&session).await;
        }
    }

    async fn send_peer_ack(&self) {
        let ack = SignalMessage::new(SignalKind::NewPeerAck, &self.config.local_id, BROADCAST)
            .with_peer_count(self.sessions.len().await as u32)
            .with_media_sender(self.send_media.load(Ordering::SeqCst));
        self.send_signal(ack).await;
    }

    async fn on_offer(&self, msg: &SignalMessage) {
        if !msg.addressed_to(&self.config.local_id) {
            return;
        }

        let session = match self.ensure_session(&msg.sender).await {
            Ok(session) => session,
            Err(e) => {
                error!("failed to create session for {}: {}", msg.sender, e);
                return;
            }
        };

        match session.apply_offer(&msg.payload).await {
            Ok(answer) => {
                let reply =
                    SignalMessage::new(SignalKind::Answer, &self.config.local_id, &msg.sender)
                        .with_payload(answer.sdp);
                self.send_signal(reply).await;
            }
            Err(e) => error!("failed to apply offer from {}: {}", msg.sender, e),
        }
    }

    async fn on_answer(&self, msg: &SignalMessage) {
        if !msg.addressed_to(&self.config.local_id) {
            return;
        }

        match self.sessions.get(&msg.sender).await {
            Some(session) => {
                if let Err(e) = session.apply_answer(&msg.payload).await {
                    error!("failed to apply answer from {}: {}", msg.sender, e);
                }
            }
            None => warn!("answer from {} with no matching session, dropping", msg.sender),
        }
    }

    async fn on_candidate(&self, msg: &SignalMessage) {
        if !msg.addressed_to(&self.config.local_id) {
            return;
        }

        let Some(session) = self.sessions.get(&msg.sender).await else {
            warn!(
                "candidate from {} before any session exists, dropping",
                msg.sender
            );
            return;
        };

        match serde_json::from_str::<IceCandidate>(&msg.payload) {
            Ok(candidate) => session.apply_candidate(candidate).await,
            Err(e) => warn!("undecodable candidate from {}: {}", msg.sender, e),
        }
    }

    async fn on_dispose(&self, msg: &SignalMessage) {
        info!("peer {} announced departure", msg.sender);
        self.destroy_session(&msg.sender).await;
    }

    async fn on_data_ack(&self, msg: &SignalMessage) {
        if msg.receiver != self.config.local_id {
            return;
        }

        let Some(session) = self.sessions.get(&msg.sender).await else {
            warn!("data ack from {} with no session, dropping", msg.sender);
            return;
        };

        if session.outbound_channel().is_open() {
            self.events.on_data_channel_ready(&msg.sender).await;
        } else {
            debug!(
                "data ack from {} but our outbound channel is not open yet",
                msg.sender
            );
        }
    }

    async fn on_complete(&self, msg: &SignalMessage) {
        if msg.receiver != self.config.local_id {
            return;
        }

        let Some(session) = self.sessions.get(&msg.sender).await else {
            debug!("completion from {} with no session, ignoring", msg.sender);
            return;
        };

        if session.mark_established() {
            self.events.on_peer_established(&msg.sender).await;
        }
    }

    /// Get or create the session for `peer_id`.
    ///
    /// A second call for an existing id returns the same session and
    /// touches nothing — one engine handle per peer id, always.
    pub async fn ensure_session(&self, peer_id: &str) -> Result<Arc<PeerSession>> {
        let (session, _) = self.ensure_session_entry(peer_id).await?;
        Ok(session)
    }

    async fn ensure_session_entry(
        &self,
        peer_id: &str,
    ) -> Result<(Arc<PeerSession>, bool)> {
        let factory = Arc::clone(&self.factory);
        let label = self.config.data_channel_label.clone();
        let id = peer_id.to_string();

        let (session, created) = self
            .sessions
            .ensure(peer_id, || async move {
                let handle = factory.create().await?;
                PeerSession::new(id, handle, &label).await
            })
            .await?;

        if created {
            self.wire_session(&session);

            // A media sender carries its current stream into every new
            // session so the first offer already includes the tracks
            if self.send_media.load(Ordering::SeqCst) {
                if let Err(e) = self.media.attach_to_session(&session).await {
                    warn!("failed to attach local tracks to {}: {}", peer_id, e);
                }
            }
        }

        Ok((session, created))
    }

    /// Route engine events for a freshly-created session back into the
    /// orchestrator. Handlers hold a weak reference so sessions never
    /// keep a torn-down orchestrator alive.
    fn wire_session(&self, session: &Arc<PeerSession>) {
        let handle = session.handle();

        {
            let weak = self.weak.clone();
            let peer_id = session.peer_id().to_string();
            handle.on_ice_candidate(Box::new(move |candidate| {
                let weak = weak.clone();
                let peer_id = peer_id.clone();
                Box::pin(async move {
                    let Some(orch) = weak.upgrade() else { return };
                    match candidate {
                        Some(candidate) => orch.send_candidate(&peer_id, candidate).await,
                        None => debug!("peer {}: ICE gathering complete", peer_id),
                    }
                })
            }));
        }

        {
            let weak = self.weak.clone();
            let peer_id = session.peer_id().to_string();
            handle.on_connectivity_change(Box::new(move |state| {
                let weak = weak.clone();
                let peer_id = peer_id.clone();
                Box::pin(async move {
                    let Some(orch) = weak.upgrade() else { return };
                    orch.on_connectivity(&peer_id, state).await;
                })
            }));
        }

        {
            let weak = self.weak.clone();
            let peer_id = session.peer_id().to_string();
            handle.on_data_channel(Box::new(move |channel| {
                let weak = weak.clone();
                let peer_id = peer_id.clone();
                Box::pin(async move {
                    let Some(orch) = weak.upgrade() else { return };
                    orch.on_inbound_channel(&peer_id, channel).await;
                })
            }));
        }

        {
            let weak = self.weak.clone();
            let peer_id = session.peer_id().to_string();
            handle.on_track(Box::new(move |track| {
                let weak = weak.clone();
                let peer_id = peer_id.clone();
                Box::pin(async move {
                    let Some(orch) = weak.upgrade() else { return };
                    orch.on_remote_track(&peer_id, track).await;
                })
            }));
        }

        {
            let weak = self.weak.clone();
            let peer_id = session.peer_id().to_string();
            handle.on_negotiation_needed(Box::new(move || {
                let weak = weak.clone();
                let peer_id = peer_id.clone();
                Box::pin(async move {
                    let Some(orch) = weak.upgrade() else { return };
                    orch.on_negotiation_needed(&peer_id).await;
                })
            }));
        }
    }

    async fn send_candidate(&self, peer_id: &str, candidate: IceCandidate) {
        match serde_json::to_string(&candidate) {
            Ok(payload) => {
                let msg =
                    SignalMessage::new(SignalKind::Candidate, &self.config.local_id, peer_id)
                        .with_payload(payload);
                self.send_signal(msg).await;
            }
            Err(e) => warn!("failed to serialize candidate for {}: {}", peer_id, e),
        }
    }

    async fn on_connectivity(&self, peer_id: &str, state: ConnectivityState) {
        debug!("peer {} connectivity: {}", peer_id, state);

        match state {
            ConnectivityState::Connected => {
                let Some(session) = self.sessions.get(peer_id).await else {
                    return;
                };

                if session.mark_established() {
                    // Tell the other side our end observed the connection
                    let msg =
                        SignalMessage::new(SignalKind::Complete, &self.config.local_id, peer_id);
                    self.send_signal(msg).await;
                    self.events.on_peer_established(peer_id).await;
                }
            }
            state if state.is_terminal() => {
                warn!("peer {} connectivity {}, destroying session", peer_id, state);
                self.destroy_session(peer_id).await;
            }
            _ => {}
        }
    }

    async fn on_inbound_channel(&self, peer_id: &str, channel: Arc<dyn DataChannelHandle>) {
        debug!("peer {}: inbound data channel '{}'", peer_id, channel.label());

        let Some(session) = self.sessions.get(peer_id).await else {
            warn!("inbound channel from unknown peer {}, ignoring", peer_id);
            return;
        };

        session.set_inbound_channel(Arc::clone(&channel));

        {
            let weak = self.weak.clone();
            let peer_id = peer_id.to_string();
            channel.on_message(Box::new(move |payload| {
                let weak = weak.clone();
                let peer_id = peer_id.clone();
                Box::pin(async move {
                    let Some(orch) = weak.upgrade() else { return };
                    orch.events.on_data_received(&peer_id, &payload).await;
                })
            }));
        }

        {
            let weak = self.weak.clone();
            let peer_id = peer_id.to_string();
            channel.on_open(Box::new(move || {
                let weak = weak.clone();
                let peer_id = peer_id.clone();
                Box::pin(async move {
                    let Some(orch) = weak.upgrade() else { return };
                    orch.send_data_ack(&peer_id).await;
                })
            }));
        }

        // The channel may have opened before our handler was registered
        if channel.is_open() {
            self.send_data_ack(peer_id).await;
        }
    }

    /// Acknowledge the remote's channel exactly once per session
    async fn send_data_ack(&self, peer_id: &str) {
        let Some(session) = self.sessions.get(peer_id).await else {
            return;
        };

        if session.mark_data_ack_sent() {
            let msg = SignalMessage::new(SignalKind::Data, &self.config.local_id, peer_id);
            self.send_signal(msg).await;
        }
    }

    async fn on_remote_track(&self, peer_id: &str, track: Arc<dyn RemoteTrack>) {
        let Some(session) = self.sessions.get(peer_id).await else {
            warn!("remote track from unknown peer {}, ignoring", peer_id);
            return;
        };

        let (kind, stream) = self.media.accept_remote_track(&session, track).await;
        info!("peer {}: remote {} track established", peer_id, kind);

        match kind {
            TrackKind::Video => self.events.on_video_stream(peer_id, stream).await,
            TrackKind::Audio => self.events.on_audio_stream(peer_id, stream).await,
        }
    }

    async fn on_negotiation_needed(&self, peer_id: &str) {
        let Some(session) = self.sessions.get(peer_id).await else {
            return;
        };

        if session.is_stable() {
            debug!("peer {}: renegotiation needed", peer_id);
            self.try_send_offer(&session).await;
        } else {
            debug!(
                "peer {}: renegotiation requested mid-negotiation, skipping",
                peer_id
            );
        }
    }

    async fn try_send_offer(&self, session: &Arc<PeerSession>) {
        match session.create_offer().await {
            Ok(Some(offer)) => {
                let msg = SignalMessage::new(
                    SignalKind::Offer,
                    &self.config.local_id,
                    session.peer_id(),
                )
                .with_payload(offer.sdp);
                self.send_signal(msg).await;
            }
            Ok(None) => {} // guarded no-op, the session logged it
            Err(e) => error!("failed to create offer for {}: {}", session.peer_id(), e),
        }
    }

    /// Best-effort: offer toward every known peer currently stable;
    /// peers mid-negotiation are skipped.
    pub async fn initiate_offers_to_all_peers(&self) {
        for session in self.sessions.all().await {
            if session.is_stable() {
                self.try_send_offer(&session).await;
            } else {
                debug!("peer {} mid-negotiation, skipping offer", session.peer_id());
            }
        }
    }

    /// Send an application payload over data channels.
    ///
    /// With a target, delivery happens only when that peer's outbound
    /// channel is open (otherwise a warned no-op). Without one, every
    /// open channel gets the payload; closed channels are skipped
    /// individually and never abort the remaining sends.
    pub async fn send_data(&self, payload: &str, target: Option<&str>) {
        match target {
            Some(peer_id) => {
                let Some(session) = self.sessions.get(peer_id).await else {
                    warn!("send_data: no session for {}", peer_id);
                    return;
                };

                let channel = session.outbound_channel();
                if !channel.is_open() {
                    warn!("send_data: channel to {} not open, dropping", peer_id);
                    return;
                }

                if let Err(e) = channel.send_text(payload).await {
                    warn!("send_data: delivery to {} failed: {}", peer_id, e);
                }
            }
            None => {
                for session in self.sessions.all().await {
                    let channel = session.outbound_channel();
                    if !channel.is_open() {
                        warn!(
                            "send_data: skipping {} (channel not open)",
                            session.peer_id()
                        );
                        continue;
                    }

                    if let Err(e) = channel.send_text(payload).await {
                        warn!("send_data: delivery to {} failed: {}", session.peer_id(), e);
                    }
                }
            }
        }
    }

    /// Install or release the local capture stream.
    ///
    /// `None` stops every local track and removes every outbound sender.
    /// A new stream replaces old senders in every session before
    /// attaching, then renegotiates each session that gained tracks.
    pub async fn set_local_stream(&self, stream: Option<Arc<LocalStream>>) {
        let sessions = self.sessions.all().await;

        match stream {
            None => {
                info!("releasing local media stream");
                self.media.clear_local(&sessions).await;
            }
            Some(stream) => {
                info!(
                    "installing local stream '{}' with {} tracks",
                    stream.id(),
                    stream.tracks().len()
                );
                self.media.replace_local(stream, &sessions).await;

                if self.send_media.load(Ordering::SeqCst) {
                    for session in sessions {
                        match self.media.attach_to_session(&session).await {
                            Ok(true) => self.try_send_offer(&session).await,
                            Ok(false) => {}
                            Err(e) => warn!(
                                "failed to attach tracks to {}: {}",
                                session.peer_id(),
                                e
                            ),
                        }
                    }
                }
            }
        }
    }

    async fn destroy_session(&self, peer_id: &str) {
        match self.sessions.remove(peer_id).await {
            Some(session) => session.destroy().await,
            None => debug!("no session to destroy for {}", peer_id),
        }
    }

    /// Leave the mesh: announce departure, destroy every session,
    /// release local media, and close the signaling link.
    pub async fn close_all(&self) {
        info!("leaving mesh, destroying {} sessions", self.sessions.len().await);

        let goodbye = SignalMessage::new(SignalKind::Dispose, &self.config.local_id, BROADCAST)
            .with_peer_count(self.sessions.len().await as u32);
        self.send_signal(goodbye).await;

        // Mark the link down first so the event loop's shutdown path
        // becomes a no-op
        *self.link.lock() = LinkPhase::Idle;

        self.teardown_sessions().await;
        self.media.clear_local(&[]).await;

        if let Err(e) = self.transport.close().await {
            debug!("transport close: {}", e);
        }

        self.events
            .on_connection_state_changed(TransportState::Closed)
            .await;
    }

    async fn send_signal(&self, msg: SignalMessage) {
        let encoded = msg.encode();
        if let Err(e) = self.transport.send(&encoded).await {
            warn!("failed to send {} message: {}", msg.kind, e);
        }
    }
}
