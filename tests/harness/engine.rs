//! Scripted connection engine for orchestrator tests
//!
//! Records every operation the orchestrator performs and lets tests
//! fire engine events (connectivity, tracks, channels) by hand.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use peermesh::engine::{
    CandidateHandler, ChannelHandler, ChannelMessageHandler, ChannelOpenHandler,
    ConnectivityHandler, NegotiationHandler, RemoteTrackHandler,
};
use peermesh::{
    ConnectionFactory, ConnectivityState, DataChannelHandle, Error, IceCandidate, LocalTrack,
    PeerHandle, RemoteTrack, Result, SessionDescription, TrackKind, TrackSender,
};

/// Factory recording every handle it creates
pub struct MockFactory {
    pub created: Mutex<Vec<Arc<MockPeer>>>,
    pub fail_next: AtomicBool,
}

impl MockFactory {
    pub fn new() -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    pub fn peer(&self, index: usize) -> Arc<MockPeer> {
        Arc::clone(&self.created.lock()[index])
    }

    pub fn last(&self) -> Arc<MockPeer> {
        Arc::clone(self.created.lock().last().expect("no peers created"))
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn create(&self) -> Result<Arc<dyn PeerHandle>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::Engine("scripted factory failure".to_string()));
        }

        let peer = Arc::new(MockPeer::new());
        self.created.lock().push(Arc::clone(&peer));
        Ok(peer)
    }
}

/// Scripted peer connection handle
pub struct MockPeer {
    pub offers_created: AtomicUsize,
    pub answers_created: AtomicUsize,
    pub local_descriptions: Mutex<Vec<SessionDescription>>,
    pub remote_descriptions: Mutex<Vec<SessionDescription>>,
    pub candidates: Mutex<Vec<IceCandidate>>,
    pub added_track_ids: Mutex<Vec<String>>,
    pub removed_senders: AtomicUsize,
    pub closed: AtomicBool,
    pub channels: Mutex<Vec<Arc<MockChannel>>>,

    candidate_handler: Mutex<Option<CandidateHandler>>,
    connectivity_handler: Mutex<Option<ConnectivityHandler>>,
    channel_handler: Mutex<Option<ChannelHandler>>,
    track_handler: Mutex<Option<RemoteTrackHandler>>,
    negotiation_handler: Mutex<Option<NegotiationHandler>>,
}

impl MockPeer {
    pub fn new() -> Self {
        Self {
            offers_created: AtomicUsize::new(0),
            answers_created: AtomicUsize::new(0),
            local_descriptions: Mutex::new(Vec::new()),
            remote_descriptions: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
            added_track_ids: Mutex::new(Vec::new()),
            removed_senders: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            channels: Mutex::new(Vec::new()),
            candidate_handler: Mutex::new(None),
            connectivity_handler: Mutex::new(None),
            channel_handler: Mutex::new(None),
            track_handler: Mutex::new(None),
            negotiation_handler: Mutex::new(None),
        }
    }

    /// The eagerly-created outbound channel (first channel on the handle)
    pub fn outbound_channel(&self) -> Arc<MockChannel> {
        Arc::clone(self.channels.lock().first().expect("no data channel"))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn fire_candidate(&self, candidate: Option<IceCandidate>) {
        let fut = {
            let guard = self.candidate_handler.lock();
            guard.as_ref().expect("candidate handler not wired")(candidate)
        };
        fut.await;
    }

    pub async fn fire_connectivity(&self, state: ConnectivityState) {
        let fut = {
            let guard = self.connectivity_handler.lock();
            guard.as_ref().expect("connectivity handler not wired")(state)
        };
        fut.await;
    }

    pub async fn fire_data_channel(&self, channel: Arc<MockChannel>) {
        let fut = {
            let guard = self.channel_handler.lock();
            guard.as_ref().expect("data channel handler not wired")(channel)
        };
        fut.await;
    }

    pub async fn fire_track(&self, track: Arc<MockRemoteTrack>) {
        let fut = {
            let guard = self.track_handler.lock();
            guard.as_ref().expect("track handler not wired")(track)
        };
        fut.await;
    }

    pub async fn fire_negotiation_needed(&self) {
        let fut = {
            let guard = self.negotiation_handler.lock();
            guard.as_ref().expect("negotiation handler not wired")()
        };
        fut.await;
    }
}

#[async_trait]
impl PeerHandle for MockPeer {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let n = self.offers_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionDescription::offer(format!("mock-offer-{}", n)))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let n = self.answers_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionDescription::answer(format!("mock-answer-{}", n)))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.local_descriptions.lock().push(desc);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.remote_descriptions.lock().push(desc);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.candidates.lock().push(candidate);
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannelHandle>> {
        let channel = Arc::new(MockChannel::new(label));
        self.channels.lock().push(Arc::clone(&channel));
        Ok(channel)
    }

    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<Arc<dyn TrackSender>> {
        self.added_track_ids.lock().push(track.id().to_string());
        Ok(Arc::new(MockSender { kind: track.kind() }))
    }

    async fn remove_track(&self, _sender: &Arc<dyn TrackSender>) -> Result<()> {
        self.removed_senders.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn on_ice_candidate(&self, handler: CandidateHandler) {
        *self.candidate_handler.lock() = Some(handler);
    }

    fn on_connectivity_change(&self, handler: ConnectivityHandler) {
        *self.connectivity_handler.lock() = Some(handler);
    }

    fn on_data_channel(&self, handler: ChannelHandler) {
        *self.channel_handler.lock() = Some(handler);
    }

    fn on_track(&self, handler: RemoteTrackHandler) {
        *self.track_handler.lock() = Some(handler);
    }

    fn on_negotiation_needed(&self, handler: NegotiationHandler) {
        *self.negotiation_handler.lock() = Some(handler);
    }
}

/// Scripted data channel
pub struct MockChannel {
    label: String,
    pub open: AtomicBool,
    pub closed: AtomicBool,
    pub sent: Mutex<Vec<String>>,
    open_handler: Mutex<Option<ChannelOpenHandler>>,
    message_handler: Mutex<Option<ChannelMessageHandler>>,
}

impl MockChannel {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            open: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            open_handler: Mutex::new(None),
            message_handler: Mutex::new(None),
        }
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub fn sent_payloads(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Transition to open and run the registered open handler
    pub async fn fire_open(&self) {
        self.open.store(true, Ordering::SeqCst);
        let fut = {
            let guard = self.open_handler.lock();
            guard.as_ref().map(|h| h())
        };
        if let Some(fut) = fut {
            fut.await;
        }
    }

    /// Run the registered message handler with a payload
    pub async fn fire_message(&self, payload: &str) {
        let fut = {
            let guard = self.message_handler.lock();
            guard.as_ref().expect("message handler not wired")(payload.to_string())
        };
        fut.await;
    }
}

#[async_trait]
impl DataChannelHandle for MockChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    async fn send_text(&self, payload: &str) -> Result<()> {
        if !self.is_open() {
            return Err(Error::DataChannel("channel not open".to_string()));
        }
        self.sent.lock().push(payload.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn on_open(&self, handler: ChannelOpenHandler) {
        *self.open_handler.lock() = Some(handler);
    }

    fn on_message(&self, handler: ChannelMessageHandler) {
        *self.message_handler.lock() = Some(handler);
    }
}

/// Host-side capture track stub
pub struct MockLocalTrack {
    id: String,
    kind: TrackKind,
    pub stopped: AtomicBool,
}

impl MockLocalTrack {
    pub fn new(id: &str, kind: TrackKind) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl LocalTrack for MockLocalTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Remote track stub
pub struct MockRemoteTrack {
    id: String,
    kind: TrackKind,
}

impl MockRemoteTrack {
    pub fn new(id: &str, kind: TrackKind) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
        })
    }
}

impl RemoteTrack for MockRemoteTrack {
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

/// Sender stub returned by [`MockPeer::add_track`]
pub struct MockSender {
    kind: TrackKind,
}

impl TrackSender for MockSender {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
