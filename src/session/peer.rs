//! Per-peer session state and negotiation

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::engine::{
    DataChannelHandle, IceCandidate, PeerHandle, SessionDescription, TrackKind, TrackSender,
};
use crate::media::RemoteStream;
use crate::Result;

/// Offer/answer negotiation state.
///
/// `HaveLocalOffer` gates offer creation: a second offer attempt while
/// one is in flight is rejected synchronously, before any engine work
/// starts. `HaveRemoteOffer` is transient and collapses back to
/// `Stable` once the answer is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// No negotiation in flight
    Stable,
    /// We sent an offer and await the answer
    HaveLocalOffer,
    /// We received an offer and are producing the answer
    HaveRemoteOffer,
}

/// All state owned for one remote peer.
///
/// Exactly one engine handle exists per peer id for the session's whole
/// life; the handle is never replaced. Destruction is terminal — a
/// destroyed peer id gets a brand-new session on its next appearance.
pub struct PeerSession {
    peer_id: String,
    handle: Arc<dyn PeerHandle>,

    // Checked synchronously before any async offer/answer work; never
    // held across an await.
    negotiation: Mutex<NegotiationState>,

    /// Created eagerly at session creation
    outbound: Arc<dyn DataChannelHandle>,
    /// Stored on the first remote channel announcement
    inbound: Mutex<Option<Arc<dyn DataChannelHandle>>>,

    /// At most one outbound sender per track kind
    senders: Mutex<HashMap<TrackKind, Arc<dyn TrackSender>>>,

    /// Composite of received tracks, allocated on demand
    remote_stream: Mutex<Option<Arc<RemoteStream>>>,

    /// Candidates that arrived before the remote description
    pending_candidates: Mutex<Vec<IceCandidate>>,
    remote_description_set: AtomicBool,

    established: AtomicBool,
    data_ack_sent: AtomicBool,
    destroyed: AtomicBool,
}

impl PeerSession {
    /// Create a session around a fresh engine handle.
    ///
    /// The outbound data channel is created eagerly so it rides along
    /// with the first offer.
    pub(crate) async fn new(
        peer_id: String,
        handle: Arc<dyn PeerHandle>,
        channel_label: &str,
    ) -> Result<Arc<Self>> {
        let outbound = handle.create_data_channel(channel_label).await?;

        Ok(Arc::new(Self {
            peer_id,
            handle,
            negotiation: Mutex::new(NegotiationState::Stable),
            outbound,
            inbound: Mutex::new(None),
            senders: Mutex::new(HashMap::new()),
            remote_stream: Mutex::new(None),
            pending_candidates: Mutex::new(Vec::new()),
            remote_description_set: AtomicBool::new(false),
            established: AtomicBool::new(false),
            data_ack_sent: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        }))
    }

    /// Peer this session belongs to
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// The engine handle (exclusively owned by this session)
    pub fn handle(&self) -> &Arc<dyn PeerHandle> {
        &self.handle
    }

    /// Current negotiation state
    pub fn negotiation_state(&self) -> NegotiationState {
        *self.negotiation.lock()
    }

    /// True when no negotiation is in flight
    pub fn is_stable(&self) -> bool {
        self.negotiation_state() == NegotiationState::Stable
    }

    fn set_negotiation(&self, state: NegotiationState) {
        *self.negotiation.lock() = state;
    }

    /// Create and install a local offer.
    ///
    /// Permitted only from `Stable`; any other state makes this a warned
    /// no-op returning `Ok(None)`, which is what prevents offer glare
    /// from producing two interleaved local offers.
    pub(crate) async fn create_offer(&self) -> Result<Option<SessionDescription>> {
        {
            let mut state = self.negotiation.lock();
            if *state != NegotiationState::Stable {
                warn!(
                    "peer {}: offer requested while {:?}, skipping",
                    self.peer_id, *state
                );
                return Ok(None);
            }
            *state = NegotiationState::HaveLocalOffer;
        }

        let offer = match self.handle.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                self.set_negotiation(NegotiationState::Stable);
                return Err(e);
            }
        };

        if let Err(e) = self.handle.set_local_description(offer.clone()).await {
            self.set_negotiation(NegotiationState::Stable);
            return Err(e);
        }

        debug!("peer {}: local offer installed", self.peer_id);
        Ok(Some(offer))
    }

    /// Apply a remote offer and produce the answer.
    ///
    /// Accepted in any state — the incoming description is authoritative
    /// on the remote side, which also resolves glare in its favor.
    pub(crate) async fn apply_offer(&self, sdp: &str) -> Result<SessionDescription> {
        self.set_negotiation(NegotiationState::HaveRemoteOffer);

        if let Err(e) = self
            .handle
            .set_remote_description(SessionDescription::offer(sdp))
            .await
        {
            self.set_negotiation(NegotiationState::Stable);
            return Err(e);
        }

        self.remote_description_set.store(true, Ordering::SeqCst);
        self.flush_pending_candidates().await;

        let answer = match self.handle.create_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                self.set_negotiation(NegotiationState::Stable);
                return Err(e);
            }
        };

        if let Err(e) = self.handle.set_local_description(answer.clone()).await {
            self.set_negotiation(NegotiationState::Stable);
            return Err(e);
        }

        self.set_negotiation(NegotiationState::Stable);
        debug!("peer {}: remote offer applied, answer installed", self.peer_id);
        Ok(answer)
    }

    /// Apply a remote answer.
    ///
    /// Failure reverts to `Stable` without destroying the session — a
    /// bad answer can still be retried through renegotiation.
    pub(crate) async fn apply_answer(&self, sdp: &str) -> Result<()> {
        if let Err(e) = self
            .handle
            .set_remote_description(SessionDescription::answer(sdp))
            .await
        {
            self.set_negotiation(NegotiationState::Stable);
            return Err(e);
        }

        self.remote_description_set.store(true, Ordering::SeqCst);
        self.flush_pending_candidates().await;
        self.set_negotiation(NegotiationState::Stable);

        debug!("peer {}: remote answer applied", self.peer_id);
        Ok(())
    }

    /// Apply a remote ICE candidate.
    ///
    /// Candidates arriving before the remote description are buffered
    /// and flushed once it is set; application failures are logged and
    /// never escalate beyond this session.
    pub(crate) async fn apply_candidate(&self, candidate: IceCandidate) {
        if !self.remote_description_set.load(Ordering::SeqCst) {
            debug!(
                "peer {}: buffering candidate until remote description is set",
                self.peer_id
            );
            self.pending_candidates.lock().push(candidate);
            return;
        }

        if let Err(e) = self.handle.add_ice_candidate(candidate).await {
            error!("peer {}: failed to apply ICE candidate: {}", self.peer_id, e);
        }
    }

    async fn flush_pending_candidates(&self) {
        let pending: Vec<IceCandidate> = {
            let mut queue = self.pending_candidates.lock();
            queue.drain(..).collect()
        };

        if pending.is_empty() {
            return;
        }

        debug!(
            "peer {}: flushing {} buffered candidates",
            self.peer_id,
            pending.len()
        );

        for candidate in pending {
            if let Err(e) = self.handle.add_ice_candidate(candidate).await {
                warn!("peer {}: buffered candidate rejected: {}", self.peer_id, e);
            }
        }
    }

    /// Flip the established flag; true only on the first call
    pub(crate) fn mark_established(&self) -> bool {
        !self.established.swap(true, Ordering::SeqCst)
    }

    /// True once the connection reached the connected state
    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::SeqCst)
    }

    /// Flip the data-ack flag; true only on the first call
    pub(crate) fn mark_data_ack_sent(&self) -> bool {
        !self.data_ack_sent.swap(true, Ordering::SeqCst)
    }

    /// The eagerly-created outbound data channel
    pub fn outbound_channel(&self) -> &Arc<dyn DataChannelHandle> {
        &self.outbound
    }

    /// Store the remote's channel on first announcement
    pub(crate) fn set_inbound_channel(&self, channel: Arc<dyn DataChannelHandle>) {
        let mut inbound = self.inbound.lock();
        if inbound.is_some() {
            debug!("peer {}: replacing inbound data channel", self.peer_id);
        }
        *inbound = Some(channel);
    }

    /// The remote's channel, once announced
    pub fn inbound_channel(&self) -> Option<Arc<dyn DataChannelHandle>> {
        self.inbound.lock().clone()
    }

    /// Install a sender for a kind, returning any replaced one
    pub(crate) fn store_sender(
        &self,
        kind: TrackKind,
        sender: Arc<dyn TrackSender>,
    ) -> Option<Arc<dyn TrackSender>> {
        self.senders.lock().insert(kind, sender)
    }

    /// Remove and return the sender for a kind
    pub(crate) fn take_sender(&self, kind: TrackKind) -> Option<Arc<dyn TrackSender>> {
        self.senders.lock().remove(&kind)
    }

    /// Remove and return all senders
    pub(crate) fn drain_senders(&self) -> Vec<(TrackKind, Arc<dyn TrackSender>)> {
        self.senders.lock().drain().collect()
    }

    /// Number of outbound senders currently attached
    pub fn sender_count(&self) -> usize {
        self.senders.lock().len()
    }

    /// The per-peer composite of received tracks, allocated on demand
    pub fn remote_stream(&self) -> Arc<RemoteStream> {
        let mut slot = self.remote_stream.lock();
        match &*slot {
            Some(stream) => Arc::clone(stream),
            None => {
                let stream = Arc::new(RemoteStream::new(self.peer_id.clone()));
                *slot = Some(Arc::clone(&stream));
                stream
            }
        }
    }

    /// True once [`PeerSession::destroy`] ran
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Release every owned resource. Idempotent and terminal.
    pub(crate) async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("destroying peer session {}", self.peer_id);

        if let Err(e) = self.outbound.close().await {
            debug!("peer {}: outbound channel close: {}", self.peer_id, e);
        }

        let inbound = self.inbound.lock().take();
        if let Some(channel) = inbound {
            if let Err(e) = channel.close().await {
                debug!("peer {}: inbound channel close: {}", self.peer_id, e);
            }
        }

        self.senders.lock().clear();
        if let Some(stream) = self.remote_stream.lock().take() {
            stream.clear();
        }
        self.pending_candidates.lock().clear();

        if let Err(e) = self.handle.close().await {
            warn!("peer {}: engine close failed: {}", self.peer_id, e);
        }
    }
}
