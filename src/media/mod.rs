//! Media pipeline
//!
//! Tracks the local capture stream, keeps every sending peer session's
//! outbound senders in sync with it, and assembles inbound remote tracks
//! into a per-peer composite stream. The pipeline is the sole mutator of
//! track attachment across sessions.

mod stream;

pub use stream::{LocalStream, RemoteStream};

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::engine::{RemoteTrack, TrackKind};
use crate::session::PeerSession;
use crate::Result;

/// Local-stream bookkeeping and inbound-track assembly
pub struct MediaPipeline {
    local: RwLock<Option<Arc<LocalStream>>>,
}

impl MediaPipeline {
    pub(crate) fn new() -> Self {
        Self {
            local: RwLock::new(None),
        }
    }

    /// The currently-installed local stream, if any
    pub async fn local_stream(&self) -> Option<Arc<LocalStream>> {
        self.local.read().await.clone()
    }

    /// Install a new local stream.
    ///
    /// Old senders are removed from every session before the new stream
    /// becomes visible; attaching to sending sessions is a separate step
    /// so the caller controls which peers receive media.
    pub(crate) async fn replace_local(
        &self,
        stream: Arc<LocalStream>,
        sessions: &[Arc<PeerSession>],
    ) {
        for session in sessions {
            self.detach_session(session).await;
        }
        *self.local.write().await = Some(stream);
    }

    /// Release the local stream: stop its tracks and remove every
    /// outbound sender from every session.
    pub(crate) async fn clear_local(&self, sessions: &[Arc<PeerSession>]) {
        if let Some(stream) = self.local.write().await.take() {
            stream.stop_all();
        }
        for session in sessions {
            self.detach_session(session).await;
        }
    }

    /// Attach the current local stream's tracks to one session.
    ///
    /// Idempotent per kind: an existing same-kind sender is removed
    /// before the new track is attached, so repeated calls replace
    /// rather than duplicate. Returns whether any track was attached.
    pub(crate) async fn attach_to_session(&self, session: &Arc<PeerSession>) -> Result<bool> {
        let Some(stream) = self.local.read().await.clone() else {
            return Ok(false);
        };

        let mut attached = false;
        for track in stream.tracks() {
            let kind = track.kind();

            if let Some(stale) = session.take_sender(kind) {
                if let Err(e) = session.handle().remove_track(&stale).await {
                    warn!(
                        "peer {}: failed to remove stale {} sender: {}",
                        session.peer_id(),
                        kind,
                        e
                    );
                }
            }

            match session.handle().add_track(Arc::clone(track)).await {
                Ok(sender) => {
                    session.store_sender(kind, sender);
                    debug!("peer {}: attached {} track", session.peer_id(), kind);
                    attached = true;
                }
                Err(e) => {
                    warn!(
                        "peer {}: failed to attach {} track: {}",
                        session.peer_id(),
                        kind,
                        e
                    );
                }
            }
        }

        Ok(attached)
    }

    /// Remove every outbound sender from one session
    pub(crate) async fn detach_session(&self, session: &PeerSession) {
        for (kind, sender) in session.drain_senders() {
            if let Err(e) = session.handle().remove_track(&sender).await {
                warn!(
                    "peer {}: failed to remove {} sender: {}",
                    session.peer_id(),
                    kind,
                    e
                );
            }
        }
    }

    /// Fold an inbound remote track into the peer's composite stream.
    ///
    /// A previously-held track of the same kind is dropped first, so
    /// renegotiation never leaves ghost tracks behind. Returns the track
    /// kind and the composite it now lives in.
    pub(crate) async fn accept_remote_track(
        &self,
        session: &PeerSession,
        track: Arc<dyn RemoteTrack>,
    ) -> (TrackKind, Arc<RemoteStream>) {
        let kind = track.kind();
        let stream = session.remote_stream();

        if let Some(replaced) = stream.insert_track(track) {
            debug!(
                "peer {}: replaced {} track {} after renegotiation",
                session.peer_id(),
                kind,
                replaced.id()
            );
        }

        (kind, stream)
    }
}
