//! Local and remote stream aggregates

use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::{LocalTrack, RemoteTrack, TrackKind};

/// The host's capture stream: a bundle of local tracks shared by
/// reference across every sending peer session.
///
/// Capture and device enumeration are the host's concern; the
/// orchestrator only attaches these tracks to peer connections.
pub struct LocalStream {
    id: String,
    tracks: Vec<Arc<dyn LocalTrack>>,
}

impl LocalStream {
    /// Create an empty stream
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tracks: Vec::new(),
        }
    }

    /// Add a track
    pub fn with_track(mut self, track: Arc<dyn LocalTrack>) -> Self {
        self.tracks.push(track);
        self
    }

    /// Stream identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All tracks in the stream
    pub fn tracks(&self) -> &[Arc<dyn LocalTrack>] {
        &self.tracks
    }

    /// First track of the given kind, if any
    pub fn track_of_kind(&self, kind: TrackKind) -> Option<&Arc<dyn LocalTrack>> {
        self.tracks.iter().find(|t| t.kind() == kind)
    }

    /// Stop capture on every track
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Per-peer composite of received tracks.
///
/// Holds at most one video and one audio track, merged into a single
/// aggregate so a sink can render synchronized audio+video without the
/// churn of one stream object per track. A renegotiated track of the
/// same kind replaces its predecessor.
pub struct RemoteStream {
    peer_id: String,
    video: Mutex<Option<Arc<dyn RemoteTrack>>>,
    audio: Mutex<Option<Arc<dyn RemoteTrack>>>,
}

impl RemoteStream {
    /// Create an empty composite for a peer
    pub fn new(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            video: Mutex::new(None),
            audio: Mutex::new(None),
        }
    }

    /// Peer the composite belongs to
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Install a track, replacing any previous track of the same kind.
    ///
    /// Returns the replaced track, if there was one.
    pub(crate) fn insert_track(&self, track: Arc<dyn RemoteTrack>) -> Option<Arc<dyn RemoteTrack>> {
        let slot = match track.kind() {
            TrackKind::Video => &self.video,
            TrackKind::Audio => &self.audio,
        };
        slot.lock().replace(track)
    }

    /// Current video track
    pub fn video(&self) -> Option<Arc<dyn RemoteTrack>> {
        self.video.lock().clone()
    }

    /// Current audio track
    pub fn audio(&self) -> Option<Arc<dyn RemoteTrack>> {
        self.audio.lock().clone()
    }

    /// All present tracks (video first)
    pub fn tracks(&self) -> Vec<Arc<dyn RemoteTrack>> {
        self.video()
            .into_iter()
            .chain(self.audio())
            .collect()
    }

    /// Number of present tracks
    pub fn track_count(&self) -> usize {
        usize::from(self.video.lock().is_some()) + usize::from(self.audio.lock().is_some())
    }

    pub(crate) fn clear(&self) {
        self.video.lock().take();
        self.audio.lock().take();
    }
}
