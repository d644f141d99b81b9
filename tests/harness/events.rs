//! Event recorder capturing every callback the orchestrator raises

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use peermesh::{MeshEvents, RemoteStream, TransportState};

/// One recorded callback invocation
#[derive(Clone)]
pub enum EventRecord {
    ConnectionState(TransportState),
    PeerEstablished(String),
    DataChannelReady(String),
    DataReceived { peer_id: String, payload: String },
    VideoStream { peer_id: String, stream: Arc<RemoteStream> },
    AudioStream { peer_id: String, stream: Arc<RemoteStream> },
}

/// [`MeshEvents`] sink that records every invocation in order
pub struct RecordingEvents {
    pub records: Mutex<Vec<EventRecord>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn all(&self) -> Vec<EventRecord> {
        self.records.lock().clone()
    }

    /// How often `on_peer_established` fired for one peer
    pub fn established_count(&self, peer_id: &str) -> usize {
        self.all()
            .iter()
            .filter(|r| matches!(r, EventRecord::PeerEstablished(id) if id == peer_id))
            .count()
    }

    /// How often `on_data_channel_ready` fired for one peer
    pub fn data_ready_count(&self, peer_id: &str) -> usize {
        self.all()
            .iter()
            .filter(|r| matches!(r, EventRecord::DataChannelReady(id) if id == peer_id))
            .count()
    }

    /// Every received data payload with its sender, in arrival order
    pub fn received_payloads(&self) -> Vec<(String, String)> {
        self.all()
            .into_iter()
            .filter_map(|r| match r {
                EventRecord::DataReceived { peer_id, payload } => Some((peer_id, payload)),
                _ => None,
            })
            .collect()
    }

    /// How often `on_video_stream` fired for one peer
    pub fn video_stream_count(&self, peer_id: &str) -> usize {
        self.all()
            .iter()
            .filter(|r| matches!(r, EventRecord::VideoStream { peer_id: id, .. } if id == peer_id))
            .count()
    }

    /// How often `on_audio_stream` fired for one peer
    pub fn audio_stream_count(&self, peer_id: &str) -> usize {
        self.all()
            .iter()
            .filter(|r| matches!(r, EventRecord::AudioStream { peer_id: id, .. } if id == peer_id))
            .count()
    }

    /// Every connection-state transition, in order
    pub fn connection_states(&self) -> Vec<TransportState> {
        self.all()
            .into_iter()
            .filter_map(|r| match r {
                EventRecord::ConnectionState(state) => Some(state),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl MeshEvents for RecordingEvents {
    async fn on_connection_state_changed(&self, state: TransportState) {
        self.records.lock().push(EventRecord::ConnectionState(state));
    }

    async fn on_peer_established(&self, peer_id: &str) {
        self.records
            .lock()
            .push(EventRecord::PeerEstablished(peer_id.to_string()));
    }

    async fn on_data_channel_ready(&self, peer_id: &str) {
        self.records
            .lock()
            .push(EventRecord::DataChannelReady(peer_id.to_string()));
    }

    async fn on_data_received(&self, peer_id: &str, payload: &str) {
        self.records.lock().push(EventRecord::DataReceived {
            peer_id: peer_id.to_string(),
            payload: payload.to_string(),
        });
    }

    async fn on_video_stream(&self, peer_id: &str, stream: Arc<RemoteStream>) {
        self.records.lock().push(EventRecord::VideoStream {
            peer_id: peer_id.to_string(),
            stream,
        });
    }

    async fn on_audio_stream(&self, peer_id: &str, stream: Arc<RemoteStream>) {
        self.records.lock().push(EventRecord::AudioStream {
            peer_id: peer_id.to_string(),
            stream,
        });
    }
}
