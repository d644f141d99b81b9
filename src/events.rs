//! Application event surface
//!
//! The host implements [`MeshEvents`] and injects it at orchestrator
//! construction. Every method has a no-op default body, so hosts only
//! override the events they care about.

use std::sync::Arc;

use async_trait::async_trait;

use crate::media::RemoteStream;
use crate::transport::TransportState;

/// Callbacks the orchestrator raises toward the host application
#[async_trait]
pub trait MeshEvents: Send + Sync {
    /// The signaling link opened, closed, or failed
    async fn on_connection_state_changed(&self, state: TransportState) {
        let _ = state;
    }

    /// A direct connection to `peer_id` reached the connected state.
    /// May fire more than once for the same peer; treat it as idempotent.
    async fn on_peer_established(&self, peer_id: &str) {
        let _ = peer_id;
    }

    /// The data channel to `peer_id` is ready in both directions
    async fn on_data_channel_ready(&self, peer_id: &str) {
        let _ = peer_id;
    }

    /// A data-channel message arrived from `peer_id`
    async fn on_data_received(&self, peer_id: &str, payload: &str) {
        let _ = (peer_id, payload);
    }

    /// `peer_id`'s composite stream gained a video track
    async fn on_video_stream(&self, peer_id: &str, stream: Arc<RemoteStream>) {
        let _ = (peer_id, stream);
    }

    /// `peer_id`'s composite stream gained an audio track
    async fn on_audio_stream(&self, peer_id: &str, stream: Arc<RemoteStream>) {
        let _ = (peer_id, stream);
    }
}

/// Event sink that ignores everything; useful for tools that only drive
/// the mesh
pub struct NoopEvents;

#[async_trait]
impl MeshEvents for NoopEvents {}
