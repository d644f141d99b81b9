//! Shared fixtures for orchestrator integration tests
//!
//! Provides a scripted connection engine, a loopback signaling
//! transport, and an event recorder so the full orchestrator can be
//! driven deterministically without network or media stacks.

#![allow(dead_code)]

pub mod engine;
pub mod events;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use peermesh::{ConnectionFactory, MeshConfig, MeshEvents, Orchestrator, SignalingTransport};

pub use engine::{MockChannel, MockFactory, MockLocalTrack, MockPeer, MockRemoteTrack};
pub use events::{EventRecord, RecordingEvents};
pub use transport::MockTransport;

/// One orchestrator wired to mocks, connected and announced
pub struct TestMesh {
    pub orchestrator: Arc<Orchestrator>,
    pub factory: Arc<MockFactory>,
    pub transport: Arc<MockTransport>,
    pub events: Arc<RecordingEvents>,
}

impl TestMesh {
    /// Deliver one raw signaling frame, as if it arrived on the channel
    pub async fn deliver(&self, msg: peermesh::SignalMessage) {
        self.orchestrator.handle_signal(&msg.encode()).await;
    }

    /// The n-th engine handle the factory produced
    pub fn peer(&self, index: usize) -> Arc<MockPeer> {
        self.factory.peer(index)
    }
}

/// Initialize test logging (idempotent per binary)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .try_init();
}

/// Build an orchestrator on mocks and connect it.
///
/// Waits for the NEWPEER announcement so tests start from a settled
/// state, then clears the transport capture.
pub async fn connect_mesh(local_id: &str, send_media: bool, recv_media: bool) -> TestMesh {
    init_tracing();

    let factory = Arc::new(MockFactory::new());
    let transport = Arc::new(MockTransport::new());
    let events = Arc::new(RecordingEvents::new());

    let config = MeshConfig::new().with_local_id(local_id);

    let factory_dyn: Arc<dyn ConnectionFactory> = factory.clone();
    let transport_dyn: Arc<dyn SignalingTransport> = transport.clone();
    let events_dyn: Arc<dyn MeshEvents> = events.clone();

    let orchestrator = Orchestrator::new(config, factory_dyn, transport_dyn, events_dyn);
    orchestrator
        .connect("mock://signal", send_media, recv_media)
        .await
        .expect("mock connect failed");

    wait_until(|| !transport.sent.lock().is_empty()).await;
    transport.drain_sent();

    TestMesh {
        orchestrator,
        factory,
        transport,
        events,
    }
}

/// Poll a condition until it holds or the test times out
pub async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not met within timeout");
}

/// Shuttle signaling frames between two meshes until traffic dries up
pub async fn pump(a: &TestMesh, b: &TestMesh) {
    loop {
        let from_a = a.transport.drain_sent();
        let from_b = b.transport.drain_sent();

        if from_a.is_empty() && from_b.is_empty() {
            break;
        }

        for raw in from_a {
            b.orchestrator.handle_signal(&raw).await;
        }
        for raw in from_b {
            a.orchestrator.handle_signal(&raw).await;
        }
    }
}
