//! Loopback signaling transport for orchestrator tests

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use peermesh::{Error, Result, SignalKind, SignalMessage, SignalingTransport, TransportEvent};

/// Captures outbound frames and lets tests inject inbound events
pub struct MockTransport {
    tx: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    pub sent: Mutex<Vec<String>>,
    pub closed: AtomicBool,
    pub fail_open: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            tx: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            fail_open: AtomicBool::new(false),
        }
    }

    /// Push an event into the orchestrator's transport loop
    pub async fn inject(&self, event: TransportEvent) {
        let tx = self.tx.lock().clone().expect("transport not open");
        tx.send(event).await.expect("event loop gone");
    }

    /// Decoded view of every captured outbound frame
    pub fn sent_messages(&self) -> Vec<SignalMessage> {
        self.sent
            .lock()
            .iter()
            .map(|raw| SignalMessage::decode(raw))
            .collect()
    }

    /// Kinds of every captured outbound frame, in order
    pub fn sent_kinds(&self) -> Vec<SignalKind> {
        self.sent_messages().into_iter().map(|m| m.kind).collect()
    }

    /// Number of captured frames of one kind
    pub fn count_kind(&self, kind: SignalKind) -> usize {
        self.sent_kinds().into_iter().filter(|k| *k == kind).count()
    }

    /// Take every captured frame, clearing the capture
    pub fn drain_sent(&self) -> Vec<String> {
        self.sent.lock().drain(..).collect()
    }
}

#[async_trait]
impl SignalingTransport for MockTransport {
    async fn open(&self, _endpoint: &str) -> Result<mpsc::Receiver<TransportEvent>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::Transport("scripted open failure".to_string()));
        }

        let (tx, rx) = mpsc::channel(64);
        tx.send(TransportEvent::Opened)
            .await
            .expect("fresh channel");
        *self.tx.lock() = Some(tx);
        self.closed.store(false, Ordering::SeqCst);

        Ok(rx)
    }

    async fn send(&self, text: &str) -> Result<()> {
        self.sent.lock().push(text.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.tx.lock().take();
        Ok(())
    }
}
