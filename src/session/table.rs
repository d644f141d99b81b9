//! Session table: the single source of truth for which peers exist

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use super::PeerSession;
use crate::Result;

/// Mapping from peer id to its session.
///
/// All session creation and destruction funnels through this table;
/// nothing else holds owning references across operations.
pub struct SessionTable {
    sessions: RwLock<HashMap<String, Arc<PeerSession>>>,
}

impl SessionTable {
    pub(crate) fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a session
    pub async fn get(&self, peer_id: &str) -> Option<Arc<PeerSession>> {
        self.sessions.read().await.get(peer_id).cloned()
    }

    /// True when a session exists for `peer_id`
    pub async fn contains(&self, peer_id: &str) -> bool {
        self.sessions.read().await.contains_key(peer_id)
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// True when no sessions exist
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Ids of all known peers
    pub async fn peer_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// All live sessions
    pub async fn all(&self) -> Vec<Arc<PeerSession>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Get the session for `peer_id`, creating it with `create` when
    /// absent.
    ///
    /// The write lock is held across creation so two interleaved calls
    /// for the same id can never race into two engine handles; the
    /// second caller observes the first one's session. Returns the
    /// session and whether it was newly created.
    pub(crate) async fn ensure<F, Fut>(
        &self,
        peer_id: &str,
        create: F,
    ) -> Result<(Arc<PeerSession>, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<PeerSession>>>,
    {
        let mut sessions = self.sessions.write().await;

        if let Some(existing) = sessions.get(peer_id) {
            debug!("session {} already exists, reusing", peer_id);
            return Ok((Arc::clone(existing), false));
        }

        let session = create().await?;
        sessions.insert(peer_id.to_string(), Arc::clone(&session));
        info!("created peer session {} (total: {})", peer_id, sessions.len());

        Ok((session, true))
    }

    /// Remove a session from the table, handing ownership to the caller
    pub(crate) async fn remove(&self, peer_id: &str) -> Option<Arc<PeerSession>> {
        let removed = self.sessions.write().await.remove(peer_id);
        if removed.is_some() {
            debug!("removed peer session {}", peer_id);
        }
        removed
    }

    /// Remove and return every session
    pub(crate) async fn drain(&self) -> Vec<Arc<PeerSession>> {
        self.sessions.write().await.drain().map(|(_, s)| s).collect()
    }
}
