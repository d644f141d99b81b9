//! Error types for the peermesh crate

use thiserror::Error;

/// Errors produced by the orchestrator and its collaborators
#[derive(Debug, Error)]
pub enum Error {
    /// Signaling transport unavailable, closed, or refused
    #[error("transport error: {0}")]
    Transport(String),

    /// Connection engine operation failed (SDP, ICE, track plumbing)
    #[error("engine error: {0}")]
    Engine(String),

    /// Malformed or out-of-context signaling message
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Data channel creation or send failure
    #[error("data channel error: {0}")]
    DataChannel(String),

    /// Local media attachment failure
    #[error("media error: {0}")]
    Media(String),

    /// Peer session lifecycle failure
    #[error("session error: {0}")]
    Session(String),
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
