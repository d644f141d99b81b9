//! Signaling message type and wire codec

use std::fmt;

/// Receiver id addressing every participant on the signaling channel
pub const BROADCAST: &str = "ALL";

/// Field delimiter of the wire format
const DELIMITER: char = '|';

/// Control message kinds exchanged over the signaling channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// A participant announces its presence (broadcast)
    NewPeer,
    /// Reply to [`SignalKind::NewPeer`], carrying the sender's session count
    NewPeerAck,
    /// SDP offer addressed to one peer
    Offer,
    /// SDP answer addressed to one peer
    Answer,
    /// ICE candidate addressed to one peer
    Candidate,
    /// A participant announces its departure; its sessions must be destroyed
    Dispose,
    /// Data-channel readiness acknowledgment
    Data,
    /// Remote side observed its connection to us reach the connected state
    Complete,
    /// Anything the decoder did not recognize; dropped by the dispatcher
    Unknown,
}

impl SignalKind {
    /// Wire token for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::NewPeer => "NEWPEER",
            SignalKind::NewPeerAck => "NEWPEERACK",
            SignalKind::Offer => "OFFER",
            SignalKind::Answer => "ANSWER",
            SignalKind::Candidate => "CANDIDATE",
            SignalKind::Dispose => "DISPOSE",
            SignalKind::Data => "DATA",
            SignalKind::Complete => "COMPLETE",
            SignalKind::Unknown => "UNKNOWN",
        }
    }

    /// Parse a wire token; anything unrecognized maps to `Unknown`
    pub fn parse(token: &str) -> Self {
        match token {
            "NEWPEER" => SignalKind::NewPeer,
            "NEWPEERACK" => SignalKind::NewPeerAck,
            "OFFER" => SignalKind::Offer,
            "ANSWER" => SignalKind::Answer,
            "CANDIDATE" => SignalKind::Candidate,
            "DISPOSE" => SignalKind::Dispose,
            "DATA" => SignalKind::Data,
            "COMPLETE" => SignalKind::Complete,
            _ => SignalKind::Unknown,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable signaling control message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMessage {
    /// Message kind
    pub kind: SignalKind,
    /// Sending participant id
    pub sender: String,
    /// Receiving participant id, or [`BROADCAST`]
    pub receiver: String,
    /// Opaque payload: SDP blob, JSON ICE candidate, or app data
    pub payload: String,
    /// Sender's view of how many peer sessions it holds
    pub peer_count: u32,
    /// Whether the sender intends to send media
    pub media_sender: bool,
}

impl SignalMessage {
    /// Create a message with an empty payload and defaulted counters
    pub fn new(kind: SignalKind, sender: impl Into<String>, receiver: impl Into<String>) -> Self {
        Self {
            kind,
            sender: sender.into(),
            receiver: receiver.into(),
            payload: String::new(),
            peer_count: 0,
            media_sender: false,
        }
    }

    /// Set the payload
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Set the sender's session count
    pub fn with_peer_count(mut self, count: u32) -> Self {
        self.peer_count = count;
        self
    }

    /// Set the media-send intent flag
    pub fn with_media_sender(mut self, media_sender: bool) -> Self {
        self.media_sender = media_sender;
        self
    }

    /// True when the message is addressed to everyone
    pub fn is_broadcast(&self) -> bool {
        self.receiver == BROADCAST
    }

    /// True when the message is addressed to `id` directly or broadcast
    pub fn addressed_to(&self, id: &str) -> bool {
        self.receiver == id || self.is_broadcast()
    }

    /// Serialize to the wire form
    pub fn encode(&self) -> String {
        format!(
            "{}{d}{}{d}{}{d}{}{d}{}{d}{}",
            self.kind.as_str(),
            self.sender,
            self.receiver,
            self.payload,
            self.peer_count,
            self.media_sender,
            d = DELIMITER,
        )
    }

    /// Parse the wire form.
    ///
    /// Never fails: fields beyond the split bounds default to empty /
    /// `0` / `false`, and an unrecognized kind token decodes to
    /// [`SignalKind::Unknown`].
    pub fn decode(raw: &str) -> Self {
        let mut fields = raw.splitn(6, DELIMITER);

        let kind = SignalKind::parse(fields.next().unwrap_or(""));
        let sender = fields.next().unwrap_or("").to_string();
        let receiver = fields.next().unwrap_or("").to_string();
        let payload = fields.next().unwrap_or("").to_string();
        let peer_count = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
        let media_sender = fields
            .next()
            .map(|f| f.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            kind,
            sender,
            receiver,
            payload,
            peer_count,
            media_sender,
        }
    }
}
