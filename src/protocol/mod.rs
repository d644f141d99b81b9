//! Signaling wire protocol
//!
//! One control message per text frame, `|`-delimited:
//!
//! ```text
//! KIND|SENDER_ID|RECEIVER_ID|PAYLOAD|PEER_COUNT|IS_MEDIA_SENDER
//! ```
//!
//! The codec is pure and total: encoding never fails, and decoding maps
//! any input — including garbage — to a [`SignalMessage`] with defaulted
//! fields rather than an error. The dispatcher drops what it cannot use.

mod message;

pub use message::{SignalKind, SignalMessage, BROADCAST};
