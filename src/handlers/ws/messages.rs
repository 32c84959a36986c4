//! WebSocket message routing
//!
//! The wire shapes themselves live in [`crate::core::protocol`] so the
//! client pipeline and the relay agree on them by construction. This module
//! adds the routing wrapper the sender task consumes.

use bytes::Bytes;

pub use crate::core::protocol::{AlignmentPayload, ServerMessage, SpeakRequest, WordBoundaryData};

/// Route for outgoing traffic: JSON control messages or binary audio
#[derive(Debug)]
pub enum MessageRoute {
    Outgoing(ServerMessage),
    Binary(Bytes),
}
