//! Client-side audio playback
//!
//! The buffer player consumes binary audio frames as they stream in and
//! plays them through an [`AudioSink`] long before the full utterance
//! exists. The sink is a trait so tests can drive playback time by hand.

pub mod callbacks;
pub mod player;
pub mod sink;

pub use callbacks::{
    PlaybackErrorCallback, PlayerStateCallback, SegmentCompleteCallback, WordIndexCallback,
};
pub use player::{BufferPlayer, PlayerState};
pub use sink::{AudioSink, ManualClock, MonotonicClock, PcmBufferSink, PlaybackClock};

/// Playback-specific error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlaybackError {
    #[error("Sink error: {0}")]
    SinkError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Session error: {0}")]
    SessionError(String),
}

/// Result type for playback operations
pub type PlaybackResult<T> = Result<T, PlaybackError>;
