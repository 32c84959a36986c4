//! Callback types for the playback pipeline

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::{PlaybackError, player::PlayerState};

/// Callback fired when the word under the playhead changes.
/// Receives the word index local to the currently displayed segment.
pub type WordIndexCallback =
    Arc<dyn Fn(usize) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback fired when playback crosses a segment's end
pub type SegmentCompleteCallback =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback fired once on a session-fatal error
pub type PlaybackErrorCallback =
    Arc<dyn Fn(PlaybackError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback fired when the player state machine transitions
pub type PlayerStateCallback =
    Arc<dyn Fn(PlayerState) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;
