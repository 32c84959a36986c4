//! Client-side playback session
//!
//! A session is one continuous voicing run: segments of text queued in
//! order, chunks streamed one at a time over a single socket, audio played
//! as it arrives, and one global word timeline spanning everything voiced.

pub mod manager;
pub mod queue;
pub mod transport;

pub use manager::{PlaybackManager, SinkFactory, SpeechOptions};
pub use queue::{PendingCompletion, Segment, SegmentQueue};
pub use transport::{TransportEvent, TransportSession};
