//! # WebSocket Speech Relay
//!
//! One WebSocket connection carries one voicing session. The client sends
//! JSON speak requests, one at a time; the server synthesizes each chunk via
//! the selected backend and streams results back.
//!
//! ## WebSocket API
//!
//! ### Connection Flow
//! 1. Client connects to `/v1/voice` (with `?token=` or an `Authorization: Bearer`
//!    header when the server has an auth token configured)
//! 2. Client sends a speak request for one text chunk
//! 3. Server streams binary audio frames interleaved with JSON alignment
//!    messages, ending with `complete`
//! 4. Client sends the next chunk; the cycle repeats on the same socket
//!
//! ### Message Types
//!
//! **Incoming:**
//! - `{"text": "...", "voiceId": "...", "provider": "charalign|wordmark", "voiceName": "...", "contextText": "..."}` - Voice one chunk (all fields but `text` optional)
//!
//! **Outgoing:**
//! - **Binary messages** - Raw audio bytes for the chunk in progress
//! - `{"type": "wordBoundary", "data": {"word": "...", "textOffset": 0, "audioOffsetMs": 120, "durationMs": 300}}` - Incremental word timing (word-boundary backend)
//! - `{"type": "alignment", "data": {...}}` - Final per-chunk alignment: character timestamps (character backend) or `{"durationMs": N}` (word-boundary backend)
//! - `{"type": "complete"}` - Chunk done; the next request may be sent
//! - `{"type": "error", "message": "..."}` - Failure; fatal for the session unless it answers a malformed request

pub mod handler;
pub mod messages;
pub mod processor;

pub use handler::ws_speech_handler;
