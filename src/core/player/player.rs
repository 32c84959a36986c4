//! Buffer player state machine
//!
//! Sits between the transport (which delivers frames at network speed) and
//! the sink (which consumes them at playback speed). Incoming frames queue
//! locally and are pushed into the sink one at a time, only when the sink
//! reports it is ready; end-of-stream reaches the sink only after the whole
//! session has no more chunks to send and the local queue is empty.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use super::sink::AudioSink;
use super::{PlaybackError, PlaybackResult};

/// Player lifecycle: `Idle → Loading → Playing ⇄ Paused → Stopped`,
/// with `Ended` reached only through natural completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped,
    Ended,
}

/// Streaming audio player over an [`AudioSink`]
pub struct BufferPlayer {
    sink: Arc<dyn AudioSink>,
    state: PlayerState,
    frames: VecDeque<Bytes>,
    /// No further frames will arrive for this session
    stream_finished: bool,
    eos_sent: bool,
}

impl BufferPlayer {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            sink,
            state: PlayerState::Idle,
            frames: VecDeque::new(),
            stream_finished: false,
            eos_sent: false,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Request playback synchronously, before any audio exists.
    /// Sound starts as soon as the first frame is buffered.
    pub fn play(&mut self) -> PlaybackResult<()> {
        self.sink.begin()?;
        self.state = PlayerState::Loading;
        Ok(())
    }

    /// Queue an incoming audio frame and feed the sink if it is ready
    pub fn push_frame(&mut self, frame: Bytes) -> PlaybackResult<()> {
        if matches!(self.state, PlayerState::Stopped | PlayerState::Ended) {
            return Ok(());
        }
        self.frames.push_back(frame);
        self.pump()?;
        if self.state == PlayerState::Loading {
            self.state = PlayerState::Playing;
        }
        Ok(())
    }

    /// No more frames will arrive; once the local queue drains, signal
    /// end-of-stream to the sink
    pub fn finish_stream(&mut self) -> PlaybackResult<()> {
        self.stream_finished = true;
        self.pump()
    }

    /// Push queued frames into the sink, one at a time, while it is ready
    fn pump(&mut self) -> PlaybackResult<()> {
        while self.sink.ready_for_data() {
            match self.frames.pop_front() {
                Some(frame) => self.sink.append(&frame)?,
                None => break,
            }
        }
        if self.stream_finished && self.frames.is_empty() && !self.eos_sent {
            debug!("All frames consumed, signaling end of stream to sink");
            self.sink.end_of_stream();
            self.eos_sent = true;
        }
        Ok(())
    }

    /// Withdraw a finished stream so more audio can arrive, bringing an
    /// `Ended` player back to `Playing`. Fails after `stop`.
    pub fn reopen(&mut self) -> PlaybackResult<()> {
        if self.state == PlayerState::Stopped {
            return Err(PlaybackError::SessionError(
                "Cannot reopen a stopped player".to_string(),
            ));
        }
        self.sink.reopen()?;
        self.stream_finished = false;
        self.eos_sent = false;
        if self.state == PlayerState::Ended {
            self.sink.resume();
            self.state = PlayerState::Playing;
        }
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.state == PlayerState::Playing {
            self.sink.pause();
            self.state = PlayerState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == PlayerState::Paused {
            self.sink.resume();
            self.state = PlayerState::Playing;
        }
    }

    /// Stop playback and release the sink. Idempotent.
    pub fn stop(&mut self) {
        if self.state == PlayerState::Stopped {
            return;
        }
        self.frames.clear();
        self.sink.release();
        self.state = PlayerState::Stopped;
    }

    pub fn position_ms(&self) -> u64 {
        self.sink.position_ms()
    }

    pub fn buffered_ms(&self) -> u64 {
        self.sink.buffered_ms()
    }

    /// Absolute seek by fraction of the buffered duration
    pub fn seek_to_fraction(&mut self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        let target = (self.buffered_ms() as f64 * fraction) as u64;
        self.sink.seek_ms(target);
    }

    /// Relative seek by signed seconds, clamped to the buffered range
    pub fn seek_by_seconds(&mut self, seconds: f64) {
        let delta_ms = (seconds * 1000.0) as i64;
        let current = self.position_ms() as i64;
        let target = (current + delta_ms).max(0) as u64;
        self.sink.seek_ms(target.min(self.buffered_ms()));
    }

    /// Absolute seek in milliseconds, clamped to the buffered range
    pub fn seek_to_ms(&mut self, position_ms: u64) {
        self.sink.seek_ms(position_ms.min(self.buffered_ms()));
    }

    pub fn set_speed(&mut self, rate: f32) {
        self.sink.set_rate(rate);
    }

    /// Drive lazy work: pump pending frames and detect natural completion.
    /// Returns true when the state changed.
    pub fn tick(&mut self) -> PlaybackResult<bool> {
        if matches!(self.state, PlayerState::Stopped | PlayerState::Ended) {
            return Ok(false);
        }
        self.pump()?;
        if self.eos_sent && self.sink.ended() && self.state != PlayerState::Ended {
            self.state = PlayerState::Ended;
            return Ok(true);
        }
        Ok(false)
    }
}

impl std::fmt::Debug for BufferPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPlayer")
            .field("state", &self.state)
            .field("queued_frames", &self.frames.len())
            .field("stream_finished", &self.stream_finished)
            .finish()
    }
}

impl PlayerState {
    pub fn is_active(&self) -> bool {
        matches!(self, PlayerState::Loading | PlayerState::Playing | PlayerState::Paused)
    }
}
