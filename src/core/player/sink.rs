//! Streaming audio sink abstraction
//!
//! The pipeline appends raw audio to a sink that is already playing, the way
//! a media-source buffer works: request playback first, feed bytes as they
//! arrive, signal end-of-stream when nothing more is coming. The concrete
//! [`PcmBufferSink`] models a PCM buffer whose playhead advances with a
//! [`PlaybackClock`]; tests swap in a [`ManualClock`] and move time by hand.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{PlaybackError, PlaybackResult};

/// How far ahead of the playhead the sink accepts data before reporting
/// not-ready. Generous: back-pressure normally comes from the chunk
/// request/continue loop, not from here.
const MAX_BUFFER_LEAD_MS: u64 = 600_000;

/// Source of playback time
pub trait PlaybackClock: Send + Sync {
    fn now(&self) -> Instant;
}

impl<T: PlaybackClock + ?Sized> PlaybackClock for std::sync::Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Wall-clock time
#[derive(Debug, Default)]
pub struct MonotonicClock;

impl PlaybackClock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-driven clock for tests
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    advanced: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            advanced: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut advanced = self.advanced.lock().unwrap();
        *advanced += duration;
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl PlaybackClock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.advanced.lock().unwrap()
    }
}

/// Streaming audio sink
///
/// Append discipline: callers must check `ready_for_data` and push one frame
/// at a time; `end_of_stream` only after the last frame of the session.
pub trait AudioSink: Send + Sync {
    /// Request playback. Must succeed synchronously even though no audio
    /// exists yet; sound starts once the first frame is appended.
    fn begin(&self) -> PlaybackResult<()>;

    /// Whether the sink will accept another frame right now
    fn ready_for_data(&self) -> bool;

    /// Append one audio frame
    fn append(&self, frame: &[u8]) -> PlaybackResult<()>;

    /// No more audio will ever be appended
    fn end_of_stream(&self);

    /// Withdraw a previous `end_of_stream` so that more audio can be
    /// appended. Fails once the sink is released.
    fn reopen(&self) -> PlaybackResult<()>;

    /// Current playhead position
    fn position_ms(&self) -> u64;

    /// Total duration of audio appended so far
    fn buffered_ms(&self) -> u64;

    fn pause(&self);
    fn resume(&self);

    /// Move the playhead, clamped to the buffered range
    fn seek_ms(&self, position_ms: u64);

    /// Change the playback rate (1.0 is normal)
    fn set_rate(&self, rate: f32);

    /// True once end-of-stream was signaled and the playhead has consumed
    /// everything buffered
    fn ended(&self) -> bool;

    /// Free the sink; all later calls fail or are ignored
    fn release(&self);
}

#[derive(Debug)]
struct PcmSinkInner {
    buffered_bytes: u64,
    /// Playhead position folded up to `anchor`
    position_ms: f64,
    /// When playing, the instant `position_ms` was last folded
    anchor: Option<Instant>,
    rate: f64,
    playing: bool,
    eos: bool,
    released: bool,
}

/// In-memory PCM sink (16-bit mono) driven by a pluggable clock
pub struct PcmBufferSink<C: PlaybackClock> {
    clock: C,
    sample_rate: u32,
    inner: Mutex<PcmSinkInner>,
}

impl<C: PlaybackClock> PcmBufferSink<C> {
    pub fn new(sample_rate: u32, clock: C) -> Self {
        Self {
            clock,
            sample_rate,
            inner: Mutex::new(PcmSinkInner {
                buffered_bytes: 0,
                position_ms: 0.0,
                anchor: None,
                rate: 1.0,
                playing: false,
                eos: false,
                released: false,
            }),
        }
    }

    fn bytes_to_ms(&self, bytes: u64) -> f64 {
        // 16-bit mono
        bytes as f64 * 1000.0 / (self.sample_rate as f64 * 2.0)
    }

    /// Fold elapsed playing time into `position_ms`, stalling at buffer end
    fn fold(&self, inner: &mut PcmSinkInner) {
        let now = self.clock.now();
        if inner.playing {
            if let Some(anchor) = inner.anchor {
                let elapsed_ms = now.duration_since(anchor).as_secs_f64() * 1000.0 * inner.rate;
                let buffered = self.bytes_to_ms(inner.buffered_bytes);
                inner.position_ms = (inner.position_ms + elapsed_ms).min(buffered);
            }
        }
        inner.anchor = Some(now);
    }
}

impl<C: PlaybackClock> AudioSink for PcmBufferSink<C> {
    fn begin(&self) -> PlaybackResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.released {
            return Err(PlaybackError::SinkError("Sink already released".to_string()));
        }
        self.fold(&mut inner);
        inner.playing = true;
        inner.anchor = Some(self.clock.now());
        Ok(())
    }

    fn ready_for_data(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.released {
            return false;
        }
        self.fold(&mut inner);
        let buffered = self.bytes_to_ms(inner.buffered_bytes);
        (buffered - inner.position_ms) < MAX_BUFFER_LEAD_MS as f64
    }

    fn append(&self, frame: &[u8]) -> PlaybackResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.released {
            return Err(PlaybackError::SinkError("Sink already released".to_string()));
        }
        if inner.eos {
            return Err(PlaybackError::SinkError(
                "Cannot append after end of stream".to_string(),
            ));
        }
        self.fold(&mut inner);
        inner.buffered_bytes += frame.len() as u64;
        Ok(())
    }

    fn end_of_stream(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.eos = true;
    }

    fn reopen(&self) -> PlaybackResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.released {
            return Err(PlaybackError::SinkError("Sink already released".to_string()));
        }
        inner.eos = false;
        Ok(())
    }

    fn position_ms(&self) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        self.fold(&mut inner);
        inner.position_ms as u64
    }

    fn buffered_ms(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        self.bytes_to_ms(inner.buffered_bytes) as u64
    }

    fn pause(&self) {
        let mut inner = self.inner.lock().unwrap();
        self.fold(&mut inner);
        inner.playing = false;
    }

    fn resume(&self) {
        let mut inner = self.inner.lock().unwrap();
        self.fold(&mut inner);
        inner.playing = true;
        inner.anchor = Some(self.clock.now());
    }

    fn seek_ms(&self, position_ms: u64) {
        let mut inner = self.inner.lock().unwrap();
        self.fold(&mut inner);
        let buffered = self.bytes_to_ms(inner.buffered_bytes);
        inner.position_ms = (position_ms as f64).min(buffered);
        inner.anchor = Some(self.clock.now());
    }

    fn set_rate(&self, rate: f32) {
        let mut inner = self.inner.lock().unwrap();
        self.fold(&mut inner);
        inner.rate = rate.max(0.0) as f64;
    }

    fn ended(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.eos {
            return false;
        }
        self.fold(&mut inner);
        inner.position_ms >= self.bytes_to_ms(inner.buffered_bytes)
    }

    fn release(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.released = true;
        inner.playing = false;
    }
}
