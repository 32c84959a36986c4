//! Playback session orchestration
//!
//! The manager ties the whole client pipeline together: it segments incoming
//! text, keeps exactly one chunk request in flight on the transport, feeds
//! audio frames to the buffer player, grows the global word timeline from
//! alignment events, and drives a periodic tick that resolves the word under
//! the playhead and fires deferred segment completions.
//!
//! Starting a new session invalidates the old one by bumping a sequence
//! number; background tasks from the stale session observe the bump and
//! exit without touching shared state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::core::alignment::AlignmentReconstructor;
use crate::core::player::{
    AudioSink, BufferPlayer, MonotonicClock, PcmBufferSink, PlaybackError, PlaybackErrorCallback,
    PlaybackResult, PlayerState, PlayerStateCallback, SegmentCompleteCallback, WordIndexCallback,
};
use crate::core::protocol::{AlignmentPayload, SpeakRequest};
use crate::core::session::queue::{PendingCompletion, Segment, SegmentQueue};
use crate::core::session::transport::{TransportEvent, TransportSession};
use crate::core::text::{Segmenter, DEFAULT_MAX_CHUNK_CHARS};
use crate::core::timeline::WordTimeline;
use crate::core::tts::ProviderKind;

/// Playback housekeeping cadence
const TICK_INTERVAL_MS: u64 = 50;

/// Sample rate of the audio the relay streams back
const SESSION_SAMPLE_RATE: u32 = 24_000;

/// Builds a fresh sink for each session
pub type SinkFactory = Arc<dyn Fn() -> Arc<dyn AudioSink> + Send + Sync>;

/// Per-session voice selection, forwarded verbatim in every chunk request
#[derive(Debug, Clone, Default)]
pub struct SpeechOptions {
    pub voice_id: Option<String>,
    pub provider: Option<ProviderKind>,
    pub voice_name: Option<String>,
}

#[derive(Clone, Default)]
struct CallbackSet {
    on_word: Option<WordIndexCallback>,
    on_error: Option<PlaybackErrorCallback>,
    on_state: Option<PlayerStateCallback>,
}

/// Everything the transport task, the ticker and the public API share.
/// One lock; every path takes it briefly and never holds it across awaits.
struct SessionShared {
    player: BufferPlayer,
    timeline: WordTimeline,
    reconstructor: AlignmentReconstructor,
    queue: SegmentQueue,
    /// Segments fully sent, waiting for the playhead to cross their end
    pending: VecDeque<PendingCompletion>,
    segmenter: Segmenter,
    transport: Option<TransportSession>,
    options: SpeechOptions,
    callbacks: CallbackSet,
    chunk_in_flight: bool,
    /// Duration reported by the chunk's alignment message, consumed by the
    /// next `complete`
    pending_chunk_duration: u64,
    /// Global word index where the currently displayed segment starts
    words_displayed_base: usize,
    /// Global word index where the currently voicing segment starts
    segment_word_base: usize,
    last_emitted_word: Option<usize>,
    last_reported_state: PlayerState,
    /// End-of-stream has been handed to the player; a later enqueue reopens
    input_finished: bool,
    errored: bool,
}

impl SessionShared {
    /// Keep the transport saturated with exactly one outstanding chunk
    fn send_next_chunk(&mut self) -> PlaybackResult<()> {
        if self.chunk_in_flight || self.errored {
            return Ok(());
        }
        loop {
            if !self.queue.has_active() && !self.queue.activate_next() {
                if !self.input_finished {
                    debug!("Segment queue drained, finishing audio stream");
                    self.input_finished = true;
                    self.player.finish_stream()?;
                }
                return Ok(());
            }

            if let Some(chunk) = self.queue.take_next_chunk() {
                let context_text = self.queue.active_context().filter(|c| c != &chunk);
                let request = SpeakRequest {
                    text: chunk,
                    voice_id: self.options.voice_id.clone(),
                    provider: self.options.provider,
                    voice_name: self.options.voice_name.clone(),
                    context_text,
                };
                let transport = self.transport.as_ref().ok_or_else(|| {
                    PlaybackError::SessionError("Transport already closed".to_string())
                })?;
                transport.send_chunk(request)?;
                self.chunk_in_flight = true;
                return Ok(());
            }

            // Active segment exhausted. If it was the last one, text carried
            // over from its final page still needs to be voiced.
            if !self.queue.has_pending() {
                let tail = self.segmenter.flush();
                if !tail.is_empty() {
                    self.queue.extend_active_chunks(tail);
                    continue;
                }
            }

            if let Some(segment) = self.queue.retire_active() {
                let word_index_end = self.timeline.len();
                self.pending.push_back(PendingCompletion {
                    audio_end_ms: self.reconstructor.offset_ms(),
                    word_index_end,
                    word_count: word_index_end - self.segment_word_base,
                    callback: segment.on_complete,
                });
                self.segment_word_base = word_index_end;
            }
        }
    }

    /// Apply one transport event to the session
    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Audio(frame) => {
                if let Err(e) = self.player.push_frame(frame) {
                    self.fatal(e);
                }
            }
            TransportEvent::WordBoundary(data) => {
                self.reconstructor.push_word_boundary(
                    &mut self.timeline,
                    data.audio_offset_ms,
                    data.duration_ms,
                );
            }
            TransportEvent::Alignment(payload) => match payload {
                AlignmentPayload::Characters(alignment) => {
                    self.pending_chunk_duration = alignment.end_ms();
                    self.reconstructor
                        .push_char_alignment(&mut self.timeline, &alignment);
                }
                AlignmentPayload::Summary { duration_ms } => {
                    self.pending_chunk_duration = duration_ms;
                }
            },
            TransportEvent::ChunkComplete => {
                let duration = std::mem::take(&mut self.pending_chunk_duration);
                self.reconstructor.finish_chunk(duration);
                self.chunk_in_flight = false;
                if let Err(e) = self.send_next_chunk() {
                    self.fatal(e);
                }
            }
            TransportEvent::Error(message) => {
                self.fatal(PlaybackError::TransportError(message));
            }
            TransportEvent::Closed => {
                if !self.input_finished {
                    self.fatal(PlaybackError::TransportError(
                        "Connection closed mid-session".to_string(),
                    ));
                }
            }
        }
    }

    /// Periodic housekeeping: pump the player, resolve deferred segment
    /// completions, emit word and state changes
    fn tick(&mut self) {
        if let Err(e) = self.player.tick() {
            self.fatal(e);
            return;
        }

        let position = self.player.position_ms();
        let ended = self.player.state() == PlayerState::Ended;
        loop {
            let ready = match self.pending.front() {
                Some(front) => position >= front.audio_end_ms || ended,
                None => false,
            };
            if !ready {
                break;
            }
            if let Some(completion) = self.pending.pop_front() {
                debug!(
                    "Segment complete at {}ms ({} words)",
                    completion.audio_end_ms, completion.word_count
                );
                self.emit_final_word(&completion);
                self.words_displayed_base = completion.word_index_end;
                self.last_emitted_word = None;
                if let Some(callback) = completion.callback {
                    tokio::spawn(callback());
                }
            }
        }

        self.emit_word();
        self.emit_state();
    }

    /// A retiring segment reports its last word even when the tick that
    /// observed end of audio jumped straight past it
    fn emit_final_word(&mut self, completion: &PendingCompletion) {
        if completion.word_count == 0 {
            return;
        }
        let local = completion.word_count - 1;
        if self.last_emitted_word.map_or(true, |seen| seen < local) {
            if let Some(callback) = &self.callbacks.on_word {
                tokio::spawn(callback(local));
            }
        }
    }

    /// Resolve and report the word under the playhead, local to the
    /// currently displayed segment
    fn emit_word(&mut self) {
        if !self.player.state().is_active() {
            return;
        }
        let position = self.player.position_ms();
        let Some(global) = self.timeline.index_at(position) else {
            return;
        };
        if global < self.words_displayed_base {
            return;
        }
        let local = global - self.words_displayed_base;
        if self.last_emitted_word != Some(local) {
            self.last_emitted_word = Some(local);
            if let Some(callback) = &self.callbacks.on_word {
                tokio::spawn(callback(local));
            }
        }
    }

    fn emit_state(&mut self) {
        let state = self.player.state();
        if state != self.last_reported_state {
            self.last_reported_state = state;
            if let Some(callback) = &self.callbacks.on_state {
                tokio::spawn(callback(state));
            }
        }
    }

    /// Session-fatal failure. Already-buffered audio plays out; if nothing
    /// is buffered the player stops outright. Fires the error callback once.
    fn fatal(&mut self, error: PlaybackError) {
        if self.errored {
            return;
        }
        self.errored = true;
        error!("Session failed: {error}");
        self.queue.clear();
        if let Some(transport) = self.transport.take() {
            transport.close();
        }
        if self.player.buffered_ms() == 0 {
            self.player.stop();
        } else {
            self.input_finished = true;
            let _ = self.player.finish_stream();
        }
        self.emit_state();
        if let Some(callback) = &self.callbacks.on_error {
            tokio::spawn(callback(error));
        }
    }

    /// Add a segment to the live session, reviving a finished stream if
    /// playback already ran out
    fn enqueue(
        &mut self,
        text: &str,
        on_complete: Option<SegmentCompleteCallback>,
    ) -> PlaybackResult<()> {
        if self.errored {
            return Err(PlaybackError::SessionError(
                "Session already failed".to_string(),
            ));
        }
        if self.player.state() == PlayerState::Stopped {
            return Err(PlaybackError::SessionError(
                "Session already stopped".to_string(),
            ));
        }
        let chunks = self.segmenter.segment(text);
        self.queue
            .enqueue(Segment::new(chunks, Some(text.to_string()), on_complete));
        if self.input_finished {
            self.player.reopen()?;
            self.input_finished = false;
        }
        self.send_next_chunk()
    }
}

struct SessionCtx {
    id: u64,
    shared: Mutex<SessionShared>,
}

/// Client-side playback orchestrator
///
/// One manager holds at most one live session; `play` replaces it, `enqueue`
/// extends it. All methods are cheap and safe to call from any task.
pub struct PlaybackManager {
    server_url: String,
    auth_token: Option<String>,
    max_chunk_chars: usize,
    sink_factory: SinkFactory,
    session_seq: Arc<AtomicU64>,
    current: Mutex<Option<Arc<SessionCtx>>>,
    callbacks: StdMutex<CallbackSet>,
}

impl PlaybackManager {
    pub fn new(server_url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self::with_sink_factory(
            server_url,
            auth_token,
            Arc::new(|| {
                Arc::new(PcmBufferSink::new(SESSION_SAMPLE_RATE, MonotonicClock))
                    as Arc<dyn AudioSink>
            }),
        )
    }

    /// Construct with a custom sink per session; tests inject a
    /// manually-clocked sink here
    pub fn with_sink_factory(
        server_url: impl Into<String>,
        auth_token: Option<String>,
        sink_factory: SinkFactory,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            auth_token,
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            sink_factory,
            session_seq: Arc::new(AtomicU64::new(0)),
            current: Mutex::new(None),
            callbacks: StdMutex::new(CallbackSet::default()),
        }
    }

    pub fn set_max_chunk_chars(&mut self, max_chunk_chars: usize) {
        self.max_chunk_chars = max_chunk_chars;
    }

    /// Fired when the word under the playhead changes; the index is local
    /// to the currently displayed segment
    pub fn on_word_change(&self, callback: WordIndexCallback) {
        self.callbacks.lock().unwrap().on_word = Some(callback);
    }

    /// Fired once per session-fatal error
    pub fn on_error(&self, callback: PlaybackErrorCallback) {
        self.callbacks.lock().unwrap().on_error = Some(callback);
    }

    /// Fired on player state transitions
    pub fn on_state_change(&self, callback: PlayerStateCallback) {
        self.callbacks.lock().unwrap().on_state = Some(callback);
    }

    /// Start a new session, replacing any running one
    pub async fn play(
        &self,
        text: &str,
        options: SpeechOptions,
        on_complete: Option<SegmentCompleteCallback>,
    ) -> PlaybackResult<()> {
        self.stop().await;
        let id = self.session_seq.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Starting playback session {id}");

        let (transport, events) =
            TransportSession::connect(&self.server_url, self.auth_token.as_deref()).await?;

        let mut player = BufferPlayer::new((self.sink_factory)());
        player.play()?;
        let last_reported_state = player.state();

        let mut segmenter = Segmenter::new(self.max_chunk_chars);
        let chunks = segmenter.segment(text);
        let mut queue = SegmentQueue::new();
        queue.enqueue(Segment::new(chunks, Some(text.to_string()), on_complete));

        let mut shared = SessionShared {
            player,
            timeline: WordTimeline::new(),
            reconstructor: AlignmentReconstructor::new(),
            queue,
            pending: VecDeque::new(),
            segmenter,
            transport: Some(transport),
            options,
            callbacks: self.callbacks.lock().unwrap().clone(),
            chunk_in_flight: false,
            pending_chunk_duration: 0,
            words_displayed_base: 0,
            segment_word_base: 0,
            last_emitted_word: None,
            last_reported_state,
            input_finished: false,
            errored: false,
        };
        shared.send_next_chunk()?;

        let ctx = Arc::new(SessionCtx {
            id,
            shared: Mutex::new(shared),
        });
        *self.current.lock().await = Some(ctx.clone());

        tokio::spawn(run_events(ctx.clone(), events, self.session_seq.clone()));
        tokio::spawn(run_ticker(ctx, self.session_seq.clone()));
        Ok(())
    }

    /// Add a page of text to the running session
    pub async fn enqueue(
        &self,
        text: &str,
        on_complete: Option<SegmentCompleteCallback>,
    ) -> PlaybackResult<()> {
        self.with_session(|shared| shared.enqueue(text, on_complete))
            .await?
    }

    /// Stop the running session and invalidate its background tasks
    pub async fn stop(&self) {
        self.session_seq.fetch_add(1, Ordering::SeqCst);
        if let Some(ctx) = self.current.lock().await.take() {
            let mut shared = ctx.shared.lock().await;
            if let Some(transport) = shared.transport.take() {
                transport.close();
            }
            shared.queue.clear();
            shared.pending.clear();
            shared.player.stop();
            shared.emit_state();
        }
    }

    pub async fn pause(&self) -> PlaybackResult<()> {
        self.with_session(|shared| {
            shared.player.pause();
            shared.emit_state();
        })
        .await
    }

    pub async fn resume(&self) -> PlaybackResult<()> {
        self.with_session(|shared| {
            shared.player.resume();
            shared.emit_state();
        })
        .await
    }

    /// Jump forward within the buffered audio
    pub async fn seek_forward(&self, seconds: f64) -> PlaybackResult<()> {
        self.with_session(|shared| {
            shared.player.seek_by_seconds(seconds.abs());
            shared.emit_word();
        })
        .await
    }

    /// Jump backward within the buffered audio
    pub async fn seek_backward(&self, seconds: f64) -> PlaybackResult<()> {
        self.with_session(|shared| {
            shared.player.seek_by_seconds(-seconds.abs());
            shared.emit_word();
        })
        .await
    }

    /// Seek to a fraction of the buffered duration
    pub async fn seek_to_position(&self, fraction: f64) -> PlaybackResult<()> {
        self.with_session(|shared| {
            shared.player.seek_to_fraction(fraction);
            shared.emit_word();
        })
        .await
    }

    /// Seek so the given word of the displayed segment is under the playhead
    pub async fn seek_to_word(&self, word_index: usize) -> PlaybackResult<()> {
        self.with_session(|shared| {
            let global = shared.words_displayed_base + word_index;
            match shared.timeline.get(global) {
                Some(timing) => {
                    shared.player.seek_to_ms(timing.start_ms);
                    shared.emit_word();
                    Ok(())
                }
                None => Err(PlaybackError::SessionError(format!(
                    "Word index {word_index} not voiced yet"
                ))),
            }
        })
        .await?
    }

    pub async fn set_speed(&self, rate: f32) -> PlaybackResult<()> {
        self.with_session(|shared| shared.player.set_speed(rate))
            .await
    }

    pub async fn state(&self) -> PlayerState {
        self.with_session(|shared| shared.player.state())
            .await
            .unwrap_or(PlayerState::Idle)
    }

    pub async fn position_ms(&self) -> u64 {
        self.with_session(|shared| shared.player.position_ms())
            .await
            .unwrap_or(0)
    }

    async fn with_session<R>(
        &self,
        f: impl FnOnce(&mut SessionShared) -> R,
    ) -> PlaybackResult<R> {
        let current = self.current.lock().await;
        let ctx = current
            .as_ref()
            .ok_or_else(|| PlaybackError::SessionError("No active session".to_string()))?;
        let mut shared = ctx.shared.lock().await;
        Ok(f(&mut shared))
    }
}

/// Forward transport events into the session until the socket or the
/// session goes away
async fn run_events(
    ctx: Arc<SessionCtx>,
    mut events: mpsc::Receiver<TransportEvent>,
    seq: Arc<AtomicU64>,
) {
    while let Some(event) = events.recv().await {
        if seq.load(Ordering::SeqCst) != ctx.id {
            debug!("Dropping event for stale session {}", ctx.id);
            break;
        }
        let mut shared = ctx.shared.lock().await;
        shared.handle_event(event);
    }
}

/// Drive the 50ms housekeeping tick until the session is replaced or stopped
async fn run_ticker(ctx: Arc<SessionCtx>, seq: Arc<AtomicU64>) {
    let mut interval = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        if seq.load(Ordering::SeqCst) != ctx.id {
            break;
        }
        let mut shared = ctx.shared.lock().await;
        shared.tick();
        if shared.player.state() == PlayerState::Stopped {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::player::ManualClock;
    use crate::core::protocol::WordBoundaryData;
    use crate::core::tts::CharAlignment;
    use bytes::Bytes;
    use std::sync::Mutex as SyncMutex;

    fn shared_with(
        segments: &[&[&str]],
        callbacks: CallbackSet,
    ) -> (
        SessionShared,
        mpsc::UnboundedReceiver<SpeakRequest>,
        Arc<ManualClock>,
    ) {
        let clock = Arc::new(ManualClock::new());
        let sink: Arc<dyn AudioSink> = Arc::new(PcmBufferSink::new(24_000, clock.clone()));
        let mut player = BufferPlayer::new(sink);
        player.play().unwrap();
        let last_reported_state = player.state();

        let (transport, requests) = TransportSession::stub();
        let mut queue = SegmentQueue::new();
        for chunks in segments {
            queue.enqueue(Segment::new(
                chunks.iter().map(|c| c.to_string()).collect(),
                None,
                None,
            ));
        }

        let shared = SessionShared {
            player,
            timeline: WordTimeline::new(),
            reconstructor: AlignmentReconstructor::new(),
            queue,
            pending: VecDeque::new(),
            segmenter: Segmenter::new(900),
            transport: Some(transport),
            options: SpeechOptions::default(),
            callbacks,
            chunk_in_flight: false,
            pending_chunk_duration: 0,
            words_displayed_base: 0,
            segment_word_base: 0,
            last_emitted_word: None,
            last_reported_state,
            input_finished: false,
            errored: false,
        };
        (shared, requests, clock)
    }

    /// 48 bytes per millisecond at 24kHz mono 16-bit
    fn frame_ms(ms: usize) -> Bytes {
        Bytes::from(vec![0u8; 48 * ms])
    }

    fn word_boundary(offset_ms: u64, duration_ms: u64) -> TransportEvent {
        TransportEvent::WordBoundary(WordBoundaryData {
            word: "w".to_string(),
            text_offset: 0,
            audio_offset_ms: offset_ms,
            duration_ms,
        })
    }

    async fn drain_spawned() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_exactly_one_chunk_in_flight() {
        let (mut shared, mut requests, _clock) =
            shared_with(&[&["One.", "Two."]], CallbackSet::default());

        shared.send_next_chunk().unwrap();
        assert_eq!(requests.try_recv().unwrap().text, "One.");
        assert!(requests.try_recv().is_err());

        // A redundant call must not double-send
        shared.send_next_chunk().unwrap();
        assert!(requests.try_recv().is_err());

        shared.handle_event(TransportEvent::ChunkComplete);
        assert_eq!(requests.try_recv().unwrap().text, "Two.");

        shared.handle_event(TransportEvent::ChunkComplete);
        assert!(requests.try_recv().is_err());
        assert!(shared.input_finished);
        assert_eq!(shared.pending.len(), 1);
    }

    #[tokio::test]
    async fn test_segment_completion_waits_for_playhead() {
        let completions = Arc::new(AtomicU64::new(0));
        let counter = completions.clone();
        let (mut shared, _requests, clock) = shared_with(&[], CallbackSet::default());
        shared.queue.enqueue(Segment::new(
            vec!["Hello there.".to_string()],
            None,
            Some(Arc::new(move || {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })),
        ));

        shared.send_next_chunk().unwrap();
        shared.handle_event(TransportEvent::Audio(frame_ms(1000)));
        shared.handle_event(word_boundary(0, 400));
        shared.handle_event(word_boundary(400, 600));
        shared.handle_event(TransportEvent::Alignment(AlignmentPayload::Summary {
            duration_ms: 1000,
        }));
        shared.handle_event(TransportEvent::ChunkComplete);
        assert_eq!(shared.pending.len(), 1);
        assert_eq!(shared.pending[0].audio_end_ms, 1000);
        assert_eq!(shared.pending[0].word_count, 2);

        // Synthesis is done but the listener has heard nothing yet
        shared.tick();
        drain_spawned().await;
        assert_eq!(completions.load(Ordering::SeqCst), 0);

        clock.advance_ms(1000);
        shared.tick();
        drain_spawned().await;
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(shared.words_displayed_base, 2);
    }

    #[tokio::test]
    async fn test_word_indices_reset_per_displayed_segment() {
        let emitted: Arc<SyncMutex<Vec<usize>>> = Arc::new(SyncMutex::new(Vec::new()));
        let sink_log = emitted.clone();
        let callbacks = CallbackSet {
            on_word: Some(Arc::new(move |index| {
                let sink_log = sink_log.clone();
                Box::pin(async move {
                    sink_log.lock().unwrap().push(index);
                })
            })),
            ..CallbackSet::default()
        };
        let (mut shared, _requests, clock) =
            shared_with(&[&["One two."], &["Three four."]], callbacks);

        // First segment: two words over 1000ms
        shared.send_next_chunk().unwrap();
        shared.handle_event(TransportEvent::Audio(frame_ms(2000)));
        shared.handle_event(word_boundary(0, 400));
        shared.handle_event(word_boundary(500, 500));
        shared.handle_event(TransportEvent::Alignment(AlignmentPayload::Summary {
            duration_ms: 1000,
        }));
        shared.handle_event(TransportEvent::ChunkComplete);

        // Second segment: two more words
        shared.handle_event(word_boundary(0, 400));
        shared.handle_event(word_boundary(500, 500));
        shared.handle_event(TransportEvent::Alignment(AlignmentPayload::Summary {
            duration_ms: 1000,
        }));
        shared.handle_event(TransportEvent::ChunkComplete);

        for _ in 0..8 {
            clock.advance_ms(250);
            shared.tick();
            drain_spawned().await;
        }

        // Both segments report word indices starting from zero
        assert_eq!(*emitted.lock().unwrap(), vec![0, 1, 0, 1]);
    }

    #[tokio::test]
    async fn test_final_word_reported_when_playhead_jumps_to_end() {
        let emitted: Arc<SyncMutex<Vec<usize>>> = Arc::new(SyncMutex::new(Vec::new()));
        let sink_log = emitted.clone();
        let callbacks = CallbackSet {
            on_word: Some(Arc::new(move |index| {
                let sink_log = sink_log.clone();
                Box::pin(async move {
                    sink_log.lock().unwrap().push(index);
                })
            })),
            ..CallbackSet::default()
        };
        let (mut shared, _requests, clock) = shared_with(&[&["One two."]], callbacks);

        shared.send_next_chunk().unwrap();
        shared.handle_event(TransportEvent::Audio(frame_ms(1000)));
        shared.handle_event(word_boundary(0, 400));
        shared.handle_event(word_boundary(500, 500));
        shared.handle_event(TransportEvent::Alignment(AlignmentPayload::Summary {
            duration_ms: 1000,
        }));
        shared.handle_event(TransportEvent::ChunkComplete);

        clock.advance_ms(100);
        shared.tick();
        drain_spawned().await;
        assert_eq!(*emitted.lock().unwrap(), vec![0]);

        // The tick that ends playback is also the first to see the second
        // word; it must still be reported before the segment retires
        clock.advance_ms(900);
        shared.tick();
        drain_spawned().await;
        assert_eq!(shared.player.state(), PlayerState::Ended);
        assert_eq!(*emitted.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_error_with_buffered_audio_plays_out() {
        let errors = Arc::new(AtomicU64::new(0));
        let counter = errors.clone();
        let callbacks = CallbackSet {
            on_error: Some(Arc::new(move |_| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })),
            ..CallbackSet::default()
        };
        let (mut shared, _requests, clock) = shared_with(&[&["One.", "Two."]], callbacks);

        shared.send_next_chunk().unwrap();
        shared.handle_event(TransportEvent::Audio(frame_ms(500)));
        shared.handle_event(TransportEvent::Error("synthesis failed".to_string()));
        drain_spawned().await;

        // Buffered audio keeps playing instead of cutting off
        assert_eq!(shared.player.state(), PlayerState::Playing);
        assert_eq!(errors.load(Ordering::SeqCst), 1);

        // A second failure must not re-fire the callback
        shared.handle_event(TransportEvent::Error("again".to_string()));
        drain_spawned().await;
        assert_eq!(errors.load(Ordering::SeqCst), 1);

        clock.advance_ms(500);
        shared.tick();
        assert_eq!(shared.player.state(), PlayerState::Ended);
    }

    #[tokio::test]
    async fn test_error_with_nothing_buffered_stops() {
        let (mut shared, _requests, _clock) =
            shared_with(&[&["One."]], CallbackSet::default());
        shared.send_next_chunk().unwrap();
        shared.handle_event(TransportEvent::Error("connect refused".to_string()));
        assert_eq!(shared.player.state(), PlayerState::Stopped);
        assert!(shared.enqueue("More text.", None).is_err());
    }

    #[tokio::test]
    async fn test_enqueue_after_finish_reopens_stream() {
        let (mut shared, mut requests, clock) =
            shared_with(&[&["First page."]], CallbackSet::default());

        shared.send_next_chunk().unwrap();
        requests.try_recv().unwrap();
        shared.handle_event(TransportEvent::Audio(frame_ms(100)));
        shared.handle_event(TransportEvent::Alignment(AlignmentPayload::Summary {
            duration_ms: 100,
        }));
        shared.handle_event(TransportEvent::ChunkComplete);
        assert!(shared.input_finished);

        clock.advance_ms(100);
        shared.tick();
        assert_eq!(shared.player.state(), PlayerState::Ended);

        shared.enqueue("Second page arrives late.", None).unwrap();
        assert!(!shared.input_finished);
        assert_eq!(shared.player.state(), PlayerState::Playing);
        assert_eq!(requests.try_recv().unwrap().text, "Second page arrives late.");
    }

    #[tokio::test]
    async fn test_carry_over_flushed_when_queue_drains() {
        let (mut shared, mut requests, _clock) =
            shared_with(&[], CallbackSet::default());

        // Page ends mid-sentence; the partial is held back
        shared.enqueue("Complete sentence. And an unfinished", None).unwrap();
        assert_eq!(requests.try_recv().unwrap().text, "Complete sentence.");

        shared.handle_event(TransportEvent::ChunkComplete);
        // Nothing else queued, so the held text is voiced rather than lost
        assert_eq!(requests.try_recv().unwrap().text, "And an unfinished");
    }

    #[tokio::test]
    async fn test_char_alignment_feeds_timeline() {
        let (mut shared, _requests, _clock) =
            shared_with(&[&["Hi there."]], CallbackSet::default());
        shared.send_next_chunk().unwrap();

        let alignment = CharAlignment {
            chars: "Hi there.".chars().map(|c| c.to_string()).collect(),
            char_start_times_ms: (0..9).map(|i| i * 100).collect(),
            char_durations_ms: vec![100; 9],
        };
        shared.handle_event(TransportEvent::Alignment(AlignmentPayload::Characters(
            alignment,
        )));
        assert_eq!(shared.timeline.len(), 2);
        assert_eq!(shared.pending_chunk_duration, 900);

        shared.handle_event(TransportEvent::ChunkComplete);
        assert_eq!(shared.reconstructor.offset_ms(), 900);
    }
}
