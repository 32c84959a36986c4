//! Segment queue
//!
//! Segments are page-sized units of text, each possibly spanning several
//! chunks, voiced back to back on one continuous session. Exactly one
//! segment is active at a time; advancing to the next never resets the
//! global word timeline. A segment's completion callback is deferred until
//! the playhead reaches the segment's recorded end.

use std::collections::VecDeque;

use crate::core::player::SegmentCompleteCallback;

/// A contiguous span of source text to be voiced
pub struct Segment {
    /// Sentence-aligned chunks, each sent in one request
    pub chunks: Vec<String>,
    /// Cursor into `chunks`
    pub next_chunk: usize,
    /// Surrounding text forwarded to the enhancement step
    pub context: Option<String>,
    pub on_complete: Option<SegmentCompleteCallback>,
}

impl Segment {
    pub fn new(
        chunks: Vec<String>,
        context: Option<String>,
        on_complete: Option<SegmentCompleteCallback>,
    ) -> Self {
        Self {
            chunks,
            next_chunk: 0,
            context,
            on_complete,
        }
    }

    /// The next chunk to transmit, advancing the cursor
    pub fn take_next_chunk(&mut self) -> Option<String> {
        let chunk = self.chunks.get(self.next_chunk)?.clone();
        self.next_chunk += 1;
        Some(chunk)
    }

    pub fn is_exhausted(&self) -> bool {
        self.next_chunk >= self.chunks.len()
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("chunks", &self.chunks.len())
            .field("next_chunk", &self.next_chunk)
            .field("has_callback", &self.on_complete.is_some())
            .finish()
    }
}

/// A segment whose chunks have all been sent; its callback fires once the
/// playhead crosses `audio_end_ms`
pub struct PendingCompletion {
    /// Playback time at which this segment's audio ends
    pub audio_end_ms: u64,
    /// Global word index one past the segment's last word
    pub word_index_end: usize,
    /// How many words this segment contributed
    pub word_count: usize,
    pub callback: Option<SegmentCompleteCallback>,
}

impl std::fmt::Debug for PendingCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCompletion")
            .field("audio_end_ms", &self.audio_end_ms)
            .field("word_index_end", &self.word_index_end)
            .field("word_count", &self.word_count)
            .finish()
    }
}

/// Ordered queue of segments awaiting their turn on the session
#[derive(Debug, Default)]
pub struct SegmentQueue {
    active: Option<Segment>,
    pending: VecDeque<Segment>,
}

impl SegmentQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, segment: Segment) {
        self.pending.push_back(segment);
    }

    pub fn has_active(&self) -> bool {
        self.active.is_some()
    }

    /// Pop the next pending segment into the active slot.
    /// Returns false when nothing is pending.
    pub fn activate_next(&mut self) -> bool {
        debug_assert!(self.active.is_none(), "activating over a live segment");
        match self.pending.pop_front() {
            Some(segment) => {
                self.active = Some(segment);
                true
            }
            None => false,
        }
    }

    /// Next chunk of the active segment, if it has one left
    pub fn take_next_chunk(&mut self) -> Option<String> {
        self.active.as_mut()?.take_next_chunk()
    }

    /// Context text of the active segment
    pub fn active_context(&self) -> Option<String> {
        self.active.as_ref()?.context.clone()
    }

    /// Append late chunks to the active segment; used when carried-over
    /// text is flushed at the end of the session
    pub fn extend_active_chunks(&mut self, chunks: Vec<String>) {
        if let Some(active) = self.active.as_mut() {
            active.chunks.extend(chunks);
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Retire the active segment once its chunks are all sent
    pub fn retire_active(&mut self) -> Option<Segment> {
        self.active.take()
    }

    pub fn is_drained(&self) -> bool {
        self.active.is_none() && self.pending.is_empty()
    }

    /// Drop everything; used on stop and on fatal errors
    pub fn clear(&mut self) {
        self.active = None;
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(chunks: &[&str]) -> Segment {
        Segment::new(chunks.iter().map(|c| c.to_string()).collect(), None, None)
    }

    #[test]
    fn test_chunks_consumed_in_order() {
        let mut queue = SegmentQueue::new();
        queue.enqueue(segment(&["One.", "Two."]));
        assert!(queue.activate_next());

        assert_eq!(queue.take_next_chunk().as_deref(), Some("One."));
        assert_eq!(queue.take_next_chunk().as_deref(), Some("Two."));
        assert_eq!(queue.take_next_chunk(), None);
        assert!(queue.retire_active().unwrap().is_exhausted());
    }

    #[test]
    fn test_one_segment_active_at_a_time() {
        let mut queue = SegmentQueue::new();
        queue.enqueue(segment(&["A."]));
        queue.enqueue(segment(&["B."]));

        assert!(queue.activate_next());
        assert_eq!(queue.take_next_chunk().as_deref(), Some("A."));
        assert_eq!(queue.take_next_chunk(), None);

        queue.retire_active();
        assert!(queue.activate_next());
        assert_eq!(queue.take_next_chunk().as_deref(), Some("B."));

        queue.retire_active();
        assert!(!queue.activate_next());
        assert!(queue.is_drained());
    }

    #[test]
    fn test_clear_discards_everything() {
        let mut queue = SegmentQueue::new();
        queue.enqueue(segment(&["A."]));
        queue.activate_next();
        queue.enqueue(segment(&["B."]));
        queue.clear();
        assert!(queue.is_drained());
    }
}
