//! Alignment reconstruction
//!
//! Converts provider timing events for the chunk in flight into entries on
//! the session-global [`WordTimeline`]. Each chunk's words are offset by the
//! cumulative duration of everything already scheduled; after a chunk
//! completes the offset advances by that chunk's reported audio duration.
//!
//! Word-level events append immediately, which keeps highlighting latency
//! low. Character-level events only arrive once per chunk and are grouped
//! into words at whitespace boundaries first. When per-character durations
//! are missing, a word's span is spread evenly; trailing characters after
//! the last timed word get the chunk end with zero duration.

use crate::core::timeline::{WordTiming, WordTimeline};
use crate::core::tts::CharAlignment;

/// Builds the global word timeline from per-chunk provider events
#[derive(Debug, Default)]
pub struct AlignmentReconstructor {
    /// Cumulative audio duration already scheduled in this session
    offset_ms: u64,
    /// Latest event end observed within the current chunk, used as a
    /// fallback duration when the provider does not report one
    chunk_end_ms: u64,
}

impl AlignmentReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset applied to the next appended word
    pub fn offset_ms(&self) -> u64 {
        self.offset_ms
    }

    /// Append one word-level timing event for the chunk in flight
    pub fn push_word_boundary(
        &mut self,
        timeline: &mut WordTimeline,
        audio_offset_ms: u64,
        duration_ms: u64,
    ) {
        let start = self.offset_ms + audio_offset_ms;
        let end = start + duration_ms;
        timeline.push(WordTiming {
            start_ms: start,
            end_ms: end,
        });
        self.chunk_end_ms = self.chunk_end_ms.max(audio_offset_ms + duration_ms);
    }

    /// Append the words of a character-level alignment for the chunk in flight
    pub fn push_char_alignment(&mut self, timeline: &mut WordTimeline, alignment: &CharAlignment) {
        let chunk_end = alignment.end_ms();

        let mut word_start_idx: Option<usize> = None;
        for (i, c) in alignment.chars.iter().enumerate() {
            let is_space = c.chars().all(char::is_whitespace);
            if is_space {
                if let Some(start_idx) = word_start_idx.take() {
                    self.push_word(timeline, alignment, start_idx, i - 1, chunk_end);
                }
            } else if word_start_idx.is_none() {
                word_start_idx = Some(i);
            }
        }
        if let Some(start_idx) = word_start_idx {
            self.push_word(timeline, alignment, start_idx, alignment.chars.len() - 1, chunk_end);
        }

        self.chunk_end_ms = self.chunk_end_ms.max(chunk_end);
    }

    /// Append one word spanning chars `[first..=last]` of the alignment
    fn push_word(
        &mut self,
        timeline: &mut WordTimeline,
        alignment: &CharAlignment,
        first: usize,
        last: usize,
        chunk_end: u64,
    ) {
        let starts = &alignment.char_start_times_ms;
        let durations = &alignment.char_durations_ms;

        let timing = match starts.get(first) {
            Some(&start) => {
                // Last timed char of the word; anything beyond the timed
                // range is covered by the chunk-end fallback below
                let timed_last = last.min(starts.len().saturating_sub(1));
                let end = match durations.get(timed_last) {
                    Some(&duration) => starts[timed_last] + duration,
                    // Duration missing for the final char: spread evenly by
                    // giving the word the span up to the chunk end
                    None => chunk_end.max(starts[timed_last]),
                };
                WordTiming {
                    start_ms: self.offset_ms + start,
                    end_ms: self.offset_ms + end.max(start),
                }
            }
            // Trailing characters past the timed range: chunk end, zero width
            None => WordTiming {
                start_ms: self.offset_ms + chunk_end,
                end_ms: self.offset_ms + chunk_end,
            },
        };

        timeline.push(timing);
    }

    /// Advance the offset after a chunk completes
    ///
    /// Uses the provider-reported duration when available, otherwise the
    /// last event end observed within the chunk. Returns the new offset.
    pub fn finish_chunk(&mut self, reported_duration_ms: u64) -> u64 {
        let duration = if reported_duration_ms > 0 {
            reported_duration_ms
        } else {
            self.chunk_end_ms
        };
        self.offset_ms += duration;
        self.chunk_end_ms = 0;
        self.offset_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_alignment(text: &str, step_ms: u64) -> CharAlignment {
        let chars: Vec<String> = text.chars().map(|c| c.to_string()).collect();
        let count = chars.len() as u64;
        CharAlignment {
            chars,
            char_start_times_ms: (0..count).map(|i| i * step_ms).collect(),
            char_durations_ms: (0..count).map(|_| step_ms).collect(),
        }
    }

    #[test]
    fn test_word_boundaries_offset_by_schedule() {
        let mut timeline = WordTimeline::new();
        let mut reconstructor = AlignmentReconstructor::new();

        reconstructor.push_word_boundary(&mut timeline, 0, 300);
        reconstructor.push_word_boundary(&mut timeline, 300, 200);
        reconstructor.finish_chunk(1000);
        reconstructor.push_word_boundary(&mut timeline, 0, 400);

        assert_eq!(timeline.get(0).unwrap(), WordTiming { start_ms: 0, end_ms: 300 });
        assert_eq!(timeline.get(1).unwrap(), WordTiming { start_ms: 300, end_ms: 500 });
        assert_eq!(timeline.get(2).unwrap(), WordTiming { start_ms: 1000, end_ms: 1400 });
    }

    #[test]
    fn test_offsets_advance_by_reported_durations() {
        let mut reconstructor = AlignmentReconstructor::new();
        assert_eq!(reconstructor.offset_ms(), 0);
        reconstructor.finish_chunk(1000);
        assert_eq!(reconstructor.offset_ms(), 1000);
        reconstructor.finish_chunk(1500);
        assert_eq!(reconstructor.offset_ms(), 2500);
        reconstructor.finish_chunk(800);
        assert_eq!(reconstructor.offset_ms(), 3300);
    }

    #[test]
    fn test_finish_chunk_falls_back_to_observed_end() {
        let mut timeline = WordTimeline::new();
        let mut reconstructor = AlignmentReconstructor::new();
        reconstructor.push_word_boundary(&mut timeline, 100, 250);
        reconstructor.finish_chunk(0);
        assert_eq!(reconstructor.offset_ms(), 350);
    }

    #[test]
    fn test_char_alignment_groups_words_on_whitespace() {
        let mut timeline = WordTimeline::new();
        let mut reconstructor = AlignmentReconstructor::new();

        // "Hi there" at 100ms per char
        let alignment = char_alignment("Hi there", 100);
        reconstructor.push_char_alignment(&mut timeline, &alignment);

        assert_eq!(timeline.len(), 2);
        // "Hi": chars 0..=1
        assert_eq!(timeline.get(0).unwrap(), WordTiming { start_ms: 0, end_ms: 200 });
        // "there": chars 3..=7
        assert_eq!(timeline.get(1).unwrap(), WordTiming { start_ms: 300, end_ms: 800 });
    }

    #[test]
    fn test_char_alignment_second_chunk_offset() {
        let mut timeline = WordTimeline::new();
        let mut reconstructor = AlignmentReconstructor::new();

        reconstructor.push_char_alignment(&mut timeline, &char_alignment("One", 100));
        reconstructor.finish_chunk(300);
        reconstructor.push_char_alignment(&mut timeline, &char_alignment("Two", 100));

        assert_eq!(timeline.get(0).unwrap(), WordTiming { start_ms: 0, end_ms: 300 });
        assert_eq!(timeline.get(1).unwrap(), WordTiming { start_ms: 300, end_ms: 600 });
    }

    #[test]
    fn test_trailing_untimed_chars_get_chunk_end_zero_duration() {
        let mut timeline = WordTimeline::new();
        let mut reconstructor = AlignmentReconstructor::new();

        // Provider timed only "Hi " (3 chars); "yo" has no timing entries
        let alignment = CharAlignment {
            chars: vec!["H".into(), "i".into(), " ".into(), "y".into(), "o".into()],
            char_start_times_ms: vec![0, 100, 200],
            char_durations_ms: vec![100, 100, 100],
        };
        reconstructor.push_char_alignment(&mut timeline, &alignment);

        assert_eq!(timeline.len(), 2);
        let trailing = timeline.get(1).unwrap();
        assert_eq!(trailing.start_ms, 300);
        assert_eq!(trailing.end_ms, 300);
    }

    #[test]
    fn test_global_starts_non_decreasing_across_chunks() {
        let mut timeline = WordTimeline::new();
        let mut reconstructor = AlignmentReconstructor::new();

        for text in ["First chunk here.", "Second one.", "And a third."] {
            let alignment = char_alignment(text, 50);
            reconstructor.push_char_alignment(&mut timeline, &alignment);
            reconstructor.finish_chunk(alignment.end_ms());
        }

        let starts: Vec<u64> = timeline.entries().iter().map(|t| t.start_ms).collect();
        assert!(starts.windows(2).all(|w| w[0] <= w[1]));
    }
}
