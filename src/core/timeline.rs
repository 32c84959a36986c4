//! Session-global word timeline
//!
//! Every word voiced in a session, across all segments and chunks, lands in
//! one append-only sequence of timings. The playback side resolves "which
//! word is the listener hearing" with a binary search over start times.

/// Timing for one voiced word, in milliseconds of session playback time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordTiming {
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Append-only timeline of word timings spanning the whole session
///
/// Invariant: `start_ms` values are non-decreasing across the sequence.
/// Entries are never rewritten once appended; out-of-order pushes are
/// clamped forward to the last start rather than rejected, so a slightly
/// sloppy provider cannot break the binary search.
#[derive(Debug, Default)]
pub struct WordTimeline {
    entries: Vec<WordTiming>,
}

impl WordTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a word timing, clamping to preserve monotonic start times
    pub fn push(&mut self, timing: WordTiming) {
        let timing = match self.entries.last() {
            Some(last) if timing.start_ms < last.start_ms => WordTiming {
                start_ms: last.start_ms,
                end_ms: timing.end_ms.max(last.start_ms),
            },
            _ => timing,
        };
        self.entries.push(timing);
    }

    pub fn get(&self, index: usize) -> Option<WordTiming> {
        self.entries.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the global word index for a playback position
    ///
    /// Returns the latest entry whose `start_ms <= position_ms`, so a word
    /// remains current until the next one starts. Returns `None` before the
    /// first word.
    pub fn index_at(&self, position_ms: u64) -> Option<usize> {
        let count = self
            .entries
            .partition_point(|timing| timing.start_ms <= position_ms);
        count.checked_sub(1)
    }

    pub fn entries(&self) -> &[WordTiming] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(start_ms: u64, end_ms: u64) -> WordTiming {
        WordTiming { start_ms, end_ms }
    }

    #[test]
    fn test_index_at_picks_latest_started_word() {
        let mut timeline = WordTimeline::new();
        timeline.push(timing(0, 200));
        timeline.push(timing(200, 500));
        timeline.push(timing(500, 900));

        assert_eq!(timeline.index_at(0), Some(0));
        assert_eq!(timeline.index_at(199), Some(0));
        assert_eq!(timeline.index_at(200), Some(1));
        // A word stays current until the next one starts, even past its end
        assert_eq!(timeline.index_at(450), Some(1));
        assert_eq!(timeline.index_at(10_000), Some(2));
    }

    #[test]
    fn test_index_at_before_first_word() {
        let mut timeline = WordTimeline::new();
        timeline.push(timing(100, 300));
        assert_eq!(timeline.index_at(50), None);

        let empty = WordTimeline::new();
        assert_eq!(empty.index_at(0), None);
    }

    #[test]
    fn test_push_clamps_regressions() {
        let mut timeline = WordTimeline::new();
        timeline.push(timing(500, 700));
        timeline.push(timing(300, 400));

        let second = timeline.get(1).unwrap();
        assert_eq!(second.start_ms, 500);
        assert!(second.end_ms >= second.start_ms);
    }

    #[test]
    fn test_starts_non_decreasing_after_pushes() {
        let mut timeline = WordTimeline::new();
        for (start, end) in [(0, 100), (100, 150), (90, 200), (300, 350)] {
            timeline.push(timing(start, end));
        }
        let starts: Vec<u64> = timeline.entries().iter().map(|t| t.start_ms).collect();
        assert!(starts.windows(2).all(|w| w[0] <= w[1]));
    }
}
