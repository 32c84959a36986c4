//! Sentence-aligned text segmentation
//!
//! Splits arbitrary page text into chunks small enough to send in one
//! synthesis request. Chunks never cut a sentence in half: a sentence longer
//! than the budget is emitted whole rather than split mid-sentence, trading
//! uniform chunk sizes for synthesis fidelity. Page text that stops short of
//! sentence punctuation is carried over and prepended to the next page, so a
//! sentence spanning a page boundary is voiced exactly once.

/// Marker kept in normalized text where the source had a paragraph break.
/// Downstream prosody handling turns this into a pause hint.
pub const PARAGRAPH_BREAK: &str = "\n\n";

/// Default per-chunk character budget
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 900;

/// Normalize raw page text before segmentation
///
/// CRLF and bare CR become LF, NBSP becomes a plain space, runs of two or
/// more newlines collapse to the paragraph-break marker, and single newlines
/// collapse to spaces.
pub fn normalize(text: &str) -> String {
    let unified = text
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{a0}', " ");

    let mut out = String::with_capacity(unified.len());
    let mut chars = unified.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\n' {
            let mut run = 1usize;
            while chars.peek() == Some(&'\n') {
                chars.next();
                run += 1;
            }
            if run >= 2 {
                out.push_str(PARAGRAPH_BREAK);
            } else {
                out.push(' ');
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Returns true when the character ends a sentence
fn is_sentence_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Characters that may trail sentence punctuation and still belong to it
fn is_sentence_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '\u{201d}' | '\u{2019}')
}

/// Sentence-bounded text segmenter with cross-page carry-over
#[derive(Debug)]
pub struct Segmenter {
    max_chunk_chars: usize,
    carry: String,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHUNK_CHARS)
    }
}

impl Segmenter {
    pub fn new(max_chunk_chars: usize) -> Self {
        Self {
            max_chunk_chars,
            carry: String::new(),
        }
    }

    /// Split page text into sentence-aligned chunks
    ///
    /// Any carry-over from the previous call is prepended first. If this text
    /// does not end on sentence punctuation, the trailing partial sentence is
    /// held back for the next call instead of being chunked.
    pub fn segment(&mut self, text: &str) -> Vec<String> {
        let mut working = std::mem::take(&mut self.carry);
        let incoming = normalize(text);
        if !working.is_empty()
            && !working.ends_with(char::is_whitespace)
            && !incoming.starts_with(char::is_whitespace)
        {
            // Page boundaries fall between words, never inside one
            working.push(' ');
        }
        working.push_str(&incoming);

        let (sentences, trailing) = split_sentences(&working);
        self.carry = trailing;
        pack_sentences(&sentences, self.max_chunk_chars)
    }

    /// Drain the held partial sentence as final chunks
    pub fn flush(&mut self) -> Vec<String> {
        let trailing = std::mem::take(&mut self.carry);
        let trimmed = trailing.trim();
        if trimmed.is_empty() {
            Vec::new()
        } else {
            pack_sentences(std::slice::from_ref(&trimmed.to_string()), self.max_chunk_chars)
        }
    }

    /// The partial sentence currently held for the next page
    pub fn carry(&self) -> &str {
        &self.carry
    }
}

/// Split normalized text into complete sentences plus any trailing partial
///
/// A sentence ends at `.`, `!` or `?` (optionally followed by closing quotes
/// or brackets) when the next character is whitespace or end of text.
fn split_sentences(text: &str) -> (Vec<String>, String) {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut i = 0usize;

    while i < chars.len() {
        let (_, c) = chars[i];
        if is_sentence_terminal(c) {
            // Absorb repeated terminals ("..." / "?!") and closing quotes
            let mut j = i + 1;
            while j < chars.len() && (is_sentence_terminal(chars[j].1) || is_sentence_closer(chars[j].1)) {
                j += 1;
            }
            let boundary = j >= chars.len() || chars[j].1.is_whitespace();
            if boundary {
                let end = if j < chars.len() { chars[j].0 } else { text.len() };
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                // Skip the whitespace run after the sentence
                while j < chars.len() && chars[j].1.is_whitespace() {
                    j += 1;
                }
                start = if j < chars.len() { chars[j].0 } else { text.len() };
            }
            i = j;
        } else {
            i += 1;
        }
    }

    let trailing = text[start..].trim_start().to_string();
    (sentences, trailing)
}

/// Pack sentences into chunks no larger than the budget
///
/// Sentences are joined with single spaces. A sentence that alone exceeds the
/// budget is emitted as its own oversized chunk.
fn pack_sentences(sentences: &[String], max_chunk_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in sentences {
        let sentence_len = sentence.chars().count();
        if current.is_empty() {
            current.push_str(sentence);
            current_len = sentence_len;
            continue;
        }
        if current_len + 1 + sentence_len <= max_chunk_chars {
            current.push(' ');
            current.push_str(sentence);
            current_len += 1 + sentence_len;
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(sentence);
            current_len = sentence_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
