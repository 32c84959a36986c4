//! Semantic markup enhancement
//!
//! Before synthesis, a chunk's plain text can be rewritten by an external
//! enhancement service into a richer markup form for more natural prosody.
//! Rewriting changes character offsets, so the service also returns a
//! position map from markup offsets back to plain-text offsets; the relay
//! uses it to translate timing events back onto the original text. When the
//! service is unavailable or fails, we fall back to voicing the unmodified
//! plain text with deterministic paragraph-pause markup, never dropping
//! content.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::base::{SynthesisError, SynthesisResult};
use crate::core::text::PARAGRAPH_BREAK;

/// Markup inserted at paragraph breaks by the fallback path
pub const PARAGRAPH_PAUSE_TAG: &str = r#"<break strength="strong"/>"#;

/// Map from markup-text character offsets back to plain-text offsets
///
/// `source[i]` is the plain-text character index that markup character `i`
/// came from, or `None` for characters the enhancement inserted (tags,
/// punctuation it invented).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionMap {
    source: Vec<Option<usize>>,
}

impl PositionMap {
    /// Identity map for text that was not rewritten
    pub fn identity(len: usize) -> Self {
        Self {
            source: (0..len).map(Some).collect(),
        }
    }

    /// Build from the wire representation: one entry per markup character,
    /// `-1` for inserted characters
    pub fn from_source_offsets(offsets: &[i64]) -> Self {
        Self {
            source: offsets
                .iter()
                .map(|&o| if o < 0 { None } else { Some(o as usize) })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Plain-text offset for a markup offset, `None` for inserted characters
    pub fn to_plain(&self, markup_offset: usize) -> Option<usize> {
        self.source.get(markup_offset).copied().flatten()
    }

    /// Like `to_plain`, but an inserted character resolves to the nearest
    /// following original character (or the last original one at the tail).
    /// Used for word boundary offsets, which must always land somewhere.
    pub fn to_plain_clamped(&self, markup_offset: usize) -> usize {
        for i in markup_offset..self.source.len() {
            if let Some(plain) = self.source[i] {
                return plain;
            }
        }
        for i in (0..markup_offset.min(self.source.len())).rev() {
            if let Some(plain) = self.source[i] {
                return plain;
            }
        }
        0
    }
}

/// Result of an enhancement pass: markup text plus the offset map back to
/// the plain text it was derived from
#[derive(Debug, Clone)]
pub struct EnhancedText {
    pub markup: String,
    pub map: PositionMap,
}

/// Deterministic fallback markup: the plain text with a pause tag at each
/// paragraph break. The map covers every character so no timing event can
/// get lost.
pub fn fallback_markup(text: &str) -> EnhancedText {
    let mut markup = String::with_capacity(text.len());
    let mut source = Vec::with_capacity(text.len());

    let chars: Vec<char> = text.chars().collect();
    let break_chars: Vec<char> = PARAGRAPH_BREAK.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        if chars[i..].starts_with(&break_chars[..]) {
            for tag_char in PARAGRAPH_PAUSE_TAG.chars() {
                markup.push(tag_char);
                source.push(None);
            }
            // Keep one space so words on either side stay separated
            markup.push(' ');
            source.push(Some(i));
            i += break_chars.len();
        } else {
            markup.push(chars[i]);
            source.push(Some(i));
            i += 1;
        }
    }

    EnhancedText {
        markup,
        map: PositionMap { source },
    }
}

/// Request body sent to the enhancement service
#[derive(Debug, Serialize)]
struct EnhanceRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
}

/// Response from the enhancement service
///
/// `source_offsets` has one entry per character of `markup`; `-1` marks
/// characters the service inserted.
#[derive(Debug, Deserialize)]
struct EnhanceResponse {
    markup: String,
    source_offsets: Vec<i64>,
}

/// Client for the external text-enhancement service
pub struct MarkupEnhancer {
    client: reqwest::Client,
    url: String,
}

impl MarkupEnhancer {
    pub fn new(url: String) -> SynthesisResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                SynthesisError::InternalError(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self { client, url })
    }

    /// Rewrite plain chunk text into prosody markup
    ///
    /// `context` is surrounding text forwarded for better rewriting; it is
    /// not voiced itself. On any failure the caller is expected to use
    /// [`fallback_markup`] instead.
    pub async fn enhance(
        &self,
        text: &str,
        context: Option<&str>,
    ) -> SynthesisResult<EnhancedText> {
        let request = EnhanceRequest { text, context };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SynthesisError::ConnectionFailed(format!("Enhancement request: {e}")))?;

        if !response.status().is_success() {
            return Err(SynthesisError::ProviderError(format!(
                "Enhancement service returned {}",
                response.status()
            )));
        }

        let body: EnhanceResponse = response.json().await.map_err(|e| {
            SynthesisError::ProviderError(format!("Invalid enhancement response: {e}"))
        })?;

        let markup_chars = body.markup.chars().count();
        if body.source_offsets.len() != markup_chars {
            warn!(
                "Enhancement offset map length {} does not match markup length {}",
                body.source_offsets.len(),
                markup_chars
            );
            return Err(SynthesisError::ProviderError(
                "Enhancement position map does not cover the markup".to_string(),
            ));
        }

        debug!("Enhanced {} chars into {} markup chars", text.chars().count(), markup_chars);
        Ok(EnhancedText {
            markup: body.markup,
            map: PositionMap::from_source_offsets(&body.source_offsets),
        })
    }
}
