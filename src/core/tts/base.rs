//! Base types for speech synthesis backends
//!
//! A backend receives one text chunk at a time and streams back binary audio
//! interleaved with timing events over an mpsc channel. Audio frames must be
//! emitted as they become available, never buffered until the whole chunk is
//! synthesized. Every successful chunk ends with a `ChunkDone` carrying the
//! chunk's audio duration.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// The two interchangeable synthesis backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Character-timestamp backend: final per-chunk character alignment
    Charalign,
    /// Word-boundary backend: incremental per-word timing events
    Wordmark,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Charalign => "charalign",
            ProviderKind::Wordmark => "wordmark",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = SynthesisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "charalign" => Ok(ProviderKind::Charalign),
            "wordmark" => Ok(ProviderKind::Wordmark),
            other => Err(SynthesisError::InvalidConfiguration(format!(
                "Unknown provider '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Voice selection and prosody settings forwarded to the backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceSpec {
    /// Vendor voice identifier
    pub voice_id: Option<String>,
    /// Human-readable voice name, used by backends that address voices by name
    pub voice_name: Option<String>,
    /// Speaking rate (1.0 is normal)
    pub speaking_rate: Option<f32>,
    /// Preferred output sample rate
    pub sample_rate: Option<u32>,
}

/// Character-level alignment for one chunk
///
/// Parallel vectors: `chars[i]` started at `char_start_times_ms[i]` and lasted
/// `char_durations_ms[i]`. Times are relative to the chunk's own audio.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharAlignment {
    pub chars: Vec<String>,
    #[serde(rename = "charStartTimesMs")]
    pub char_start_times_ms: Vec<u64>,
    #[serde(rename = "charDurationsMs")]
    pub char_durations_ms: Vec<u64>,
}

impl CharAlignment {
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// End of the last timed character, i.e. the chunk duration this
    /// alignment accounts for
    pub fn end_ms(&self) -> u64 {
        match (
            self.char_start_times_ms.last(),
            self.char_durations_ms.last(),
        ) {
            (Some(start), Some(duration)) => start + duration,
            (Some(start), None) => *start,
            _ => 0,
        }
    }
}

/// Events streamed by a backend while synthesizing one chunk
#[derive(Debug, Clone)]
pub enum SynthesisEvent {
    /// Raw audio bytes, emitted as they arrive from the vendor
    Audio(Bytes),
    /// Incremental word timing (wordmark backend)
    WordBoundary {
        word: String,
        /// Character offset of the word within the chunk text
        text_offset: usize,
        audio_offset_ms: u64,
        duration_ms: u64,
    },
    /// Final per-chunk character alignment (charalign backend)
    CharacterAlignment(CharAlignment),
    /// Chunk fully synthesized; carries the chunk's audio duration
    ChunkDone { duration_ms: u64 },
}

/// Synthesis-specific error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthesisError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for synthesis operations
pub type SynthesisResult<T> = Result<T, SynthesisError>;

/// Capability interface every synthesis backend implements
///
/// For a given chunk the backend must emit audio frames incrementally and
/// enough timing data to reconstruct per-word timing, then finish with
/// `ChunkDone` or an error. A dropped `events` receiver aborts synthesis.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Which provider this backend is
    fn kind(&self) -> ProviderKind;

    /// Synthesize one chunk, streaming events to the given channel
    async fn synthesize(
        &self,
        chunk: &str,
        voice: &VoiceSpec,
        events: mpsc::Sender<SynthesisEvent>,
    ) -> SynthesisResult<()>;
}

/// Shared backend handle
pub type BoxedBackend = Arc<dyn SpeechBackend>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_round_trip() {
        assert_eq!("charalign".parse::<ProviderKind>().unwrap(), ProviderKind::Charalign);
        assert_eq!("wordmark".parse::<ProviderKind>().unwrap(), ProviderKind::Wordmark);
        assert!("polyphone".parse::<ProviderKind>().is_err());
        assert_eq!(ProviderKind::Wordmark.to_string(), "wordmark");
    }

    #[test]
    fn test_provider_kind_serde_lowercase() {
        let json = serde_json::to_string(&ProviderKind::Charalign).unwrap();
        assert_eq!(json, r#""charalign""#);
        let parsed: ProviderKind = serde_json::from_str(r#""wordmark""#).unwrap();
        assert_eq!(parsed, ProviderKind::Wordmark);
    }

    #[test]
    fn test_char_alignment_end_ms() {
        let alignment = CharAlignment {
            chars: vec!["H".into(), "i".into()],
            char_start_times_ms: vec![0, 80],
            char_durations_ms: vec![80, 120],
        };
        assert_eq!(alignment.end_ms(), 200);
        assert_eq!(CharAlignment::default().end_ms(), 0);
    }

    #[test]
    fn test_char_alignment_wire_field_names() {
        let alignment = CharAlignment {
            chars: vec!["a".into()],
            char_start_times_ms: vec![0],
            char_durations_ms: vec![100],
        };
        let json = serde_json::to_string(&alignment).unwrap();
        assert_eq!(
            json,
            r#"{"chars":["a"],"charStartTimesMs":[0],"charDurationsMs":[100]}"#
        );
    }
}
