//! Wire protocol for the voice socket
//!
//! One long-lived WebSocket carries binary frames (raw audio bytes for the
//! chunk in progress) interleaved with JSON control and alignment messages.
//! The client keeps a strict request/continue discipline: exactly one
//! [`SpeakRequest`] may be outstanding, and the server's `complete` message
//! releases the next one.

use serde::{Deserialize, Serialize};

use crate::core::tts::{CharAlignment, ProviderKind};

/// Client → server: voice one text chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakRequest {
    pub text: String,
    #[serde(rename = "voiceId", skip_serializing_if = "Option::is_none", default)]
    pub voice_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub provider: Option<ProviderKind>,
    #[serde(rename = "voiceName", skip_serializing_if = "Option::is_none", default)]
    pub voice_name: Option<String>,
    /// Surrounding text forwarded to the enhancement step; not voiced itself
    #[serde(rename = "contextText", skip_serializing_if = "Option::is_none", default)]
    pub context_text: Option<String>,
}

/// Incremental word timing reported while a chunk synthesizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordBoundaryData {
    pub word: String,
    /// Character offset of the word within the chunk text
    #[serde(rename = "textOffset")]
    pub text_offset: usize,
    #[serde(rename = "audioOffsetMs")]
    pub audio_offset_ms: u64,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}

/// Final per-chunk alignment; the shape differs by provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AlignmentPayload {
    /// Character-timestamp provider: full character alignment
    Characters(CharAlignment),
    /// Word-boundary provider: just the chunk duration (words already
    /// arrived incrementally)
    Summary {
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
}

/// Server → client JSON messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "wordBoundary")]
    WordBoundary { data: WordBoundaryData },
    #[serde(rename = "alignment")]
    Alignment { data: AlignmentPayload },
    /// Chunk fully synthesized and sent; the client may send the next chunk
    #[serde(rename = "complete")]
    Complete,
    /// Fatal for the session unless sent in reply to a malformed request
    #[serde(rename = "error")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speak_request_wire_shape() {
        let request = SpeakRequest {
            text: "Hello.".to_string(),
            voice_id: Some("nova".to_string()),
            provider: Some(ProviderKind::Wordmark),
            voice_name: None,
            context_text: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"text":"Hello.","voiceId":"nova","provider":"wordmark"}"#);

        let minimal: SpeakRequest = serde_json::from_str(r#"{"text":"Hi."}"#).unwrap();
        assert_eq!(minimal.text, "Hi.");
        assert!(minimal.provider.is_none());
    }

    #[test]
    fn test_word_boundary_message_shape() {
        let message = ServerMessage::WordBoundary {
            data: WordBoundaryData {
                word: "Hello".to_string(),
                text_offset: 0,
                audio_offset_ms: 120,
                duration_ms: 300,
            },
        };
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(
            json,
            r#"{"type":"wordBoundary","data":{"word":"Hello","textOffset":0,"audioOffsetMs":120,"durationMs":300}}"#
        );
    }

    #[test]
    fn test_complete_and_error_shapes() {
        assert_eq!(
            serde_json::to_string(&ServerMessage::Complete).unwrap(),
            r#"{"type":"complete"}"#
        );
        assert_eq!(
            serde_json::to_string(&ServerMessage::Error {
                message: "boom".to_string()
            })
            .unwrap(),
            r#"{"type":"error","message":"boom"}"#
        );
    }

    #[test]
    fn test_alignment_payload_shapes_by_provider() {
        let characters = ServerMessage::Alignment {
            data: AlignmentPayload::Characters(CharAlignment {
                chars: vec!["H".into(), "i".into()],
                char_start_times_ms: vec![0, 100],
                char_durations_ms: vec![100, 100],
            }),
        };
        let json = serde_json::to_string(&characters).unwrap();
        assert!(json.contains(r#""charStartTimesMs":[0,100]"#));

        let summary_json = r#"{"type":"alignment","data":{"durationMs":1500}}"#;
        match serde_json::from_str::<ServerMessage>(summary_json).unwrap() {
            ServerMessage::Alignment {
                data: AlignmentPayload::Summary { duration_ms },
            } => assert_eq!(duration_ms, 1500),
            other => panic!("Expected summary alignment, got {other:?}"),
        }

        // Round-trip the character shape through the untagged enum
        let round: ServerMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            round,
            ServerMessage::Alignment {
                data: AlignmentPayload::Characters(_)
            }
        ));
    }
}
