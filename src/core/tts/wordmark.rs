//! Word-boundary synthesis backend
//!
//! Speaks one chunk per vendor WebSocket turn. The chunk text travels inside
//! an SSML document (speaking rate via prosody); the vendor streams binary
//! audio frames interleaved with incremental word-boundary events and ends
//! the turn with the chunk duration. Word offsets come back relative to the
//! SSML document, so they are re-based onto the chunk text before being
//! forwarded.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::client::IntoClientRequest, tungstenite::protocol::Message};
use tracing::{debug, warn};

use super::base::{
    ProviderKind, SpeechBackend, SynthesisError, SynthesisEvent, SynthesisResult, VoiceSpec,
};

/// Subscription key header, same one the vendor's REST surface uses
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

const DEFAULT_VOICE_NAME: &str = "en-US-JennyNeural";

/// Messages the vendor sends on the text channel of the socket
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum VendorMessage {
    #[serde(rename = "WordBoundary")]
    WordBoundary {
        word: String,
        #[serde(rename = "textOffset")]
        text_offset: usize,
        #[serde(rename = "audioOffsetMs")]
        audio_offset_ms: u64,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
    #[serde(rename = "turn.end")]
    TurnEnd {
        #[serde(rename = "durationMs", default)]
        duration_ms: u64,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Word-boundary backend ("wordmark")
pub struct WordBoundaryBackend {
    api_key: String,
    region: String,
    /// Full endpoint override, used by tests to point at a stub server
    endpoint: Option<String>,
}

impl WordBoundaryBackend {
    pub fn new(api_key: String, region: String) -> SynthesisResult<Self> {
        Ok(Self {
            api_key,
            region,
            endpoint: None,
        })
    }

    /// Point the backend at an explicit endpoint instead of the regional one
    pub fn with_endpoint(api_key: String, endpoint: String) -> Self {
        Self {
            api_key,
            region: String::new(),
            endpoint: Some(endpoint),
        }
    }

    fn websocket_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!(
                "wss://{}.tts.speech.microsoft.com/cognitiveservices/websocket/v1",
                self.region
            ),
        }
    }

    /// Build the SSML body and return it with the character offset at which
    /// the chunk text starts inside the document
    fn build_ssml(text: &str, voice: &VoiceSpec) -> (String, usize) {
        let voice_name = voice
            .voice_name
            .as_deref()
            .or(voice.voice_id.as_deref())
            .unwrap_or(DEFAULT_VOICE_NAME);
        let rate = voice.speaking_rate.unwrap_or(1.0);

        let prefix = format!(
            "<speak version='1.0' xml:lang='en-US'><voice name='{voice_name}'><prosody rate='{rate:.2}'>"
        );
        let suffix = "</prosody></voice></speak>";
        let escaped = escape_xml(text);

        let prefix_chars = prefix.chars().count();
        (format!("{prefix}{escaped}{suffix}"), prefix_chars)
    }
}

/// Escape the five XML-significant characters
fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

#[async_trait]
impl SpeechBackend for WordBoundaryBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Wordmark
    }

    async fn synthesize(
        &self,
        chunk: &str,
        voice: &VoiceSpec,
        events: mpsc::Sender<SynthesisEvent>,
    ) -> SynthesisResult<()> {
        let url = self.websocket_url();
        let mut request = url.clone().into_client_request().map_err(|e| {
            SynthesisError::InvalidConfiguration(format!("Invalid endpoint {url}: {e}"))
        })?;
        request.headers_mut().insert(
            SUBSCRIPTION_KEY_HEADER,
            self.api_key.parse().map_err(|_| {
                SynthesisError::InvalidConfiguration("API key is not a valid header value".into())
            })?,
        );

        let (mut socket, _response) = connect_async(request)
            .await
            .map_err(|e| SynthesisError::ConnectionFailed(format!("Vendor socket: {e}")))?;
        debug!("wordmark vendor socket connected: {url}");

        let (ssml, text_base) = Self::build_ssml(chunk, voice);
        socket
            .send(Message::Text(ssml.into()))
            .await
            .map_err(|e| SynthesisError::ProviderError(format!("Failed to send SSML: {e}")))?;

        while let Some(message) = socket.next().await {
            let message = message
                .map_err(|e| SynthesisError::ProviderError(format!("Vendor socket error: {e}")))?;
            match message {
                Message::Binary(data) => {
                    if !data.is_empty() {
                        events
                            .send(SynthesisEvent::Audio(Bytes::from(data)))
                            .await
                            .map_err(|_| closed_receiver())?;
                    }
                }
                Message::Text(text) => match serde_json::from_str::<VendorMessage>(&text) {
                    Ok(VendorMessage::WordBoundary {
                        word,
                        text_offset,
                        audio_offset_ms,
                        duration_ms,
                    }) => {
                        events
                            .send(SynthesisEvent::WordBoundary {
                                word,
                                text_offset: text_offset.saturating_sub(text_base),
                                audio_offset_ms,
                                duration_ms,
                            })
                            .await
                            .map_err(|_| closed_receiver())?;
                    }
                    Ok(VendorMessage::TurnEnd { duration_ms }) => {
                        let _ = socket.close(None).await;
                        events
                            .send(SynthesisEvent::ChunkDone { duration_ms })
                            .await
                            .map_err(|_| closed_receiver())?;
                        return Ok(());
                    }
                    Ok(VendorMessage::Error { message }) => {
                        return Err(SynthesisError::ProviderError(message));
                    }
                    Err(e) => {
                        warn!("Ignoring unrecognized vendor message: {e}");
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }

        Err(SynthesisError::ProviderError(
            "Vendor socket closed before the turn ended".to_string(),
        ))
    }
}

fn closed_receiver() -> SynthesisError {
    SynthesisError::InternalError("Synthesis event receiver closed".to_string())
}
