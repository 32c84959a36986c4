//! Character-timestamp synthesis backend
//!
//! Streams audio over a chunked HTTP response from a vendor endpoint that
//! reports character-level timing. The response body is a sequence of JSON
//! lines; each line carries a base64 audio frame and, optionally, a slice of
//! character alignment. Audio frames are forwarded the moment they decode;
//! the accumulated alignment is emitted once, after the stream ends, followed
//! by `ChunkDone` with the chunk duration.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::base::{
    CharAlignment, ProviderKind, SpeechBackend, SynthesisError, SynthesisEvent, SynthesisResult,
    VoiceSpec,
};

/// Default vendor endpoint; tests and self-hosted deployments override it
pub const CHARALIGN_TTS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";
const API_KEY_HEADER: &str = "xi-api-key";

/// One line of the vendor's streaming response
#[derive(Debug, Deserialize)]
struct StreamLine {
    #[serde(default)]
    audio_base64: Option<String>,
    #[serde(default)]
    alignment: Option<CharAlignment>,
}

/// Voice tuning forwarded in the request body
#[derive(Debug, Clone, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f32>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.8,
            speed: None,
        }
    }
}

/// Character-timestamp backend ("charalign")
pub struct CharAlignBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl CharAlignBackend {
    pub fn new(api_key: String, base_url: Option<String>) -> SynthesisResult<Self> {
        let base_url = base_url.unwrap_or_else(|| CHARALIGN_TTS_URL.to_string());
        url::Url::parse(&base_url).map_err(|e| {
            SynthesisError::InvalidConfiguration(format!("Invalid synthesis endpoint {base_url}: {e}"))
        })?;
        let client = reqwest::Client::new();
        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    /// Build the streaming-with-timestamps request for one chunk
    fn build_request(&self, text: &str, voice: &VoiceSpec) -> reqwest::RequestBuilder {
        let voice_id = voice.voice_id.as_deref().unwrap_or(DEFAULT_VOICE_ID);
        let sample_rate = voice.sample_rate.unwrap_or(24_000);
        let url = format!(
            "{}/{voice_id}/stream/with-timestamps?output_format=pcm_{sample_rate}",
            self.base_url
        );

        let voice_settings = VoiceSettings {
            speed: voice.speaking_rate,
            ..Default::default()
        };

        let body = json!({
            "text": text,
            "voice_settings": voice_settings,
        });

        self.client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("Accept", "audio/pcm")
            .json(&body)
    }

    /// Merge one alignment slice into the running chunk alignment
    ///
    /// Vendors report each slice with times relative to the slice's own audio;
    /// re-base them onto the chunk so the final alignment is monotonic.
    fn merge_alignment(total: &mut CharAlignment, slice: CharAlignment, base_ms: u64) {
        for ((c, start), duration) in slice
            .chars
            .into_iter()
            .zip(slice.char_start_times_ms)
            .zip(slice.char_durations_ms)
        {
            total.chars.push(c);
            total.char_start_times_ms.push(base_ms + start);
            total.char_durations_ms.push(duration);
        }
    }
}

#[async_trait]
impl SpeechBackend for CharAlignBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Charalign
    }

    async fn synthesize(
        &self,
        chunk: &str,
        voice: &VoiceSpec,
        events: mpsc::Sender<SynthesisEvent>,
    ) -> SynthesisResult<()> {
        let response = self
            .build_request(chunk, voice)
            .send()
            .await
            .map_err(|e| SynthesisError::ConnectionFailed(format!("Synthesis request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::ProviderError(format!(
                "Synthesis endpoint returned {status}: {body}"
            )));
        }

        let mut alignment = CharAlignment::default();
        let mut line_buffer = String::new();
        let mut body_stream = response.bytes_stream();

        while let Some(piece) = body_stream.next().await {
            let piece = piece
                .map_err(|e| SynthesisError::ProviderError(format!("Stream read failed: {e}")))?;
            line_buffer.push_str(&String::from_utf8_lossy(&piece));

            while let Some(newline) = line_buffer.find('\n') {
                let line: String = line_buffer.drain(..=newline).collect();
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                handle_line(line, &events, &mut alignment).await?;
            }
        }

        // A final line without a trailing newline is still a frame
        let last = line_buffer.trim();
        if !last.is_empty() {
            handle_line(last, &events, &mut alignment).await?;
        }

        let duration_ms = alignment.end_ms();
        debug!(
            "charalign chunk done: {} chars aligned, {duration_ms}ms",
            alignment.chars.len()
        );

        if !alignment.is_empty() {
            events
                .send(SynthesisEvent::CharacterAlignment(alignment))
                .await
                .map_err(|_| closed_receiver())?;
        }
        events
            .send(SynthesisEvent::ChunkDone { duration_ms })
            .await
            .map_err(|_| closed_receiver())?;

        Ok(())
    }
}

fn closed_receiver() -> SynthesisError {
    SynthesisError::InternalError("Synthesis event receiver closed".to_string())
}

/// Decode one response line into events and alignment state
async fn handle_line(
    line: &str,
    events: &mpsc::Sender<SynthesisEvent>,
    alignment: &mut CharAlignment,
) -> SynthesisResult<()> {
    let parsed: StreamLine = match serde_json::from_str(line) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Skipping malformed stream line: {e}");
            return Ok(());
        }
    };

    if let Some(encoded) = parsed.audio_base64 {
        let audio = BASE64.decode(encoded.as_bytes()).map_err(|e| {
            SynthesisError::ProviderError(format!("Invalid base64 audio frame: {e}"))
        })?;
        if !audio.is_empty() {
            events
                .send(SynthesisEvent::Audio(Bytes::from(audio)))
                .await
                .map_err(|_| closed_receiver())?;
        }
    }

    if let Some(slice) = parsed.alignment {
        let base_ms = alignment.end_ms();
        CharAlignBackend::merge_alignment(alignment, slice, base_ms);
    }

    Ok(())
}
