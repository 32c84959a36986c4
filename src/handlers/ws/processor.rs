//! Speak request processing
//!
//! Turns one incoming speak request into a stream of outgoing messages:
//! binary audio frames, timing events translated back onto the plain text,
//! and a final `complete`. Empty text is a transient error that keeps the
//! socket open; backend failures and timeouts end the session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::core::tts::{
    CharAlignment, EnhancedText, PositionMap, ProviderKind, SynthesisEvent, VoiceSpec,
    fallback_markup,
};
use crate::state::AppState;

use super::messages::{AlignmentPayload, MessageRoute, ServerMessage, SpeakRequest, WordBoundaryData};

/// Event channel capacity between the backend and the forwarding loop
const EVENT_BUFFER_SIZE: usize = 1024;

/// Handle one speak request end to end.
/// Returns false when the session should end.
pub async fn handle_speak_request(
    request: SpeakRequest,
    app_state: &Arc<AppState>,
    message_tx: &mpsc::Sender<MessageRoute>,
) -> bool {
    if request.text.trim().is_empty() {
        warn!("Rejecting empty chunk text");
        let _ = message_tx
            .send(MessageRoute::Outgoing(ServerMessage::Error {
                message: "Chunk text is empty".to_string(),
            }))
            .await;
        // Transient: the client may send the next chunk
        return true;
    }

    let kind = app_state.select_provider(request.provider);
    let Some(backend) = app_state.backend(kind) else {
        error!("Backend '{kind}' is not configured");
        let _ = message_tx
            .send(MessageRoute::Outgoing(ServerMessage::Error {
                message: format!("Backend '{kind}' is not configured"),
            }))
            .await;
        return false;
    };

    let voice = VoiceSpec {
        voice_id: request
            .voice_id
            .clone()
            .or_else(|| app_state.config.default_voice_id.clone()),
        voice_name: request.voice_name.clone(),
        speaking_rate: None,
        sample_rate: None,
    };

    // Only the character-timestamp backend takes markup; the word-boundary
    // backend handles prosody itself
    let (text, map) = match kind {
        ProviderKind::Charalign => {
            let enhanced = enhance_chunk(app_state, &request).await;
            (enhanced.markup, Some(enhanced.map))
        }
        ProviderKind::Wordmark => (request.text.clone(), None),
    };

    info!(
        "Synthesizing {} chars via '{kind}'",
        request.text.chars().count()
    );

    let (event_tx, mut event_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
    let synthesis = tokio::spawn({
        let backend = backend.clone();
        let voice = voice.clone();
        async move { backend.synthesize(&text, &voice, event_tx).await }
    });

    let deadline = Duration::from_secs(app_state.config.synthesis_timeout_seconds);
    let forward = forward_events(kind, map.as_ref(), &mut event_rx, message_tx);
    match tokio::time::timeout(deadline, forward).await {
        Err(_) => {
            synthesis.abort();
            error!("Chunk synthesis timed out after {}s", deadline.as_secs());
            let _ = message_tx
                .send(MessageRoute::Outgoing(ServerMessage::Error {
                    message: "Synthesis timed out".to_string(),
                }))
                .await;
            false
        }
        Ok(false) => {
            // Socket gone; nothing left to report to
            synthesis.abort();
            false
        }
        Ok(true) => match synthesis.await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Synthesis failed: {e}");
                let _ = message_tx
                    .send(MessageRoute::Outgoing(ServerMessage::Error {
                        message: format!("Synthesis failed: {e}"),
                    }))
                    .await;
                false
            }
            Err(e) => {
                error!("Synthesis task panicked: {e}");
                let _ = message_tx
                    .send(MessageRoute::Outgoing(ServerMessage::Error {
                        message: "Internal synthesis failure".to_string(),
                    }))
                    .await;
                false
            }
        },
    }
}

/// Rewrite chunk text for prosody, falling back to deterministic
/// paragraph-pause markup so content is never dropped
async fn enhance_chunk(app_state: &Arc<AppState>, request: &SpeakRequest) -> EnhancedText {
    if let Some(enhancer) = app_state.enhancer() {
        match enhancer
            .enhance(&request.text, request.context_text.as_deref())
            .await
        {
            Ok(enhanced) => return enhanced,
            Err(e) => warn!("Enhancement failed, using fallback markup: {e}"),
        }
    }
    fallback_markup(&request.text)
}

/// Forward backend events to the socket until the backend finishes.
/// Returns false when the socket side is gone.
async fn forward_events(
    kind: ProviderKind,
    map: Option<&PositionMap>,
    event_rx: &mut mpsc::Receiver<SynthesisEvent>,
    message_tx: &mpsc::Sender<MessageRoute>,
) -> bool {
    while let Some(event) = event_rx.recv().await {
        let sent = match event {
            SynthesisEvent::Audio(bytes) => {
                message_tx.send(MessageRoute::Binary(bytes)).await.is_ok()
            }
            SynthesisEvent::WordBoundary {
                word,
                text_offset,
                audio_offset_ms,
                duration_ms,
            } => {
                // Boundary offsets must land on the plain text even when
                // they point into markup the enhancement inserted
                let text_offset = match map {
                    Some(map) => map.to_plain_clamped(text_offset),
                    None => text_offset,
                };
                message_tx
                    .send(MessageRoute::Outgoing(ServerMessage::WordBoundary {
                        data: WordBoundaryData {
                            word,
                            text_offset,
                            audio_offset_ms,
                            duration_ms,
                        },
                    }))
                    .await
                    .is_ok()
            }
            SynthesisEvent::CharacterAlignment(alignment) => {
                let translated = translate_alignment(alignment, map);
                message_tx
                    .send(MessageRoute::Outgoing(ServerMessage::Alignment {
                        data: AlignmentPayload::Characters(translated),
                    }))
                    .await
                    .is_ok()
            }
            SynthesisEvent::ChunkDone { duration_ms } => {
                // The character backend's duration is implied by its
                // alignment; the word-boundary backend reports it here
                let summary_ok = if kind == ProviderKind::Wordmark {
                    message_tx
                        .send(MessageRoute::Outgoing(ServerMessage::Alignment {
                            data: AlignmentPayload::Summary { duration_ms },
                        }))
                        .await
                        .is_ok()
                } else {
                    true
                };
                summary_ok
                    && message_tx
                        .send(MessageRoute::Outgoing(ServerMessage::Complete))
                        .await
                        .is_ok()
            }
        };
        if !sent {
            return false;
        }
    }
    true
}

/// Project a markup-text alignment back onto the plain chunk text by
/// dropping characters the enhancement inserted
fn translate_alignment(alignment: CharAlignment, map: Option<&PositionMap>) -> CharAlignment {
    let Some(map) = map else {
        return alignment;
    };
    let mut out = CharAlignment::default();
    for (i, c) in alignment.chars.iter().enumerate() {
        if map.to_plain(i).is_none() {
            continue;
        }
        out.chars.push(c.clone());
        if let Some(&start) = alignment.char_start_times_ms.get(i) {
            out.char_start_times_ms.push(start);
        }
        if let Some(&duration) = alignment.char_durations_ms.get(i) {
            out.char_durations_ms.push(duration);
        }
    }
    out
}
