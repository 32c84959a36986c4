//! Client transport session
//!
//! Owns the voice socket for one session. A background task demultiplexes
//! incoming binary audio frames and JSON control messages into
//! [`TransportEvent`]s, and serializes outgoing chunk requests. The socket
//! is reused for every chunk of every segment until the session stops; any
//! socket-level error or server `error` message is fatal for the session.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::client::IntoClientRequest,
    tungstenite::http::header::AUTHORIZATION,
    tungstenite::protocol::Message,
};
use tracing::{debug, error, warn};

use crate::core::player::{PlaybackError, PlaybackResult};
use crate::core::protocol::{AlignmentPayload, ServerMessage, SpeakRequest, WordBoundaryData};

/// Channel buffer sized for audio workloads
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Events surfaced to the session orchestrator
#[derive(Debug)]
pub enum TransportEvent {
    /// Raw audio bytes for the chunk in progress
    Audio(Bytes),
    WordBoundary(WordBoundaryData),
    Alignment(AlignmentPayload),
    /// The outstanding chunk finished; the next one may be sent
    ChunkComplete,
    /// Server-reported or socket-level failure; session-fatal
    Error(String),
    /// The socket closed
    Closed,
}

/// One socket-backed voicing conversation
pub struct TransportSession {
    outgoing: mpsc::UnboundedSender<SpeakRequest>,
    task: JoinHandle<()>,
}

impl TransportSession {
    /// Connect the voice socket and start the demultiplexing task
    ///
    /// Authentication happens once here, via a bearer token on the upgrade
    /// request; a server that rejects it replies with an `error` message and
    /// closes.
    pub async fn connect(
        url: &str,
        auth_token: Option<&str>,
    ) -> PlaybackResult<(Self, mpsc::Receiver<TransportEvent>)> {
        let mut request = url
            .into_client_request()
            .map_err(|e| PlaybackError::TransportError(format!("Invalid server URL {url}: {e}")))?;
        if let Some(token) = auth_token {
            request.headers_mut().insert(
                AUTHORIZATION,
                format!("Bearer {token}").parse().map_err(|_| {
                    PlaybackError::TransportError("Auth token is not a valid header value".into())
                })?,
            );
        }

        let (ws_stream, _response) = connect_async(request)
            .await
            .map_err(|e| PlaybackError::TransportError(format!("Connection failed: {e}")))?;
        debug!("Voice socket connected: {url}");

        let (event_tx, event_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_socket(ws_stream, event_tx, outgoing_rx));

        Ok((
            Self {
                outgoing: outgoing_tx,
                task,
            },
            event_rx,
        ))
    }

    /// Socketless session for unit tests; sent requests land on the receiver
    #[cfg(test)]
    pub(crate) fn stub() -> (Self, mpsc::UnboundedReceiver<SpeakRequest>) {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        (
            Self {
                outgoing: outgoing_tx,
                task: tokio::spawn(async {}),
            },
            outgoing_rx,
        )
    }

    /// Send one chunk request. The caller enforces the no-overlap discipline.
    pub fn send_chunk(&self, request: SpeakRequest) -> PlaybackResult<()> {
        self.outgoing
            .send(request)
            .map_err(|_| PlaybackError::TransportError("Voice socket task gone".to_string()))
    }

    /// Tear the socket down. Idempotent.
    pub fn close(&self) {
        self.task.abort();
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Socket loop: forward incoming frames as events, write outgoing requests
async fn run_socket(
    mut ws_stream: WsStream,
    events: mpsc::Sender<TransportEvent>,
    mut outgoing: mpsc::UnboundedReceiver<SpeakRequest>,
) {
    loop {
        tokio::select! {
            message = ws_stream.next() => {
                match message {
                    Some(Ok(msg)) => {
                        if !forward_message(msg, &events).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("Voice socket error: {e}");
                        let _ = events
                            .send(TransportEvent::Error(format!("Socket error: {e}")))
                            .await;
                        break;
                    }
                    None => {
                        debug!("Voice socket stream ended");
                        let _ = events.send(TransportEvent::Closed).await;
                        break;
                    }
                }
            }
            request = outgoing.recv() => {
                match request {
                    Some(request) => {
                        let json = match serde_json::to_string(&request) {
                            Ok(json) => json,
                            Err(e) => {
                                error!("Failed to serialize chunk request: {e}");
                                continue;
                            }
                        };
                        if let Err(e) = ws_stream.send(Message::Text(json.into())).await {
                            let _ = events
                                .send(TransportEvent::Error(format!("Send failed: {e}")))
                                .await;
                            break;
                        }
                    }
                    None => {
                        debug!("Chunk request channel closed, shutting down socket");
                        let _ = ws_stream.close(None).await;
                        break;
                    }
                }
            }
        }
    }
}

/// Map one socket message onto a transport event.
/// Returns false when the socket loop should stop.
async fn forward_message(msg: Message, events: &mpsc::Sender<TransportEvent>) -> bool {
    match msg {
        Message::Binary(data) => events
            .send(TransportEvent::Audio(Bytes::from(data)))
            .await
            .is_ok(),
        Message::Text(text) => {
            let parsed: ServerMessage = match serde_json::from_str(&text) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Ignoring unrecognized server message: {e}");
                    return true;
                }
            };
            let event = match parsed {
                ServerMessage::WordBoundary { data } => TransportEvent::WordBoundary(data),
                ServerMessage::Alignment { data } => TransportEvent::Alignment(data),
                ServerMessage::Complete => TransportEvent::ChunkComplete,
                ServerMessage::Error { message } => {
                    let _ = events.send(TransportEvent::Error(message)).await;
                    return false;
                }
            };
            events.send(event).await.is_ok()
        }
        Message::Close(_) => {
            let _ = events.send(TransportEvent::Closed).await;
            false
        }
        // Ping/pong handled by the library
        _ => true,
    }
}
