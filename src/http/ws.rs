use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::state::AppState;
use crate::session::{InboundEvent, OutboundMessage, SessionConfig, TranscriptionSession};

/// Capacity of the session -> socket writer channel
const OUTBOUND_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    /// `false` selects the direct PCM path (no transcoder)
    pub transcode: Option<bool>,
}

#[derive(Deserialize)]
struct ControlFrame {
    event: String,
}

/// Map a text frame to an inbound event. Only `{"event":"end"}` is accepted.
pub fn parse_text_frame(text: &str) -> InboundEvent {
    match serde_json::from_str::<ControlFrame>(text) {
        Ok(frame) if frame.event == "end" => InboundEvent::End,
        Ok(frame) => InboundEvent::Invalid(format!("unsupported event '{}'", frame.event)),
        Err(_) => InboundEvent::Invalid("text frames must be {\"event\":\"end\"}".to_string()),
    }
}

/// Map one socket read to an inbound event. Control frames yield nothing;
/// pings are answered by the socket itself.
pub fn inbound_event(message: Result<Message, axum::Error>) -> Option<InboundEvent> {
    match message {
        Ok(Message::Binary(data)) => Some(InboundEvent::Chunk(Bytes::from(data))),
        Ok(Message::Text(text)) => Some(parse_text_frame(&text)),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Close(_)) => None,
        Err(e) => Some(InboundEvent::TransportError(e.to_string())),
    }
}

/// GET /api/v1/transcribe/stream
pub async fn transcribe_stream(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let transcode = params.transcode.unwrap_or(true);
    ws.on_upgrade(move |socket| handle_socket(socket, state, transcode))
}

async fn handle_socket(socket: WebSocket, state: AppState, transcode: bool) {
    let config = SessionConfig {
        transcode,
        transcoder: state.transcoder.clone(),
        recognition: state.recognition.clone(),
        ..Default::default()
    };
    let session = TranscriptionSession::new(config, state.strategy.clone());
    let session_id = session.id().to_string();
    info!(%session_id, transcode, "WebSocket connected");

    let (mut sink, receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode outbound message: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                debug!("WebSocket writer stopped");
                return;
            }
        }
        // Session closed
        let _ = sink.send(Message::Close(None)).await;
        debug!("WebSocket writer stopped");
    });

    let inbound = receiver
        .filter_map(|message| futures::future::ready(inbound_event(message)))
        .boxed();

    state
        .sessions
        .write()
        .await
        .insert(session_id.clone(), session.handle());

    let report = session.run(inbound, out_tx).await;

    state.sessions.write().await.remove(&session_id);

    if let Err(e) = writer.await {
        warn!("WebSocket writer task failed: {}", e);
    }

    info!(
        %session_id,
        state = %report.final_state,
        errored = report.errored,
        results = report.stats.results_sent,
        "WebSocket disconnected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_frame() {
        assert_eq!(parse_text_frame(r#"{"event":"end"}"#), InboundEvent::End);
    }

    #[test]
    fn test_other_text_is_invalid() {
        assert!(matches!(
            parse_text_frame(r#"{"event":"pause"}"#),
            InboundEvent::Invalid(_)
        ));
        assert!(matches!(parse_text_frame("hello"), InboundEvent::Invalid(_)));
    }

    #[test]
    fn test_control_frames_are_not_session_events() {
        assert_eq!(inbound_event(Ok(Message::Ping(vec![1, 2]))), None);
        assert_eq!(inbound_event(Ok(Message::Pong(vec![]))), None);
        assert_eq!(inbound_event(Ok(Message::Close(None))), None);
    }

    #[test]
    fn test_data_frames_and_errors_map_to_events() {
        assert_eq!(
            inbound_event(Ok(Message::Binary(vec![7, 7]))),
            Some(InboundEvent::Chunk(Bytes::from_static(&[7, 7])))
        );
        assert_eq!(
            inbound_event(Ok(Message::Text(r#"{"event":"end"}"#.to_string()))),
            Some(InboundEvent::End)
        );
        assert!(matches!(
            inbound_event(Err(axum::Error::new("connection reset"))),
            Some(InboundEvent::TransportError(_))
        ));
    }
}
