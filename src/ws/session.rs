//! Manages the Twilio media-stream WebSocket lifecycle for one call.

use super::{
    elevenlabs::{self, AgentClientEvent},
    protocol::{TwilioEvent, normalize_audio_payload},
};
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, instrument, warn};

/// Axum handler to upgrade the media-stream HTTP request to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for one call session.
///
/// Owns the Twilio socket for the call's lifetime. The companion agent
/// connection is spawned before the first Twilio frame is read, so the
/// agent side is ready by the time audio starts flowing. Dropping the
/// channel sender is how the session tells the connector to close the
/// agent socket, on `stop` as well as on disconnect.
#[instrument(name = "call_session", skip_all, fields(stream_sid))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("Twilio connected to media stream.");

    let (socket_tx, mut socket_rx) = socket.split();
    let socket_tx = Arc::new(Mutex::new(socket_tx));
    let stream_sid: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    let (agent_tx, _agent_handle) =
        elevenlabs::start(state, socket_tx.clone(), stream_sid.clone());
    let mut agent_tx = Some(agent_tx);

    while let Some(msg_result) = socket_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<TwilioEvent>(&text) {
                Ok(event) => handle_twilio_event(event, &mut agent_tx, &stream_sid).await,
                Err(e) => error!("Error parsing Twilio message: {}", e),
            },
            Ok(Message::Close(_)) => {
                info!("Twilio client disconnected.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("Error reading from Twilio WebSocket: {}", e);
                break;
            }
        }
    }

    // The connector may already have exited on its own; dropping the
    // sender a second time is a no-op.
    drop(agent_tx.take());
    info!("Call session finished.");
}

/// Dispatches one parsed Twilio event.
async fn handle_twilio_event(
    event: TwilioEvent,
    agent_tx: &mut Option<mpsc::Sender<AgentClientEvent>>,
    stream_sid: &Arc<Mutex<Option<String>>>,
) {
    match event {
        TwilioEvent::Connected => {
            info!("Connection established, waiting for audio data...");
        }
        TwilioEvent::Start { start } => {
            tracing::Span::current().record("stream_sid", &start.stream_sid);
            info!(stream_sid = %start.stream_sid, "Stream started.");
            *stream_sid.lock().await = Some(start.stream_sid);
        }
        TwilioEvent::Media { media } => {
            let Some(tx) = agent_tx.as_ref() else {
                debug!("Agent connection is closed, dropping audio chunk.");
                return;
            };
            match normalize_audio_payload(&media.payload) {
                Ok(chunk) => {
                    // Frames are never queued or retried once the
                    // connector is gone.
                    if tx.send(AgentClientEvent::Audio(chunk)).await.is_err() {
                        warn!("Agent connector is gone, dropping audio chunk.");
                    }
                }
                Err(e) => error!("Media payload is not valid base64: {}", e),
            }
        }
        TwilioEvent::Stop => {
            info!("Stream stopped.");
            *agent_tx = None;
        }
        TwilioEvent::Other => warn!("Received unhandled Twilio event."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    fn parse(text: &str) -> TwilioEvent {
        serde_json::from_str(text).unwrap()
    }

    fn shared_sid() -> Arc<Mutex<Option<String>>> {
        Arc::new(Mutex::new(None))
    }

    #[tokio::test]
    async fn test_start_event_captures_stream_sid() {
        let (tx, _rx) = mpsc::channel(8);
        let mut agent_tx = Some(tx);
        let sid = shared_sid();

        handle_twilio_event(
            parse(r#"{"event":"start","start":{"streamSid":"CA123"}}"#),
            &mut agent_tx,
            &sid,
        )
        .await;

        assert_eq!(sid.lock().await.as_deref(), Some("CA123"));
    }

    #[tokio::test]
    async fn test_media_after_start_forwards_normalized_chunk() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut agent_tx = Some(tx);
        let sid = shared_sid();

        handle_twilio_event(
            parse(r#"{"event":"start","start":{"streamSid":"CA123"}}"#),
            &mut agent_tx,
            &sid,
        )
        .await;
        handle_twilio_event(
            parse(r#"{"event":"media","media":{"payload":"AAAA"}}"#),
            &mut agent_tx,
            &sid,
        )
        .await;

        let AgentClientEvent::Audio(chunk) = rx.try_recv().unwrap();
        assert_eq!(chunk, "AAAA");
    }

    #[tokio::test]
    async fn test_invalid_media_payload_is_dropped() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut agent_tx = Some(tx);
        let sid = shared_sid();

        handle_twilio_event(
            parse(r#"{"event":"media","media":{"payload":"not base64!"}}"#),
            &mut agent_tx,
            &sid,
        )
        .await;

        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[tokio::test]
    async fn test_stop_closes_agent_channel() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut agent_tx = Some(tx);
        let sid = shared_sid();

        handle_twilio_event(parse(r#"{"event":"stop"}"#), &mut agent_tx, &sid).await;

        assert!(agent_tx.is_none());
        // The receiving side observes closure, which is what makes the
        // connector shut the agent socket.
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Disconnected);
    }

    #[tokio::test]
    async fn test_media_after_stop_is_dropped() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut agent_tx = Some(tx);
        let sid = shared_sid();

        handle_twilio_event(parse(r#"{"event":"stop"}"#), &mut agent_tx, &sid).await;
        handle_twilio_event(
            parse(r#"{"event":"media","media":{"payload":"AAAA"}}"#),
            &mut agent_tx,
            &sid,
        )
        .await;

        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Disconnected);
    }

    #[tokio::test]
    async fn test_connected_and_unknown_events_change_nothing() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut agent_tx = Some(tx);
        let sid = shared_sid();

        handle_twilio_event(parse(r#"{"event":"connected"}"#), &mut agent_tx, &sid).await;
        handle_twilio_event(
            parse(r#"{"event":"mark","mark":{"name":"x"}}"#),
            &mut agent_tx,
            &sid,
        )
        .await;

        assert!(agent_tx.is_some());
        assert!(sid.lock().await.is_none());
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
    }
}
