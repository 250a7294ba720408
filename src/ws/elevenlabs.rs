//! Handles the outbound WebSocket connection to ElevenLabs Conversational AI.
//!
//! One connection is opened per call session and runs in its own task,
//! pushing caller audio up and relaying agent audio back to the Twilio
//! sink it was handed at spawn time.

use crate::{
    state::AppState,
    ws::protocol::TwilioOutbound,
};
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{debug, error, info, warn};

const CONVAI_ENDPOINT: &str = "wss://api.elevenlabs.io/v1/convai/conversation";

/// Messages received from the ElevenLabs conversation WebSocket, tagged
/// by their `type` discriminator.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Session metadata sent once after the conversation opens.
    ConversationInitiationMetadata,
    /// AI-generated audio for the caller.
    Audio {
        #[serde(default)]
        audio_event: Option<AudioEvent>,
    },
    /// Keepalive.
    Ping,
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
pub struct AudioEvent {
    #[serde(default)]
    pub audio_base_64: Option<String>,
}

/// The only frame this relay sends to ElevenLabs: a chunk of caller audio.
#[derive(Serialize, Debug)]
pub struct UserAudioChunk {
    pub user_audio_chunk: String,
}

/// An event passed from the call session to the connector task.
#[derive(Debug)]
pub enum AgentClientEvent {
    /// A normalized base64 chunk of caller audio.
    Audio(String),
}

/// Spawns the connector task for one call session.
///
/// Returns the sender used to push caller audio into the task and the
/// task handle for final cleanup. Dropping the sender makes the task
/// close the ElevenLabs socket and exit.
pub fn start(
    state: Arc<AppState>,
    socket_tx: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    stream_sid: Arc<Mutex<Option<String>>>,
) -> (mpsc::Sender<AgentClientEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(128);

    let handle = tokio::spawn(async move {
        if let Err(e) = run(&state, rx, socket_tx, stream_sid).await {
            error!(error = ?e, "Agent connector task failed");
        }
    });

    (tx, handle)
}

/// Runs the main loop for the ElevenLabs conversation connection.
///
/// Connects to the conversation endpoint for the configured agent, then
/// proxies frames in both directions until either side is done. If the
/// agent closes or errors, the task exits without touching the Twilio
/// socket; the caller side keeps running and its audio is dropped.
async fn run(
    state: &Arc<AppState>,
    mut rx: mpsc::Receiver<AgentClientEvent>,
    socket_tx: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    stream_sid: Arc<Mutex<Option<String>>>,
) -> Result<()> {
    let url = format!(
        "{}?agent_id={}",
        CONVAI_ENDPOINT, state.config.agent_id
    );

    let (ws_stream, _) = connect_async(url).await?;
    info!("Connected to the conversational agent.");
    let (mut agent_tx, mut agent_rx) = ws_stream.split();

    loop {
        tokio::select! {
            // Caller audio from the session, or channel closure on stop/disconnect.
            event = rx.recv() => match event {
                Some(AgentClientEvent::Audio(chunk)) => {
                    let msg = UserAudioChunk { user_audio_chunk: chunk };
                    agent_tx
                        .send(WsMessage::Text(serde_json::to_string(&msg)?.into()))
                        .await?;
                }
                None => {
                    info!("Session ended. Closing agent connection.");
                    let _ = agent_tx.send(WsMessage::Close(None)).await;
                    break;
                }
            },
            // Frames from the agent.
            Some(msg_result) = agent_rx.next() => {
                match msg_result {
                    Ok(WsMessage::Text(text)) => {
                        match serde_json::from_str::<AgentEvent>(&text) {
                            Ok(event) => {
                                handle_agent_event(event, &socket_tx, &stream_sid).await?;
                            }
                            Err(e) => error!("Error parsing agent message: {}", e),
                        }
                    }
                    Ok(WsMessage::Close(close_frame)) => {
                        info!(?close_frame, "Agent closed the connection.");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("Error reading from agent WebSocket: {}", e);
                        break;
                    }
                }
            },
            else => break,
        }
    }

    Ok(())
}

/// Dispatches one parsed agent event, relaying audio to the Twilio sink.
async fn handle_agent_event(
    event: AgentEvent,
    socket_tx: &Arc<Mutex<SplitSink<WebSocket, Message>>>,
    stream_sid: &Arc<Mutex<Option<String>>>,
) -> Result<()> {
    match event {
        AgentEvent::ConversationInitiationMetadata => {
            info!("Received conversation initiation metadata.");
        }
        AgentEvent::Audio { audio_event } => {
            match audio_event.and_then(|a| a.audio_base_64) {
                Some(audio) => {
                    // Audio that arrives before Twilio's start event is
                    // relayed with a null stream identifier.
                    let sid = stream_sid.lock().await.clone();
                    let frame = TwilioOutbound::media(sid, audio);
                    let mut sink = socket_tx.lock().await;
                    sink.send(Message::Text(serde_json::to_string(&frame)?.into()))
                        .await?;
                }
                None => error!("Agent audio event carried no audio payload."),
            }
        }
        AgentEvent::Ping => debug!("Received ping from the agent."),
        AgentEvent::Other => warn!("Unhandled agent message type."),
    }
    Ok(())
}
