//! Defines the WebSocket message envelopes exchanged with the Twilio media stream.
//!
//! Twilio tags every frame with an `event` discriminator. Modelling the
//! family as a closed enum means an unhandled variant is an explicit
//! `Other` arm instead of a silently ignored string.

use base64::Engine;
use serde::{Deserialize, Serialize};

/// Messages received from the Twilio media-stream WebSocket.
#[derive(Deserialize, Debug)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TwilioEvent {
    /// Handshake acknowledgment sent once after the socket opens.
    Connected,
    /// Marks the start of the media stream and carries its identifier.
    Start { start: StreamStart },
    /// A chunk of caller audio, base64-encoded mu-law.
    Media { media: MediaPayload },
    /// The call ended; the stream is about to close.
    Stop,
    /// Any event type this relay does not handle.
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
pub struct StreamStart {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MediaPayload {
    pub payload: String,
}

/// Messages sent back to the Twilio media-stream WebSocket.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TwilioOutbound {
    /// AI-generated audio addressed to the active stream. `stream_sid` is
    /// `None` (serialized as JSON null) if audio arrives before the
    /// `start` event was processed.
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: Option<String>,
        media: MediaPayload,
    },
}

impl TwilioOutbound {
    /// Wraps an agent audio chunk in the envelope Twilio expects.
    pub fn media(stream_sid: Option<String>, payload: String) -> Self {
        TwilioOutbound::Media {
            stream_sid,
            media: MediaPayload { payload },
        }
    }
}

/// Decodes a base64 audio payload and re-encodes it for the agent side.
///
/// Both wire formats carry the same base64 mu-law encoding, so the
/// round-trip is an identity for well-formed input; it doubles as
/// validation, rejecting payloads that are not valid base64.
pub fn normalize_audio_payload(payload: &str) -> Result<String, base64::DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}
