//! WebSocket Relay Logic
//!
//! This module contains the per-call relay between the Twilio media
//! stream and the ElevenLabs conversational agent. It is structured into
//! submodules for clarity:
//!
//! - `protocol`: Defines the JSON envelopes exchanged with the Twilio media stream.
//! - `session`: Manages the Twilio WebSocket lifecycle, from upgrade to teardown.
//! - `elevenlabs`: Handles the outbound connection to the conversational agent.

pub mod elevenlabs;
pub mod protocol;
pub mod session;

pub use session::ws_handler;
