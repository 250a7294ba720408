//! Callbridge Library Crate
//!
//! This library contains all the logic for bridging Twilio media streams
//! to the ElevenLabs Conversational AI WebSocket: configuration, shared
//! state, HTTP handlers, the per-call relay, and routing. The `server`
//! binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod ws;
