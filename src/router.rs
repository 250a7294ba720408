//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the relay: the
//! health check, the Twilio inbound-call webhook, and the media-stream
//! WebSocket endpoint.

use crate::{handlers, state::AppState, ws::ws_handler};

use axum::{
    Router,
    routing::{any, get},
};
use std::sync::Arc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        // Twilio posts the webhook but the route accepts any method.
        .route("/twilio/inbound_call", any(handlers::inbound_call))
        .route("/media-stream", get(ws_handler))
        .with_state(app_state)
}
