//! Axum Handlers for the HTTP surface
//!
//! Two plain HTTP endpoints exist next to the media-stream WebSocket: a
//! health check and the Twilio inbound-call webhook, which answers with
//! TwiML pointing the call back at our `/media-stream` endpoint.

use axum::{
    http::{HeaderMap, header},
    response::{IntoResponse, Json},
};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub message: String,
}

/// Health check for the root path.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        message: "Server is running".to_string(),
    })
}

/// Answers Twilio's inbound-call webhook with TwiML that instructs the
/// platform to open a bidirectional media stream to this server.
///
/// Accepts any method and performs no validation; the `Host` header is
/// spliced into the stream URL verbatim, so a malformed host produces a
/// malformed URL rather than an error.
pub async fn inbound_call(headers: HeaderMap) -> impl IntoResponse {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    (
        [(header::CONTENT_TYPE, "text/xml")],
        stream_twiml(host),
    )
}

/// Builds the TwiML document connecting a call to the media-stream endpoint.
fn stream_twiml(host: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <Response><Connect><Stream url=\"wss://{host}/media-stream\" /></Connect></Response>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twiml_contains_stream_url_for_host() {
        let body = stream_twiml("example.ngrok.io");
        assert!(body.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(body.contains("<Stream url=\"wss://example.ngrok.io/media-stream\" />"));
        assert!(body.contains("<Response><Connect>"));
    }

    #[test]
    fn test_twiml_with_empty_host() {
        // A missing Host header degrades to an unusable URL, not an error.
        let body = stream_twiml("");
        assert!(body.contains("<Stream url=\"wss:///media-stream\" />"));
    }

    #[test]
    fn test_health_response_shape() {
        let json = serde_json::to_string(&HealthResponse {
            message: "Server is running".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"message":"Server is running"}"#);
    }
}
