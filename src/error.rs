use thiserror::Error;

/// Errors surfaced by the voice session and its audio pipelines.
#[derive(Error, Debug)]
pub enum LiveError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid endpoint URL: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Audio decode error: {0}")]
    AudioDecode(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Failed to send message: channel closed")]
    Send,

    #[error("Session is closed or not ready")]
    NotReady,

    #[error("Internal error: {0}")]
    Internal(String),
}
