//! Error types for talkback

use thiserror::Error;

/// Result type alias for talkback operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the gateway and the voice session
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Upstream could not be reached (DNS, TLS, refused connection, timeout)
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream answered with a body that is not JSON
    #[error("upstream parse error: {0}")]
    UpstreamParse(String),

    /// Inbound proxy request could not be parsed
    #[error("setup error: {0}")]
    Setup(String),

    /// Chat round trip through the gateway failed
    #[error("chat error: {0}")]
    Chat(String),

    /// Microphone access denied or unavailable
    #[error("permission error: {0}")]
    Permission(String),

    /// Speech recognition error
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Text-to-speech error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio decoding or playback error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
