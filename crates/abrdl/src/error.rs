use std::sync::Arc;

use reqwest::StatusCode;

use crate::media::TrackType;

/// Failures of the proof-of-origin token subsystem.
///
/// Cloneable because a single in-flight mint is shared by every caller
/// waiting on it.
#[derive(Debug, thiserror::Error, Clone)]
pub enum TokenError {
    #[error("Challenge subsystem unavailable: {0}")]
    ChallengeUnavailable(String),

    #[error("Token mint timed out after {0:?}")]
    MintTimeout(std::time::Duration),

    #[error("Token invalidation timed out after {0:?}")]
    InvalidateTimeout(std::time::Duration),

    #[error("Token provider error: {0}")]
    Provider(String),

    #[error("Network error: {source}")]
    Network {
        #[from]
        source: Arc<reqwest::Error>,
    },

    #[error("Token rotation exhausted after {0} consecutive failures")]
    RotationExhausted(u32),
}

impl From<reqwest::Error> for TokenError {
    fn from(err: reqwest::Error) -> Self {
        TokenError::Network {
            source: Arc::new(err),
        }
    }
}

/// Failures while resolving an identifier into session parameters.
#[derive(Debug, thiserror::Error, Clone)]
pub enum BootstrapError {
    #[error("Video is not playable: {0}")]
    NotPlayable(String),

    #[error("Restricted content: {0}")]
    Restricted(String),

    #[error("Streaming endpoint missing from player response")]
    MissingStreamingEndpoint,

    #[error("Transport config missing from player response")]
    MissingTransportConfig,

    #[error("No adaptive formats in player response")]
    NoFormats,

    #[error("Failed to decipher streaming endpoint: {0}")]
    Decipher(String),

    #[error("Metadata resolution timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Network error: {source}")]
    Network {
        #[from]
        source: Arc<reqwest::Error>,
    },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for BootstrapError {
    fn from(err: reqwest::Error) -> Self {
        BootstrapError::Network {
            source: Arc::new(err),
        }
    }
}

impl From<serde_json::Error> for BootstrapError {
    fn from(err: serde_json::Error) -> Self {
        BootstrapError::InvalidResponse(err.to_string())
    }
}

/// Failures of the adaptive transport or of a track stream.
#[derive(Debug, thiserror::Error, Clone)]
pub enum TransportError {
    #[error("Failed to open stream session: {0}")]
    SessionOpen(String),

    #[error("Opening the stream session timed out after {0:?}")]
    OpenTimeout(std::time::Duration),

    #[error("Server returned status code {0}")]
    Status(StatusCode),

    #[error("Request rejected by stream protection after {0} attempts")]
    Rejected(u32),

    #[error("Network error: {source}")]
    Network {
        #[from]
        source: Arc<reqwest::Error>,
    },

    #[error("Invalid transport parameters: {0}")]
    InvalidParameters(String),

    #[error("Server returned no data for the range at offset {0}")]
    EmptyRange(u64),

    #[error("Session escalated: {0}")]
    Escalated(TokenError),

    #[error("Stream session cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Network {
            source: Arc::new(err),
        }
    }
}

/// Failures writing a track to its destination.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error on {track} sink: {source}")]
    Io {
        track: TrackType,
        #[source]
        source: std::io::Error,
    },

    #[error("Sink for {0} track is already closed")]
    Closed(TrackType),
}

#[derive(Debug, thiserror::Error, Clone)]
pub enum SelectionError {
    #[error("No {0} format matches the requested preference")]
    NoMatchingFormat(TrackType),
}

// Top-level error for one download invocation
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Metadata error: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("Format selection error: {0}")]
    Selection(#[from] SelectionError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid proxy configuration: {0}")]
    Proxy(String),

    #[error("{track} track failed: {reason}")]
    TrackFailed { track: TrackType, reason: String },

    #[error("Download cancelled")]
    Cancelled,
}
