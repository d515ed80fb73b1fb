//! # abrdl engine
//!
//! Resilient downloader for adaptive audio/video streams guarded by rotating
//! proof-of-origin tokens.
//!
//! ## Features
//!
//! - Single-flight token minting with caching and placeholder tokens
//! - In-session handling of protection verdicts and reload requests
//! - Concurrent audio/video track piping with progress reporting
//! - Capability traits for the platform API, the transport and the minter

pub mod bootstrap;
pub mod builder;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod media;
pub mod progress;
pub mod proxy;
pub mod session;
pub mod sink;
pub mod token;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;

pub use builder::EngineConfigBuilder;
pub use config::{EngineConfig, HttpConfig, RotationPolicy};
pub use error::{
    BootstrapError, DownloadError, SelectionError, SinkError, TokenError, TransportError,
};

pub use bootstrap::{Bootstrapper, MetadataProvider, VideoDetails};
pub use client::create_client;
pub use coordinator::{
    DownloadCoordinator, DownloadOutcome, DownloadRequest, FormatSummary, TrackOutcome,
    TrackStatus, VideoInfo,
};
pub use media::{Container, FormatDescriptor, TrackMode, TrackPreference, TrackSelection, TrackType, VideoIdentifier};
pub use progress::{OnProgress, Progress, ProgressEvent};
pub use session::{AdaptiveTransport, StreamSession, TransportControl};
pub use sink::ProgressTrackedSink;
pub use token::{Token, TokenKind, TokenManager, TokenMinter};

// Re-export proxy utilities
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
