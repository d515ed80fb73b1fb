use std::sync::Arc;

use serde::Serialize;

use crate::bootstrap::{ReloadContext, ResolvedVideo, SessionParameters};
use crate::error::{BootstrapError, TokenError, TransportError};
use crate::media::TrackType;
use crate::token::{Token, TokenKind};

/// In-band verdict on the token presented to the streaming server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionStatus {
    Accepted,
    /// Token refused, a fresh one may be retried
    SoftRejected,
    /// The minting subsystem itself is considered compromised
    HardRejected,
}

/// Signals raised by the transport while streaming.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Protection(ProtectionStatus),
    ReloadRequested(ReloadContext),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Opening,
    Streaming,
    Reloading,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtectionState {
    #[default]
    Normal,
    Retrying,
    Rejected,
}

/// Snapshot of a session, published after every processed message.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub state: SessionState,
    pub protection: ProtectionState,
    pub consecutive_failures: u32,
    pub token_kind: TokenKind,
    pub events_processed: u64,
    pub rotations_applied: u64,
    pub reloads_applied: u64,
    pub parameters: Arc<SessionParameters>,
    /// Set once the session closed because of an unrecoverable error
    pub close_reason: Option<TransportError>,
}

/// Everything the session's event loop consumes, in arrival order.
#[derive(Debug)]
pub(crate) enum SessionMessage {
    Event(SessionEvent),
    TokenMinted {
        generation: u64,
        result: Result<Token, TokenError>,
    },
    ReloadResolved(Result<ResolvedVideo, BootstrapError>),
    TrackEnded(TrackType),
    Close,
}
