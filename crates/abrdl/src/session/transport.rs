//! Boundary between the session and the adaptive-bitrate transport.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tracing::debug;

use super::events::{ProtectionStatus, SessionEvent, SessionMessage};
use crate::bootstrap::{ReloadContext, SessionParameters, TransportConfig};
use crate::error::TransportError;
use crate::media::{TrackSelection, VideoIdentifier};
use crate::token::Token;

/// Finite, non-restartable byte stream of one track.
pub type TrackStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Handle through which a transport reports in-band signals to its session.
#[derive(Clone, Debug)]
pub struct TransportEvents {
    tx: mpsc::Sender<SessionMessage>,
}

impl TransportEvents {
    pub(crate) fn new(tx: mpsc::Sender<SessionMessage>) -> Self {
        Self { tx }
    }

    /// Returns false once the session has gone away.
    pub async fn protection_status(&self, status: ProtectionStatus) -> bool {
        self.send(SessionEvent::Protection(status)).await
    }

    pub async fn reload_requested(&self, context: ReloadContext) -> bool {
        self.send(SessionEvent::ReloadRequested(context)).await
    }

    pub async fn send(&self, event: SessionEvent) -> bool {
        match self.tx.send(SessionMessage::Event(event)).await {
            Ok(()) => true,
            Err(_) => {
                debug!("Session queue closed, dropping transport event");
                false
            }
        }
    }
}

pub struct OpenRequest {
    pub video_id: VideoIdentifier,
    pub params: Arc<SessionParameters>,
    pub selection: TrackSelection,
    pub token: Token,
    pub events: TransportEvents,
}

pub struct OpenedTransport {
    pub control: Arc<dyn TransportControl>,
    pub audio: Option<TrackStream>,
    pub video: Option<TrackStream>,
}

#[async_trait]
pub trait AdaptiveTransport: Send + Sync {
    async fn open(&self, request: OpenRequest) -> Result<OpenedTransport, TransportError>;
}

/// Live knobs of an opened transport. Changes apply to subsequent requests.
#[async_trait]
pub trait TransportControl: Send + Sync {
    fn set_token(&self, token: &Token);

    fn set_endpoint(&self, endpoint: &str);

    fn set_transport_config(&self, config: &TransportConfig);

    /// Installs a reloaded endpoint and transport config together.
    ///
    /// Implementations whose requests read both must make the pair visible
    /// in one step.
    fn set_parameters(&self, params: &SessionParameters) {
        self.set_endpoint(&params.streaming_endpoint);
        self.set_transport_config(&params.transport_config);
    }

    async fn close(&self);
}
