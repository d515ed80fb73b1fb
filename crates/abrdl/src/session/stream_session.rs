use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, stream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{
    ProtectionState, ProtectionStatus, SessionEvent, SessionMessage, SessionState, SessionStatus,
};
use super::protection::{ProtectionTracker, RotationFailure};
use super::transport::{AdaptiveTransport, OpenRequest, TrackStream, TransportControl, TransportEvents};
use crate::bootstrap::{Bootstrapper, ReloadContext, ResolvedVideo, SessionParameters};
use crate::config::RotationPolicy;
use crate::error::{BootstrapError, TokenError, TransportError};
use crate::media::{TrackSelection, TrackType, VideoIdentifier};
use crate::token::{Token, TokenManager};

/// Collaborators and limits a session runs with.
#[derive(Clone)]
pub struct SessionContext {
    pub tokens: TokenManager,
    pub bootstrapper: Bootstrapper,
    pub transport: Arc<dyn AdaptiveTransport>,
    pub rotation: RotationPolicy,
    pub open_timeout: Duration,
    pub queue_capacity: usize,
}

/// One live streaming session.
///
/// Owns the transport connection and a single-consumer event loop that is the
/// only writer of the protection state, the current token and the current
/// session parameters. Protection verdicts and reload requests are handled
/// without interrupting the track streams.
pub struct StreamSession {
    video_id: VideoIdentifier,
    audio: Option<TrackStream>,
    video: Option<TrackStream>,
    status: watch::Receiver<SessionStatus>,
    events: TransportEvents,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StreamSession {
    /// Opens the transport and starts the event loop.
    ///
    /// Failing to open within `open_timeout` is fatal and not retried.
    pub async fn open(
        context: SessionContext,
        video_id: VideoIdentifier,
        params: SessionParameters,
        selection: TrackSelection,
        token: Token,
        cancel: &CancellationToken,
    ) -> Result<Self, TransportError> {
        let (tx, rx) = mpsc::channel(context.queue_capacity.max(1));
        let params = Arc::new(params);
        let events = TransportEvents::new(tx.clone());

        let (status_tx, status_rx) = watch::channel(SessionStatus {
            state: SessionState::Opening,
            protection: ProtectionState::Normal,
            consecutive_failures: 0,
            token_kind: token.kind,
            events_processed: 0,
            rotations_applied: 0,
            reloads_applied: 0,
            parameters: params.clone(),
            close_reason: None,
        });

        let request = OpenRequest {
            video_id: video_id.clone(),
            params: params.clone(),
            selection,
            token: token.clone(),
            events: events.clone(),
        };

        info!(video_id = %video_id, token_kind = ?token.kind, "Opening stream session");
        let open = tokio::time::timeout(context.open_timeout, context.transport.open(request));
        let opened = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            result = open => match result {
                Ok(Ok(opened)) => opened,
                Ok(Err(e)) => {
                    error!(video_id = %video_id, error = %e, "Failed to open stream session");
                    return Err(e);
                }
                Err(_) => {
                    error!(video_id = %video_id, timeout = ?context.open_timeout, "Stream session open timed out");
                    return Err(TransportError::OpenTimeout(context.open_timeout));
                }
            }
        };

        let cancel = cancel.child_token();
        let (shutdown_tx, shutdown_rx) = watch::channel(None);
        let live_tracks = usize::from(opened.audio.is_some()) + usize::from(opened.video.is_some());

        let audio = opened
            .audio
            .map(|s| guard_track(TrackType::Audio, s, shutdown_rx.clone(), tx.clone()));
        let video = opened
            .video
            .map(|s| guard_track(TrackType::Video, s, shutdown_rx.clone(), tx.clone()));

        let event_loop = EventLoop {
            video_id: video_id.clone(),
            tokens: context.tokens,
            bootstrapper: context.bootstrapper,
            control: opened.control,
            protection: ProtectionTracker::new(context.rotation),
            params,
            token,
            generation: 0,
            pending_reloads: 0,
            live_tracks,
            events_processed: 0,
            rotations_applied: 0,
            reloads_applied: 0,
            state: SessionState::Streaming,
            close_reason: None,
            status_tx,
            shutdown_tx,
            tx,
            cancel: cancel.clone(),
            background: JoinSet::new(),
        };
        let task = tokio::spawn(event_loop.run(rx));

        info!(video_id = %video_id, tracks = live_tracks, "Stream session open");

        Ok(Self {
            video_id,
            audio,
            video,
            status: status_rx,
            events,
            cancel,
            task: Some(task),
        })
    }

    pub fn video_id(&self) -> &VideoIdentifier {
        &self.video_id
    }

    /// Hands out a track stream. Each stream can be taken once.
    pub fn take_track(&mut self, track: TrackType) -> Option<TrackStream> {
        match track {
            TrackType::Audio => self.audio.take(),
            TrackType::Video => self.video.take(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Handle for feeding events into this session's queue.
    pub fn events(&self) -> TransportEvents {
        self.events.clone()
    }

    /// Stops the session and returns its final status.
    ///
    /// Track streams still being read end with [`TransportError::Cancelled`].
    pub async fn close(mut self) -> SessionStatus {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(video_id = %self.video_id, error = %e, "Session event loop panicked");
            }
        }
        self.status()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Ends a track stream early once the session shuts down, and tells the
/// session when the track finished on its own.
fn guard_track(
    track: TrackType,
    inner: TrackStream,
    shutdown: watch::Receiver<Option<TransportError>>,
    tx: mpsc::Sender<SessionMessage>,
) -> TrackStream {
    struct Guard {
        track: TrackType,
        inner: TrackStream,
        shutdown: watch::Receiver<Option<TransportError>>,
        tx: mpsc::Sender<SessionMessage>,
    }

    let guard = Guard {
        track,
        inner,
        shutdown,
        tx,
    };

    stream::unfold(Some(guard), |state| async move {
        let mut guard = state?;

        let reason = guard.shutdown.borrow().clone();
        if let Some(reason) = reason {
            return Some((Err(reason), None));
        }

        tokio::select! {
            biased;
            _ = guard.shutdown.changed() => {
                let reason = guard
                    .shutdown
                    .borrow()
                    .clone()
                    .unwrap_or(TransportError::Cancelled);
                Some((Err(reason), None))
            }
            item = guard.inner.next() => match item {
                Some(Ok(chunk)) => Some((Ok(chunk), Some(guard))),
                Some(Err(e)) => Some((Err(e), None)),
                None => {
                    let _ = guard.tx.send(SessionMessage::TrackEnded(guard.track)).await;
                    None
                }
            }
        }
    })
    .boxed()
}

struct EventLoop {
    video_id: VideoIdentifier,
    tokens: TokenManager,
    bootstrapper: Bootstrapper,
    control: Arc<dyn TransportControl>,
    protection: ProtectionTracker,
    params: Arc<SessionParameters>,
    token: Token,
    /// Bumped whenever a pending mint is superseded
    generation: u64,
    pending_reloads: usize,
    live_tracks: usize,
    events_processed: u64,
    rotations_applied: u64,
    reloads_applied: u64,
    state: SessionState,
    close_reason: Option<TransportError>,
    status_tx: watch::Sender<SessionStatus>,
    shutdown_tx: watch::Sender<Option<TransportError>>,
    tx: mpsc::Sender<SessionMessage>,
    cancel: CancellationToken,
    background: JoinSet<()>,
}

impl EventLoop {
    async fn run(mut self, mut rx: mpsc::Receiver<SessionMessage>) {
        self.publish();

        while self.state != SessionState::Closed {
            while self.background.try_join_next().is_some() {}

            let message = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => SessionMessage::Close,
                message = rx.recv() => message.unwrap_or(SessionMessage::Close),
            };

            self.handle(message).await;
            self.publish();
        }

        self.background.shutdown().await;
        debug!(video_id = %self.video_id, "Session event loop finished");
    }

    async fn handle(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Event(event) => {
                self.events_processed += 1;
                match event {
                    SessionEvent::Protection(status) => self.on_protection(status).await,
                    SessionEvent::ReloadRequested(context) => self.on_reload_requested(context),
                }
            }
            SessionMessage::TokenMinted { generation, result } => {
                self.on_token_minted(generation, result).await
            }
            SessionMessage::ReloadResolved(result) => self.on_reload_resolved(result),
            SessionMessage::TrackEnded(track) => {
                self.live_tracks = self.live_tracks.saturating_sub(1);
                debug!(video_id = %self.video_id, %track, remaining = self.live_tracks, "Track stream ended");
                if self.live_tracks == 0 {
                    info!(video_id = %self.video_id, "All track streams finished");
                    self.shutdown(None).await;
                }
            }
            SessionMessage::Close => self.shutdown(Some(TransportError::Cancelled)).await,
        }
    }

    async fn on_protection(&mut self, status: ProtectionStatus) {
        match status {
            ProtectionStatus::Accepted => {
                if self.protection.consecutive_failures() > 0 {
                    debug!(video_id = %self.video_id, "Token accepted, failure counter reset");
                }
                self.protection.accept();
            }
            ProtectionStatus::SoftRejected => {
                let force_refresh = self.protection.soft_reject();
                warn!(
                    video_id = %self.video_id,
                    consecutive_failures = self.protection.consecutive_failures(),
                    force_refresh,
                    "Token rejected, rotating"
                );

                let placeholder = self.tokens.placeholder(self.video_id.as_str());
                self.install_token(placeholder);

                self.generation += 1;
                self.spawn_rotation(force_refresh);
            }
            ProtectionStatus::HardRejected => {
                self.protection.hard_reject();
                self.generation += 1;
                warn!(
                    video_id = %self.video_id,
                    "Token hard-rejected, invalidating the minting subsystem"
                );
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        debug!(video_id = %self.video_id, "Session cancelled during token invalidation");
                    }
                    result = self.tokens.invalidate() => {
                        if let Err(e) = result {
                            warn!(video_id = %self.video_id, error = %e, "Token invalidation failed");
                        }
                    }
                }
            }
        }
    }

    fn spawn_rotation(&mut self, force_refresh: bool) {
        let tokens = self.tokens.clone();
        let tx = self.tx.clone();
        let id = self.video_id.to_string();
        let generation = self.generation;

        self.background.spawn(async move {
            let result = tokens.rotate(&id, force_refresh).await;
            let _ = tx.send(SessionMessage::TokenMinted { generation, result }).await;
        });
    }

    async fn on_token_minted(&mut self, generation: u64, result: Result<Token, TokenError>) {
        if generation != self.generation {
            debug!(
                video_id = %self.video_id,
                generation,
                current = self.generation,
                "Discarding superseded token"
            );
            return;
        }

        match result {
            Ok(token) => {
                info!(video_id = %self.video_id, "Rotated token installed");
                self.install_token(token);
                self.rotations_applied += 1;
            }
            Err(e) => match self.protection.rotation_failed() {
                RotationFailure::Counted => warn!(
                    video_id = %self.video_id,
                    error = %e,
                    consecutive_failures = self.protection.consecutive_failures(),
                    "Token rotation failed"
                ),
                RotationFailure::Exhausted => {
                    let failures = self.protection.consecutive_failures();
                    error!(
                        video_id = %self.video_id,
                        error = %e,
                        consecutive_failures = failures,
                        "Token rotation exhausted, closing session"
                    );
                    let reason = TransportError::Escalated(TokenError::RotationExhausted(failures));
                    self.shutdown(Some(reason)).await;
                }
            },
        }
    }

    fn on_reload_requested(&mut self, context: ReloadContext) {
        info!(video_id = %self.video_id, "Server requested a session reload");
        self.state = SessionState::Reloading;
        self.pending_reloads += 1;

        let bootstrapper = self.bootstrapper.clone();
        let tx = self.tx.clone();
        let id = self.video_id.clone();

        self.background.spawn(async move {
            let result = bootstrapper.resolve(&id, Some(&context)).await;
            let _ = tx.send(SessionMessage::ReloadResolved(result)).await;
        });
    }

    fn on_reload_resolved(&mut self, result: Result<ResolvedVideo, BootstrapError>) {
        self.pending_reloads = self.pending_reloads.saturating_sub(1);

        match result {
            Ok(resolved) => {
                let params = Arc::new(resolved.parameters);
                self.control.set_parameters(&params);
                self.params = params;
                self.reloads_applied += 1;
                info!(video_id = %self.video_id, "Session parameters reloaded");
            }
            Err(e) => warn!(
                video_id = %self.video_id,
                error = %e,
                "Reload failed, keeping current session parameters"
            ),
        }

        if self.pending_reloads == 0 && self.state == SessionState::Reloading {
            self.state = SessionState::Streaming;
        }
    }

    fn install_token(&mut self, token: Token) {
        self.control.set_token(&token);
        self.token = token;
    }

    async fn shutdown(&mut self, reason: Option<TransportError>) {
        if let Some(reason) = reason {
            if !matches!(reason, TransportError::Cancelled) {
                self.close_reason = Some(reason.clone());
            }
            self.shutdown_tx.send_replace(Some(reason));
        }
        self.control.close().await;
        self.state = SessionState::Closed;
        debug!(video_id = %self.video_id, "Stream session closed");
    }

    fn publish(&self) {
        self.status_tx.send_replace(SessionStatus {
            state: self.state,
            protection: self.protection.state(),
            consecutive_failures: self.protection.consecutive_failures(),
            token_kind: self.token.kind,
            events_processed: self.events_processed,
            rotations_applied: self.rotations_applied,
            reloads_applied: self.reloads_applied,
            parameters: self.params.clone(),
            close_reason: self.close_reason.clone(),
        });
    }
}
