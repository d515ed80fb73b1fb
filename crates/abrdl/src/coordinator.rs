//! One download from identifier to files on disk.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::BufWriter;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bootstrap::{
    Bootstrapper, InnertubeClient, InnertubeConfig, MetadataProvider, VideoDetails,
};
use crate::client::create_client;
use crate::config::EngineConfig;
use crate::error::{DownloadError, TransportError};
use crate::media::{TrackPreference, TrackSelection, TrackType, VideoIdentifier};
use crate::progress::OnProgress;
use crate::session::{
    AdaptiveTransport, RangeTransport, RangeTransportConfig, SessionContext, SessionStatus,
    StreamSession,
};
use crate::sink::ProgressTrackedSink;
use crate::token::{HttpTokenMinter, MintOptions, Token, TokenManager, TokenMinter};
use crate::utils::{bytes_to_mb, track_output_path};

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Watch URL, short link or bare identifier
    pub identifier: String,
    pub preference: TrackPreference,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackStatus {
    Completed,
    Failed(String),
    /// Stopped because another track of the same download failed
    Aborted,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TrackOutcome {
    pub track: TrackType,
    pub itag: u32,
    pub path: PathBuf,
    pub bytes_written: u64,
    pub total_bytes: Option<u64>,
    pub status: TrackStatus,
}

#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub details: VideoDetails,
    /// Requested tracks, audio first
    pub tracks: Vec<TrackOutcome>,
    /// Final status of the stream session
    pub session: SessionStatus,
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        self.tracks
            .iter()
            .all(|t| t.status == TrackStatus::Completed)
    }

    pub fn total_bytes_written(&self) -> u64 {
        self.tracks.iter().map(|t| t.bytes_written).sum()
    }

    /// Collapses the per-track outcomes into a single result.
    ///
    /// Cancellation wins over failures, and a failure wins over the tracks it
    /// aborted.
    pub fn into_result(self) -> Result<Self, DownloadError> {
        if self.is_success() {
            return Ok(self);
        }
        if self
            .tracks
            .iter()
            .any(|t| t.status == TrackStatus::Cancelled)
        {
            return Err(DownloadError::Cancelled);
        }

        let failed = self
            .tracks
            .iter()
            .find_map(|t| match &t.status {
                TrackStatus::Failed(reason) => Some((t.track, reason.clone())),
                _ => None,
            })
            .or_else(|| {
                self.tracks
                    .iter()
                    .find(|t| t.status != TrackStatus::Completed)
                    .map(|t| (t.track, "aborted".to_string()))
            });

        match failed {
            Some((track, reason)) => Err(DownloadError::TrackFailed { track, reason }),
            None => Ok(self),
        }
    }
}

/// One line of the `info` format listing.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatSummary {
    pub itag: u32,
    pub track: Option<TrackType>,
    pub quality: String,
    pub mime_type: String,
    pub size_mb: Option<f64>,
}

impl fmt::Display for FormatSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.size_mb {
            Some(size) => write!(f, "{} | {} | {:.2} MB", self.quality, self.mime_type, size),
            None => write!(f, "{} | {} | unknown size", self.quality, self.mime_type),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub details: VideoDetails,
    /// Offered formats, de-duplicated on quality and mime type
    pub formats: Vec<FormatSummary>,
}

/// Wires the token manager, bootstrapper, stream session and sinks together
/// for each download request.
pub struct DownloadCoordinator {
    config: EngineConfig,
    tokens: TokenManager,
    bootstrapper: Bootstrapper,
    transport: Arc<dyn AdaptiveTransport>,
    on_progress: Option<OnProgress>,
}

impl DownloadCoordinator {
    pub fn new(
        config: EngineConfig,
        minter: Arc<dyn TokenMinter>,
        provider: Arc<dyn MetadataProvider>,
        transport: Arc<dyn AdaptiveTransport>,
    ) -> Self {
        let tokens = TokenManager::new(minter, config.mint_timeout, config.token_ttl);
        let bootstrapper = Bootstrapper::new(provider, config.bootstrap_timeout);
        Self {
            config,
            tokens,
            bootstrapper,
            transport,
            on_progress: None,
        }
    }

    /// Coordinator backed by the bundled HTTP collaborators: the innertube
    /// player API, a proof-of-origin provider service at `provider_url` and
    /// the byte-range transport.
    pub fn with_reference_collaborators(
        config: EngineConfig,
        provider_url: &str,
    ) -> Result<Self, DownloadError> {
        let client = create_client(&config.http)?;
        let minter = HttpTokenMinter::new(client.clone(), provider_url)?;
        let provider = InnertubeClient::new(client.clone(), InnertubeConfig::default());
        let transport = RangeTransport::new(client, RangeTransportConfig::default());

        Ok(Self::new(
            config,
            Arc::new(minter),
            Arc::new(provider),
            Arc::new(transport),
        ))
    }

    pub fn with_progress(mut self, on_progress: OnProgress) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Metadata and the offered formats, without opening a session.
    pub async fn inspect(&self, identifier: &str) -> Result<VideoInfo, DownloadError> {
        let id = VideoIdentifier::parse(identifier)?;
        let (details, formats) = self.bootstrapper.details(&id).await?;

        let mut seen = HashSet::new();
        let formats = formats
            .iter()
            .filter(|f| seen.insert((f.quality().to_string(), f.mime_type.clone())))
            .map(|f| FormatSummary {
                itag: f.itag,
                track: f.track_type(),
                quality: f.quality().to_string(),
                mime_type: f.mime_type.clone(),
                size_mb: f.content_length.map(bytes_to_mb),
            })
            .collect();

        Ok(VideoInfo { details, formats })
    }

    /// Downloads the tracks selected by `request.preference` into
    /// `request.output_dir`.
    ///
    /// Returns `Err` only when the download could not start. Once tracks are
    /// flowing the per-track result is reported through [`DownloadOutcome`].
    pub async fn start_download(
        &self,
        request: DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, DownloadError> {
        let id = VideoIdentifier::parse(&request.identifier)?;
        tokio::fs::create_dir_all(&request.output_dir).await?;

        let resolved = tokio::select! {
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            result = self.bootstrapper.resolve(&id, None) => result?,
        };
        let selection = TrackSelection::select(&resolved.parameters.formats, &request.preference)?;
        for (track, format) in selection.tracks() {
            info!(
                video_id = %id,
                %track,
                itag = format.itag,
                quality = format.quality(),
                mime = %format.mime_type,
                "Selected format"
            );
        }

        let token = self.initial_token(&id, cancel).await?;

        let mut session = StreamSession::open(
            self.session_context(),
            id.clone(),
            resolved.parameters,
            selection.clone(),
            token,
            cancel,
        )
        .await
        .map_err(|e| match e {
            TransportError::Cancelled => DownloadError::Cancelled,
            e => e.into(),
        })?;

        let abort = cancel.child_token();
        let mut pipes = JoinSet::new();
        let mut outcomes: HashMap<TrackType, TrackOutcome> = HashMap::new();

        for (track, format) in selection.tracks() {
            let path = track_output_path(&request.output_dir, &resolved.details.title, track, format);
            let mut outcome = TrackOutcome {
                track,
                itag: format.itag,
                path: path.clone(),
                bytes_written: 0,
                total_bytes: format.content_length,
                status: TrackStatus::Completed,
            };

            let Some(stream) = session.take_track(track) else {
                error!(video_id = %id, %track, "Transport provided no stream for track");
                outcome.status = TrackStatus::Failed("transport provided no stream".to_string());
                outcomes.insert(track, outcome);
                abort.cancel();
                continue;
            };

            let file = match File::create(&path).await {
                Ok(file) => file,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to create output file");
                    outcome.status = TrackStatus::Failed(e.to_string());
                    outcomes.insert(track, outcome);
                    abort.cancel();
                    continue;
                }
            };

            let mut sink = ProgressTrackedSink::new(track, BufWriter::new(file), format.content_length)
                .with_path(path)
                .with_progress(self.on_progress.clone());
            let stop = abort.clone();

            debug!(video_id = %id, %track, "Starting track pipe");
            pipes.spawn(async move {
                let result = sink.pipe(stream, &stop).await;
                (outcome, sink.bytes_written(), result)
            });
        }

        while let Some(joined) = pipes.join_next().await {
            let (mut outcome, bytes_written, result) = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    error!(video_id = %id, error = %e, "Track pipe task failed");
                    abort.cancel();
                    continue;
                }
            };
            outcome.bytes_written = bytes_written;
            outcome.status = match result {
                Ok(_) => {
                    info!(
                        video_id = %id,
                        track = %outcome.track,
                        bytes = bytes_written,
                        path = %outcome.path.display(),
                        "Track completed"
                    );
                    TrackStatus::Completed
                }
                Err(DownloadError::Cancelled)
                | Err(DownloadError::Transport(TransportError::Cancelled)) => {
                    if cancel.is_cancelled() {
                        TrackStatus::Cancelled
                    } else {
                        TrackStatus::Aborted
                    }
                }
                Err(e) => {
                    error!(video_id = %id, track = %outcome.track, error = %e, "Track failed");
                    abort.cancel();
                    TrackStatus::Failed(e.to_string())
                }
            };
            outcomes.insert(outcome.track, outcome);
        }

        let session = session.close().await;

        let tracks: Vec<TrackOutcome> = selection
            .tracks()
            .map(|(track, format)| {
                outcomes.remove(&track).unwrap_or_else(|| TrackOutcome {
                    track,
                    itag: format.itag,
                    path: track_output_path(&request.output_dir, &resolved.details.title, track, format),
                    bytes_written: 0,
                    total_bytes: format.content_length,
                    status: TrackStatus::Failed("track pipe ended unexpectedly".to_string()),
                })
            })
            .collect();

        let outcome = DownloadOutcome {
            details: resolved.details,
            tracks,
            session,
        };

        if outcome.is_success() {
            info!(
                video_id = %id,
                bytes = outcome.total_bytes_written(),
                "Download finished"
            );
        } else {
            warn!(video_id = %id, "Download did not complete");
            if self.config.remove_partial_files {
                remove_partial_files(&outcome.tracks).await;
            }
        }

        Ok(outcome)
    }

    async fn initial_token(
        &self,
        id: &VideoIdentifier,
        cancel: &CancellationToken,
    ) -> Result<Token, DownloadError> {
        let minted = tokio::select! {
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            result = self.tokens.mint(id.as_str(), MintOptions::default()) => result,
        };

        Ok(match minted {
            Ok(token) => token,
            Err(e) => {
                warn!(video_id = %id, error = %e, "Initial token mint failed, starting with a placeholder");
                self.tokens.placeholder(id.as_str())
            }
        })
    }

    fn session_context(&self) -> SessionContext {
        SessionContext {
            tokens: self.tokens.clone(),
            bootstrapper: self.bootstrapper.clone(),
            transport: self.transport.clone(),
            rotation: self.config.rotation,
            open_timeout: self.config.open_timeout,
            queue_capacity: self.config.event_queue_capacity,
        }
    }
}

async fn remove_partial_files(tracks: &[TrackOutcome]) {
    for track in tracks {
        match tokio::fs::remove_file(&track.path).await {
            Ok(()) => debug!(path = %track.path.display(), "Removed partial file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %track.path.display(), error = %e, "Failed to remove partial file"),
        }
    }
}
