//! Mock collaborators and fixtures shared by the unit tests.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use reqwest::Client;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::bootstrap::{
    MetadataProvider, PlayabilityStatus, PlayerResponse, ReloadContext, TransportConfig,
    VideoDetails,
};
use crate::client::create_client;
use crate::config::HttpConfig;
use crate::error::{BootstrapError, TokenError, TransportError};
use crate::media::{FormatDescriptor, TrackPreference, TrackSelection, TrackType, VideoIdentifier};
use crate::progress::{OnProgress, ProgressEvent};
use crate::session::{
    AdaptiveTransport, OpenRequest, OpenedTransport, SessionStatus, StreamSession, TrackStream,
    TransportControl,
};
use crate::token::{MintOptions, Token, TokenMinter};

pub(crate) fn test_client() -> Client {
    create_client(&HttpConfig {
        use_system_proxy: false,
        ..Default::default()
    })
    .unwrap()
}

pub(crate) fn video_format(itag: u32, label: &str, mime: &str, bitrate: u64) -> FormatDescriptor {
    FormatDescriptor {
        itag,
        mime_type: mime.to_string(),
        bitrate,
        quality_label: Some(label.to_string()),
        audio_quality: None,
        width: None,
        height: crate::media::format::parse_height(label),
        content_length: Some(bitrate * 4),
        last_modified: Some(1_700_000_000_000_000),
        xtags: None,
        url: None,
    }
}

pub(crate) fn audio_format(
    itag: u32,
    audio_quality: &str,
    mime: &str,
    bitrate: u64,
) -> FormatDescriptor {
    FormatDescriptor {
        itag,
        mime_type: mime.to_string(),
        bitrate,
        quality_label: None,
        audio_quality: Some(audio_quality.to_string()),
        width: None,
        height: None,
        content_length: Some(bitrate * 4),
        last_modified: Some(1_700_000_000_000_000),
        xtags: None,
        url: None,
    }
}

pub(crate) fn sample_formats() -> Vec<FormatDescriptor> {
    vec![
        video_format(247, "720p", "video/webm; codecs=\"vp9\"", 1_500_000),
        video_format(136, "720p", "video/mp4; codecs=\"avc1.4d401f\"", 1_200_000),
        video_format(248, "1080p", "video/webm; codecs=\"vp9\"", 2_500_000),
        audio_format(251, "AUDIO_QUALITY_MEDIUM", "audio/webm; codecs=\"opus\"", 160_000),
        audio_format(249, "AUDIO_QUALITY_LOW", "audio/webm; codecs=\"opus\"", 64_000),
        audio_format(140, "AUDIO_QUALITY_MEDIUM", "audio/mp4; codecs=\"mp4a.40.2\"", 128_000),
    ]
}

/// Default preference applied to [`sample_formats`]: 247 + 251.
pub(crate) fn sample_selection() -> TrackSelection {
    TrackSelection::select(&sample_formats(), &TrackPreference::default()).unwrap()
}

pub(crate) fn player_response() -> PlayerResponse {
    PlayerResponse {
        details: VideoDetails {
            id: "abc123".to_string(),
            title: "Test Video".to_string(),
            author: "Test Channel".to_string(),
            duration_secs: 212,
            view_count: 1_000,
        },
        playability: PlayabilityStatus::ok(),
        formats: sample_formats(),
        streaming_endpoint: Some("https://rr1.example.com/videoplayback".to_string()),
        transport_config: Some(TransportConfig("ustreamer-config".to_string())),
    }
}

/// Polls the session status until `predicate` holds, panicking after 5s.
pub(crate) async fn wait_for_status(
    session: &StreamSession,
    predicate: impl Fn(&SessionStatus) -> bool,
) -> SessionStatus {
    let poll = async {
        loop {
            let status = session.status();
            if predicate(&status) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    match tokio::time::timeout(Duration::from_secs(5), poll).await {
        Ok(status) => status,
        Err(_) => panic!("session status never matched, last: {:?}", session.status()),
    }
}

#[derive(Default)]
pub(crate) struct MockMinter {
    delay: Duration,
    remaining_failures: AtomicUsize,
    calls: AtomicUsize,
    force_flags: Mutex<Vec<bool>>,
    invalidations: AtomicUsize,
    hanging_invalidate: bool,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockMinter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The next `count` mints fail.
    pub(crate) fn failing(self, count: usize) -> Self {
        self.remaining_failures.store(count, Ordering::SeqCst);
        self
    }

    /// `invalidate` never completes.
    pub(crate) fn with_hanging_invalidate(mut self) -> Self {
        self.hanging_invalidate = true;
        self
    }

    /// Highest number of mints that were running at the same time.
    pub(crate) fn max_concurrent_mints(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub(crate) fn mint_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `force_refresh` of every mint, in call order.
    pub(crate) fn force_flags(&self) -> Vec<bool> {
        self.force_flags.lock().clone()
    }

    pub(crate) fn invalidate_calls(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenMinter for MockMinter {
    async fn mint(&self, identifier: &str, options: MintOptions) -> Result<String, TokenError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.force_flags.lock().push(options.force_refresh);

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(TokenError::Provider("mock mint failure".to_string()));
        }
        Ok(format!("minted-{identifier}-{call}"))
    }

    async fn invalidate(&self) -> Result<(), TokenError> {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        if self.hanging_invalidate {
            futures::future::pending::<()>().await;
        }
        Ok(())
    }
}

pub(crate) struct MockProvider {
    response: PlayerResponse,
    delay: Duration,
    failing: bool,
    calls: AtomicUsize,
    last_reload: Mutex<Option<ReloadContext>>,
}

impl MockProvider {
    pub(crate) fn new(response: PlayerResponse) -> Self {
        Self {
            response,
            delay: Duration::ZERO,
            failing: false,
            calls: AtomicUsize::new(0),
            last_reload: Mutex::new(None),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_reload(&self) -> Option<ReloadContext> {
        self.last_reload.lock().clone()
    }
}

#[async_trait]
impl MetadataProvider for MockProvider {
    async fn resolve_metadata(
        &self,
        _id: &VideoIdentifier,
        reload: Option<&ReloadContext>,
    ) -> Result<PlayerResponse, BootstrapError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        *self.last_reload.lock() = reload.cloned();
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing {
            return Err(BootstrapError::InvalidResponse("mock provider failure".to_string()));
        }
        Ok(self.response.clone())
    }
}

enum TrackSource {
    Live(mpsc::Receiver<Result<Bytes, TransportError>>),
    Static(Vec<Bytes>),
}

/// Transport serving pre-registered tracks. Tracks that were not registered,
/// or not selected, get no stream.
pub(crate) struct MockTransport {
    tracks: Mutex<HashMap<TrackType, TrackSource>>,
    open_delay: Mutex<Duration>,
    opens: AtomicUsize,
    opened_with: Mutex<Vec<Token>>,
    control: Arc<MockControl>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            tracks: Mutex::new(HashMap::new()),
            open_delay: Mutex::new(Duration::ZERO),
            opens: AtomicUsize::new(0),
            opened_with: Mutex::new(Vec::new()),
            control: Arc::new(MockControl::default()),
        }
    }

    /// Registers a track fed chunk by chunk through the returned sender.
    pub(crate) fn live_track(&self, track: TrackType) -> mpsc::Sender<Result<Bytes, TransportError>> {
        let (tx, rx) = mpsc::channel(16);
        self.tracks.lock().insert(track, TrackSource::Live(rx));
        tx
    }

    pub(crate) fn static_track(&self, track: TrackType, chunks: Vec<Bytes>) {
        self.tracks.lock().insert(track, TrackSource::Static(chunks));
    }

    pub(crate) fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock() = delay;
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Token handed to every `open`, in call order.
    pub(crate) fn opened_with(&self) -> Vec<Token> {
        self.opened_with.lock().clone()
    }

    pub(crate) fn control(&self) -> Arc<MockControl> {
        self.control.clone()
    }

    fn take_stream(&self, track: TrackType) -> Option<TrackStream> {
        match self.tracks.lock().remove(&track)? {
            TrackSource::Live(rx) => Some(ReceiverStream::new(rx).boxed()),
            TrackSource::Static(chunks) => {
                Some(stream::iter(chunks.into_iter().map(Ok)).boxed())
            }
        }
    }
}

#[async_trait]
impl AdaptiveTransport for MockTransport {
    async fn open(&self, request: OpenRequest) -> Result<OpenedTransport, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.opened_with.lock().push(request.token.clone());

        let delay = *self.open_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let stream_for = |track: TrackType| {
            request
                .selection
                .get(track)
                .and_then(|_| self.take_stream(track))
        };

        Ok(OpenedTransport {
            control: self.control.clone(),
            audio: stream_for(TrackType::Audio),
            video: stream_for(TrackType::Video),
        })
    }
}

#[derive(Default)]
pub(crate) struct MockControl {
    tokens: Mutex<Vec<Token>>,
    endpoints: Mutex<Vec<String>>,
    configs: Mutex<Vec<TransportConfig>>,
    closes: AtomicUsize,
}

impl MockControl {
    pub(crate) fn tokens(&self) -> Vec<Token> {
        self.tokens.lock().clone()
    }

    pub(crate) fn endpoints(&self) -> Vec<String> {
        self.endpoints.lock().clone()
    }

    pub(crate) fn configs(&self) -> Vec<TransportConfig> {
        self.configs.lock().clone()
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportControl for MockControl {
    fn set_token(&self, token: &Token) {
        self.tokens.lock().push(token.clone());
    }

    fn set_endpoint(&self, endpoint: &str) {
        self.endpoints.lock().push(endpoint.to_string());
    }

    fn set_transport_config(&self, config: &TransportConfig) {
        self.configs.lock().push(config.clone());
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Collects every progress event it is handed.
#[derive(Default, Clone)]
pub(crate) struct RecordingProgress {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl RecordingProgress {
    pub(crate) fn callback(&self) -> OnProgress {
        let events = self.events.clone();
        Arc::new(move |event| events.lock().push(event))
    }

    pub(crate) fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    pub(crate) fn percentages(&self) -> Vec<f64> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::Progress { progress, .. } => Some(progress.percentage),
                _ => None,
            })
            .collect()
    }
}

/// Writer whose every write fails; counts shutdowns.
#[derive(Default)]
pub(crate) struct FailingWriter {
    shutdowns: Arc<AtomicUsize>,
}

impl FailingWriter {
    pub(crate) fn shutdowns(&self) -> Arc<AtomicUsize> {
        self.shutdowns.clone()
    }
}

impl AsyncWrite for FailingWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::other("disk full")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}
