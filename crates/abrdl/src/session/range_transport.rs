//! Reference [`AdaptiveTransport`]: sequential HTTP byte-range fetching.
//!
//! Each selected format is fetched from the streaming endpoint in fixed-size
//! ranges by its own task. The current token, endpoint and transport config
//! are read for every request, so swapping them through [`TransportControl`]
//! takes effect on the next range without restarting the track. Endpoint and
//! config live behind one lock and are only ever read and replaced together.
//!
//! Status mapping: `401` reports a hard rejection, `403` a soft rejection,
//! `410` a reload request. After reporting, the fetcher waits for the session
//! to install new values (bounded by `rejection_wait`) and retries the range.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, StatusCode};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::events::ProtectionStatus;
use super::transport::{AdaptiveTransport, OpenRequest, OpenedTransport, TransportControl, TransportEvents};
use crate::bootstrap::{ReloadContext, SessionParameters, TransportConfig};
use crate::error::TransportError;
use crate::media::{FormatDescriptor, TrackType};
use crate::token::Token;

const TRANSPORT_CONFIG_HEADER: &str = "x-ustreamer-config";

#[derive(Debug, Clone)]
pub struct RangeTransportConfig {
    /// Bytes requested per range, at least one
    pub chunk_size: u64,
    /// Consecutive rejections of one range before the track fails
    pub max_rejections: u32,
    /// How long to wait for a replacement token or endpoint before retrying
    pub rejection_wait: Duration,
    /// Retries for network errors, 5xx responses and empty ranges
    pub max_retries: u32,
    pub retry_delay_base: Duration,
    /// Buffered chunks per track
    pub channel_capacity: usize,
}

impl Default for RangeTransportConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10 * 1024 * 1024,
            max_rejections: 5,
            rejection_wait: Duration::from_secs(5),
            max_retries: 3,
            retry_delay_base: Duration::from_millis(500),
            channel_capacity: 8,
        }
    }
}

pub struct RangeTransport {
    client: Client,
    config: RangeTransportConfig,
}

impl RangeTransport {
    pub fn new(client: Client, mut config: RangeTransportConfig) -> Self {
        config.chunk_size = config.chunk_size.max(1);
        Self { client, config }
    }
}

#[async_trait]
impl AdaptiveTransport for RangeTransport {
    async fn open(&self, request: OpenRequest) -> Result<OpenedTransport, TransportError> {
        Url::parse(&request.params.streaming_endpoint)
            .map_err(|e| TransportError::InvalidParameters(format!("streaming endpoint: {e}")))?;

        let control = Arc::new(RangeControl::new(
            request.token,
            StreamTarget {
                endpoint: request.params.streaming_endpoint.clone(),
                config: request.params.transport_config.clone(),
            },
        ));

        let mut audio = None;
        let mut video = None;
        for (track, format) in request.selection.tracks() {
            let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
            let fetcher = TrackFetcher {
                client: self.client.clone(),
                control: control.clone(),
                config: self.config.clone(),
                events: request.events.clone(),
                track,
                format: format.clone(),
            };
            tokio::spawn(fetcher.run(tx));

            let stream = ReceiverStream::new(rx).boxed();
            match track {
                TrackType::Audio => audio = Some(stream),
                TrackType::Video => video = Some(stream),
            }
        }

        info!(video_id = %request.video_id, "Range transport opened");
        Ok(OpenedTransport {
            control,
            audio,
            video,
        })
    }
}

/// Where range requests go and the config blob signed for that endpoint.
#[derive(Debug, Clone)]
struct StreamTarget {
    endpoint: String,
    config: TransportConfig,
}

struct RangeControl {
    token: RwLock<Token>,
    target: RwLock<StreamTarget>,
    /// Bumped on every change so waiting fetchers retry immediately
    version: watch::Sender<u64>,
    closed: CancellationToken,
}

impl RangeControl {
    fn new(token: Token, target: StreamTarget) -> Self {
        Self {
            token: RwLock::new(token),
            target: RwLock::new(target),
            version: watch::Sender::new(0),
            closed: CancellationToken::new(),
        }
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

#[async_trait]
impl TransportControl for RangeControl {
    fn set_token(&self, token: &Token) {
        *self.token.write() = token.clone();
        self.bump();
    }

    fn set_endpoint(&self, endpoint: &str) {
        self.target.write().endpoint = endpoint.to_string();
        self.bump();
    }

    fn set_transport_config(&self, config: &TransportConfig) {
        self.target.write().config = config.clone();
        self.bump();
    }

    fn set_parameters(&self, params: &SessionParameters) {
        *self.target.write() = StreamTarget {
            endpoint: params.streaming_endpoint.clone(),
            config: params.transport_config.clone(),
        };
        self.bump();
    }

    async fn close(&self) {
        self.closed.cancel();
    }
}

struct TrackFetcher {
    client: Client,
    control: Arc<RangeControl>,
    config: RangeTransportConfig,
    events: TransportEvents,
    track: TrackType,
    format: FormatDescriptor,
}

impl TrackFetcher {
    async fn run(self, tx: mpsc::Sender<Result<Bytes, TransportError>>) {
        match self.fetch(&tx).await {
            Ok(()) => debug!(track = %self.track, itag = self.format.itag, "Track fetch finished"),
            Err(e) => {
                warn!(track = %self.track, itag = self.format.itag, error = %e, "Track fetch failed");
                let _ = tx.send(Err(e)).await;
            }
        }
    }

    async fn fetch(&self, tx: &mpsc::Sender<Result<Bytes, TransportError>>) -> Result<(), TransportError> {
        let total = self.format.content_length.filter(|len| *len > 0);
        let mut version = self.control.version.subscribe();
        let mut offset = 0u64;
        let mut rejections = 0u32;
        let mut retries = 0u32;

        loop {
            if total.is_some_and(|total| offset >= total) {
                return Ok(());
            }

            version.borrow_and_update();
            let request = self.build_request(offset, total)?;
            let response = tokio::select! {
                _ = self.control.closed.cancelled() => return Ok(()),
                response = request.send() => response,
            };

            let response = match response {
                Ok(response) => response,
                Err(e) if (e.is_connect() || e.is_timeout()) && retries < self.config.max_retries => {
                    retries += 1;
                    debug!(track = %self.track, error = %e, attempt = retries, "Retrying range request");
                    self.backoff(retries).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match response.status() {
                status if status.is_success() => {
                    if rejections > 0 {
                        rejections = 0;
                        self.events.protection_status(ProtectionStatus::Accepted).await;
                    }

                    let start = offset;
                    let mut body = response.bytes_stream();
                    loop {
                        let chunk = tokio::select! {
                            _ = self.control.closed.cancelled() => return Ok(()),
                            chunk = body.next() => chunk,
                        };
                        let Some(chunk) = chunk else { break };
                        let chunk = chunk?;
                        offset += chunk.len() as u64;
                        if tx.send(Ok(chunk)).await.is_err() {
                            debug!(track = %self.track, "Track consumer dropped");
                            return Ok(());
                        }
                    }

                    if total.is_none() {
                        return Ok(());
                    }
                    if offset > start {
                        retries = 0;
                    } else if retries < self.config.max_retries {
                        retries += 1;
                        debug!(track = %self.track, offset, attempt = retries, "Empty range, retrying");
                        self.backoff(retries).await;
                    } else {
                        return Err(TransportError::EmptyRange(offset));
                    }
                }
                status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                    rejections += 1;
                    if rejections > self.config.max_rejections {
                        return Err(TransportError::Rejected(rejections - 1));
                    }
                    let verdict = if status == StatusCode::UNAUTHORIZED {
                        ProtectionStatus::HardRejected
                    } else {
                        ProtectionStatus::SoftRejected
                    };
                    warn!(track = %self.track, %status, offset, "Range request rejected");
                    self.events.protection_status(verdict).await;
                    self.wait_for_change(&mut version).await;
                }
                StatusCode::GONE => {
                    rejections += 1;
                    if rejections > self.config.max_rejections {
                        return Err(TransportError::Status(StatusCode::GONE));
                    }
                    let context = ReloadContext(serde_json::json!({
                        "itag": self.format.itag,
                        "offset": offset,
                    }));
                    info!(track = %self.track, "Streaming endpoint expired, requesting reload");
                    self.events.reload_requested(context).await;
                    self.wait_for_change(&mut version).await;
                }
                status if status.is_server_error() && retries < self.config.max_retries => {
                    retries += 1;
                    debug!(track = %self.track, %status, attempt = retries, "Retrying range request");
                    self.backoff(retries).await;
                }
                status => return Err(TransportError::Status(status)),
            }
        }
    }

    fn build_request(&self, offset: u64, total: Option<u64>) -> Result<RequestBuilder, TransportError> {
        let target = self.control.target.read().clone();
        let mut url = Url::parse(&target.endpoint)
            .map_err(|e| TransportError::InvalidParameters(format!("streaming endpoint: {e}")))?;
        let token = self.control.token.read().value.clone();
        url.query_pairs_mut()
            .append_pair("itag", &self.format.itag.to_string())
            .append_pair("pot", &token);

        let mut request = self
            .client
            .get(url)
            .header(TRANSPORT_CONFIG_HEADER, target.config.0);

        if let Some(total) = total {
            let end = (offset + self.config.chunk_size).min(total) - 1;
            request = request.header(reqwest::header::RANGE, format!("bytes={offset}-{end}"));
        }
        Ok(request)
    }

    async fn wait_for_change(&self, version: &mut watch::Receiver<u64>) {
        tokio::select! {
            _ = version.changed() => {}
            _ = tokio::time::sleep(self.config.rejection_wait) => {}
            _ = self.control.closed.cancelled() => {}
        }
    }

    async fn backoff(&self, attempt: u32) {
        let delay = self.config.retry_delay_base * 2_u32.pow(attempt.saturating_sub(1));
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.control.closed.cancelled() => {}
        }
    }
}
