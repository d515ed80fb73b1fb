use std::path::PathBuf;

use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{DownloadError, SinkError};
use crate::media::TrackType;
use crate::progress::{OnProgress, Progress, ProgressEvent};
use crate::session::TrackStream;

/// Destination writer that counts bytes and reports progress.
///
/// Progress is reported before the underlying write, so a reporter sees the
/// attempted total even when the write then fails.
pub struct ProgressTrackedSink<W> {
    track: TrackType,
    writer: W,
    path: Option<PathBuf>,
    total_bytes: Option<u64>,
    bytes_written: u64,
    on_progress: Option<OnProgress>,
    announced: bool,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> ProgressTrackedSink<W> {
    pub fn new(track: TrackType, writer: W, total_bytes: Option<u64>) -> Self {
        Self {
            track,
            writer,
            path: None,
            total_bytes: total_bytes.filter(|total| *total > 0),
            bytes_written: 0,
            on_progress: None,
            announced: false,
            closed: false,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_progress(mut self, on_progress: Option<OnProgress>) -> Self {
        self.on_progress = on_progress;
        self
    }

    pub fn track(&self) -> TrackType {
        self.track
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed(self.track));
        }
        self.announce();

        self.bytes_written += chunk.len() as u64;
        if let (Some(total), Some(callback)) = (self.total_bytes, &self.on_progress) {
            let percentage = (self.bytes_written as f64 * 100.0 / total as f64).min(100.0);
            callback(ProgressEvent::Progress {
                track: self.track,
                progress: Progress {
                    percentage,
                    bytes_written: self.bytes_written,
                    total_bytes: total,
                },
            });
        }

        let track = self.track;
        self.writer
            .write_all(chunk)
            .await
            .map_err(|source| SinkError::Io { track, source })
    }

    /// Flushes and shuts the destination down. Safe to call repeatedly.
    pub async fn close(&mut self) -> Result<(), SinkError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let flushed = match self.writer.flush().await {
            Ok(()) => self.writer.shutdown().await,
            Err(e) => Err(e),
        };
        let track = self.track;
        let result = flushed.map_err(|source| SinkError::Io { track, source });

        debug!(track = %self.track, bytes = self.bytes_written, "Sink closed");
        if let Some(callback) = &self.on_progress {
            callback(ProgressEvent::TrackClosed {
                track: self.track,
                path: self.path.clone(),
                bytes_written: self.bytes_written,
            });
        }
        result
    }

    /// Drains `stream` into the destination until it ends, fails or `stop`
    /// fires. The sink is closed on every path.
    pub async fn pipe(
        &mut self,
        mut stream: TrackStream,
        stop: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        self.announce();

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = stop.cancelled() => break Err(DownloadError::Cancelled),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    if let Err(e) = self.write(&chunk).await {
                        break Err(e.into());
                    }
                }
                Some(Err(e)) => break Err(e.into()),
                None => break Ok(self.bytes_written),
            }
        };

        let closed = self.close().await;
        match (result, closed) {
            (Ok(bytes), Ok(())) => Ok(bytes),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!(track = %self.track, error = %close_err, "Failed to close sink after error");
                Err(e)
            }
        }
    }

    fn announce(&mut self) {
        if self.announced {
            return;
        }
        self.announced = true;
        if let Some(callback) = &self.on_progress {
            callback(ProgressEvent::TrackOpened {
                track: self.track,
                path: self.path.clone(),
                total_bytes: self.total_bytes,
            });
        }
    }
}
