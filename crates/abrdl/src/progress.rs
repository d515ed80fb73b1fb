use std::path::PathBuf;
use std::sync::Arc;

use crate::media::TrackType;

/// Byte accounting of one track.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// `min(100, bytes_written * 100 / total_bytes)`
    pub percentage: f64,
    pub bytes_written: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A track destination has been opened for writing.
    TrackOpened {
        track: TrackType,
        path: Option<PathBuf>,
        /// Expected size, when the format advertises one
        total_bytes: Option<u64>,
    },
    /// Emitted before each write, only when the expected size is known.
    Progress { track: TrackType, progress: Progress },
    /// The destination has been flushed and closed.
    TrackClosed {
        track: TrackType,
        path: Option<PathBuf>,
        bytes_written: u64,
    },
}

/// A callback function for progress updates.
pub type OnProgress = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
