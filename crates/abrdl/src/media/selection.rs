use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use super::format::{Container, FormatDescriptor, TrackType, parse_height};
use crate::error::SelectionError;

pub const DEFAULT_VIDEO_QUALITY: &str = "720p";
pub const DEFAULT_AUDIO_QUALITY: &str = "AUDIO_QUALITY_MEDIUM";

/// Which tracks a request wants.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackMode {
    #[default]
    Both,
    AudioOnly,
    VideoOnly,
}

impl TrackMode {
    pub fn wants(&self, track: TrackType) -> bool {
        match (self, track) {
            (TrackMode::Both, _) => true,
            (TrackMode::AudioOnly, TrackType::Audio) => true,
            (TrackMode::VideoOnly, TrackType::Video) => true,
            _ => false,
        }
    }
}

/// Caller preference used to pick tracks out of the offered formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackPreference {
    pub video_quality: String,
    pub audio_quality: String,
    pub container: Container,
    pub mode: TrackMode,
}

impl Default for TrackPreference {
    fn default() -> Self {
        Self {
            video_quality: DEFAULT_VIDEO_QUALITY.to_string(),
            audio_quality: DEFAULT_AUDIO_QUALITY.to_string(),
            container: Container::Webm,
            mode: TrackMode::Both,
        }
    }
}

impl TrackPreference {
    /// Builds a preference from a free-form quality string.
    ///
    /// Audio quality names (`AUDIO_QUALITY_*`) imply an audio-only request.
    pub fn from_quality(quality: Option<&str>, container: Container, mode: TrackMode) -> Self {
        let mut preference = Self {
            container,
            mode,
            ..Self::default()
        };

        match quality {
            Some(q) if q.to_lowercase().contains("audio_quality") => {
                preference.audio_quality = q.to_uppercase();
                preference.mode = TrackMode::AudioOnly;
            }
            Some(q) if !q.is_empty() => preference.video_quality = q.to_string(),
            _ => {}
        }
        preference
    }
}

/// The formats a session will stream. Fixed once the session starts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackSelection {
    pub audio: Option<FormatDescriptor>,
    pub video: Option<FormatDescriptor>,
}

impl TrackSelection {
    pub fn select(
        formats: &[FormatDescriptor],
        preference: &TrackPreference,
    ) -> Result<Self, SelectionError> {
        let audio = if preference.mode.wants(TrackType::Audio) {
            Some(
                select_audio(formats, preference)
                    .cloned()
                    .ok_or(SelectionError::NoMatchingFormat(TrackType::Audio))?,
            )
        } else {
            None
        };

        let video = if preference.mode.wants(TrackType::Video) {
            Some(
                select_video(formats, preference)
                    .cloned()
                    .ok_or(SelectionError::NoMatchingFormat(TrackType::Video))?,
            )
        } else {
            None
        };

        Ok(Self { audio, video })
    }

    pub fn get(&self, track: TrackType) -> Option<&FormatDescriptor> {
        match track {
            TrackType::Audio => self.audio.as_ref(),
            TrackType::Video => self.video.as_ref(),
        }
    }

    /// Selected tracks, audio first.
    pub fn tracks(&self) -> impl Iterator<Item = (TrackType, &FormatDescriptor)> {
        self.audio
            .iter()
            .map(|f| (TrackType::Audio, f))
            .chain(self.video.iter().map(|f| (TrackType::Video, f)))
    }
}

fn select_video<'a>(
    formats: &'a [FormatDescriptor],
    preference: &TrackPreference,
) -> Option<&'a FormatDescriptor> {
    let candidates: Vec<&FormatDescriptor> = formats
        .iter()
        .filter(|f| f.track_type() == Some(TrackType::Video))
        .collect();

    let container_rank = |f: &FormatDescriptor| f.container() == Some(preference.container);
    let best = |pool: Vec<&'a FormatDescriptor>| {
        pool.into_iter()
            .max_by_key(|f| (container_rank(*f), f.bitrate))
    };

    let wanted = preference.video_quality.to_lowercase();
    let exact: Vec<_> = candidates
        .iter()
        .copied()
        .filter(|f| {
            f.quality_label
                .as_deref()
                .is_some_and(|l| l.to_lowercase().starts_with(&wanted))
        })
        .collect();
    if !exact.is_empty() {
        return best(exact);
    }

    let target = parse_height(&preference.video_quality)?;

    // Tallest at or below the target, otherwise the smallest above it
    let below = candidates
        .iter()
        .copied()
        .filter(|f| f.resolution().is_some_and(|h| h <= target))
        .max_by_key(|f| (f.resolution(), container_rank(*f), f.bitrate));
    if below.is_some() {
        return below;
    }

    candidates
        .iter()
        .copied()
        .filter(|f| f.resolution().is_some())
        .min_by_key(|f| (f.resolution(), Reverse(container_rank(*f)), Reverse(f.bitrate)))
}

fn select_audio<'a>(
    formats: &'a [FormatDescriptor],
    preference: &TrackPreference,
) -> Option<&'a FormatDescriptor> {
    let wanted = preference.audio_quality.to_uppercase();
    formats
        .iter()
        .filter(|f| f.track_type() == Some(TrackType::Audio))
        .max_by_key(|f| {
            let container = f.container() == Some(preference.container);
            let opus = preference.container == Container::Webm && f.is_opus();
            let quality = f
                .audio_quality
                .as_deref()
                .is_some_and(|q| q.eq_ignore_ascii_case(&wanted));
            (container, opus, quality, f.bitrate)
        })
}
