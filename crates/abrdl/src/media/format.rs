use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kind of track carried by a format.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Audio,
    Video,
}

impl TrackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackType::Audio => "audio",
            TrackType::Video => "video",
        }
    }
}

impl Display for TrackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output container requested by the caller.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Webm,
    Mp4,
}

impl Container {
    pub fn as_str(&self) -> &'static str {
        match self {
            Container::Webm => "webm",
            Container::Mp4 => "mp4",
        }
    }
}

impl Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Container {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "webm" => Ok(Container::Webm),
            "mp4" | "m4a" => Ok(Container::Mp4),
            other => Err(format!("unsupported container '{other}' (expected webm or mp4)")),
        }
    }
}

/// One encoded rendition offered by the platform.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub itag: u32,
    /// Full mime type including codecs, e.g. `audio/webm; codecs="opus"`.
    pub mime_type: String,
    pub bitrate: u64,
    pub quality_label: Option<String>,
    pub audio_quality: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub content_length: Option<u64>,
    pub last_modified: Option<u64>,
    pub xtags: Option<String>,
    /// Direct URL for byte-range fetching, when the platform provides one.
    pub url: Option<String>,
}

impl FormatDescriptor {
    pub fn track_type(&self) -> Option<TrackType> {
        if self.mime_type.starts_with("audio/") {
            Some(TrackType::Audio)
        } else if self.mime_type.starts_with("video/") {
            Some(TrackType::Video)
        } else {
            None
        }
    }

    pub fn container(&self) -> Option<Container> {
        if self.mime_type.contains("webm") {
            Some(Container::Webm)
        } else if self.mime_type.contains("mp4") {
            Some(Container::Mp4)
        } else {
            None
        }
    }

    /// The `codecs` parameter of the mime type, without quotes.
    pub fn codecs(&self) -> Option<&str> {
        let (_, rest) = self.mime_type.split_once("codecs=")?;
        Some(rest.trim().trim_matches('"'))
    }

    pub fn is_opus(&self) -> bool {
        self.codecs().is_some_and(|c| c.contains("opus"))
    }

    /// File extension used for the downloaded track.
    pub fn file_extension(&self) -> &'static str {
        let webm = self.mime_type.contains("webm");
        match self.track_type() {
            Some(TrackType::Video) if webm => "webm",
            Some(TrackType::Video) => "mp4",
            Some(TrackType::Audio) if webm => "webm",
            Some(TrackType::Audio) => "m4a",
            None => "bin",
        }
    }

    /// Human readable quality: video label, then audio quality.
    pub fn quality(&self) -> &str {
        self.quality_label
            .as_deref()
            .or(self.audio_quality.as_deref())
            .unwrap_or("unknown")
    }

    /// Vertical resolution, from the explicit height or the quality label.
    pub fn resolution(&self) -> Option<u32> {
        self.height
            .or_else(|| self.quality_label.as_deref().and_then(parse_height))
    }
}

/// Parses the height out of labels like `720p`, `1080p60` or `2160p HDR`.
pub fn parse_height(label: &str) -> Option<u32> {
    let digits: String = label
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() || !label.trim()[digits.len()..].starts_with('p') {
        return None;
    }
    digits.parse().ok()
}
