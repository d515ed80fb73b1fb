use std::fmt::Display;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::DownloadError;

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{6,}$").expect("valid identifier regex"));

/// Path prefixes that carry the identifier as the next path segment.
const PATH_PREFIXES: &[&str] = &["shorts", "embed", "live", "v"];

/// Opaque video identifier.
///
/// Only constructible through [`VideoIdentifier::parse`] (or `FromStr`), so an
/// instance always matches the platform's identifier shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoIdentifier(String);

impl VideoIdentifier {
    /// Extracts an identifier from a watch URL, a short link, or a bare id.
    pub fn parse(input: &str) -> Result<Self, DownloadError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(DownloadError::InvalidInput(
                "empty video URL or identifier".to_string(),
            ));
        }

        let candidate = match Url::parse(input) {
            Ok(url) => Self::from_url(&url),
            Err(_) => Some(input.to_string()),
        };

        match candidate {
            Some(id) if ID_PATTERN.is_match(&id) => Ok(Self(id)),
            _ => Err(DownloadError::InvalidInput(format!(
                "could not determine a video identifier from '{input}'"
            ))),
        }
    }

    fn from_url(url: &Url) -> Option<String> {
        if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
            return Some(v.into_owned());
        }

        let host = url.host_str().unwrap_or_default();
        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

        if host.contains("youtu.be") {
            return segments.next().map(str::to_string);
        }

        let first = segments.next()?;
        if PATH_PREFIXES.contains(&first) {
            return segments.next().map(str::to_string);
        }
        None
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for VideoIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VideoIdentifier {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for VideoIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
