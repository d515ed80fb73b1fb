//! Resolving an identifier into playable metadata and session parameters.

pub mod innertube;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::BootstrapError;
use crate::media::{FormatDescriptor, VideoIdentifier};

pub use innertube::{InnertubeClient, InnertubeConfig};

/// Descriptive metadata shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDetails {
    pub id: String,
    pub title: String,
    pub author: String,
    pub duration_secs: u64,
    pub view_count: u64,
}

impl VideoDetails {
    /// `H:MM:SS` for long videos, `M:SS` otherwise.
    pub fn duration_label(&self) -> String {
        let hours = self.duration_secs / 3600;
        let minutes = (self.duration_secs % 3600) / 60;
        let seconds = self.duration_secs % 60;
        if hours > 0 {
            format!("{hours}:{minutes:02}:{seconds:02}")
        } else {
            format!("{minutes}:{seconds:02}")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayabilityStatus {
    pub status: String,
    pub reason: Option<String>,
}

impl PlayabilityStatus {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
            reason: None,
        }
    }

    pub fn check(&self) -> Result<(), BootstrapError> {
        let reason = || self.reason.clone().unwrap_or_else(|| self.status.clone());
        match self.status.as_str() {
            "OK" => Ok(()),
            "LOGIN_REQUIRED" | "AGE_CHECK_REQUIRED" | "CONTENT_CHECK_REQUIRED" => {
                Err(BootstrapError::Restricted(reason()))
            }
            _ => Err(BootstrapError::NotPlayable(reason())),
        }
    }
}

/// Opaque server-issued configuration blob for the adaptive transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportConfig(pub String);

/// Opaque context carried by a reload request, passed back to the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReloadContext(pub serde_json::Value);

/// Raw answer of a metadata provider, before validation.
#[derive(Debug, Clone)]
pub struct PlayerResponse {
    pub details: VideoDetails,
    pub playability: PlayabilityStatus,
    pub formats: Vec<FormatDescriptor>,
    pub streaming_endpoint: Option<String>,
    pub transport_config: Option<TransportConfig>,
}

/// Everything the transport needs to talk to the streaming endpoint.
///
/// Replaced as a whole on reload, never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParameters {
    pub streaming_endpoint: String,
    pub transport_config: TransportConfig,
    pub formats: Vec<FormatDescriptor>,
}

#[derive(Debug, Clone)]
pub struct ResolvedVideo {
    pub details: VideoDetails,
    pub parameters: SessionParameters,
}

/// Platform API client capability.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn resolve_metadata(
        &self,
        id: &VideoIdentifier,
        reload: Option<&ReloadContext>,
    ) -> Result<PlayerResponse, BootstrapError>;

    /// Turns a signed/obfuscated endpoint into a usable URL.
    async fn decipher_endpoint(&self, url: &str) -> Result<String, BootstrapError> {
        Ok(url.to_string())
    }
}

#[derive(Clone)]
pub struct Bootstrapper {
    provider: Arc<dyn MetadataProvider>,
    timeout: Duration,
}

impl Bootstrapper {
    pub fn new(provider: Arc<dyn MetadataProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Resolves `id`; with a reload context the refresh is scoped to it.
    pub async fn resolve(
        &self,
        id: &VideoIdentifier,
        reload: Option<&ReloadContext>,
    ) -> Result<ResolvedVideo, BootstrapError> {
        tokio::time::timeout(self.timeout, self.resolve_inner(id, reload))
            .await
            .map_err(|_| BootstrapError::Timeout(self.timeout))?
    }

    /// Metadata only, without requiring streaming parameters.
    pub async fn details(
        &self,
        id: &VideoIdentifier,
    ) -> Result<(VideoDetails, Vec<FormatDescriptor>), BootstrapError> {
        let response = tokio::time::timeout(self.timeout, self.provider.resolve_metadata(id, None))
            .await
            .map_err(|_| BootstrapError::Timeout(self.timeout))??;
        response.playability.check()?;
        Ok((response.details, response.formats))
    }

    async fn resolve_inner(
        &self,
        id: &VideoIdentifier,
        reload: Option<&ReloadContext>,
    ) -> Result<ResolvedVideo, BootstrapError> {
        debug!(video_id = %id, reload = reload.is_some(), "Resolving session parameters");
        let response = self.provider.resolve_metadata(id, reload).await?;
        response.playability.check()?;

        let transport_config = response
            .transport_config
            .ok_or(BootstrapError::MissingTransportConfig)?;
        let signed = response
            .streaming_endpoint
            .ok_or(BootstrapError::MissingStreamingEndpoint)?;
        let streaming_endpoint = self.provider.decipher_endpoint(&signed).await?;

        if response.formats.is_empty() {
            return Err(BootstrapError::NoFormats);
        }

        info!(
            video_id = %id,
            title = %response.details.title,
            formats = response.formats.len(),
            "Session parameters resolved"
        );

        Ok(ResolvedVideo {
            details: response.details,
            parameters: SessionParameters {
                streaming_endpoint,
                transport_config,
                formats: response.formats,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockProvider, player_response};

    fn id() -> VideoIdentifier {
        VideoIdentifier::parse("abc123").unwrap()
    }

    #[test]
    fn test_duration_label() {
        let mut details = VideoDetails {
            duration_secs: 212,
            ..Default::default()
        };
        assert_eq!(details.duration_label(), "3:32");
        details.duration_secs = 3_725;
        assert_eq!(details.duration_label(), "1:02:05");
    }

    #[tokio::test]
    async fn test_resolve_success() {
        let provider = Arc::new(MockProvider::new(player_response()));
        let bootstrapper = Bootstrapper::new(provider.clone(), Duration::from_secs(30));

        let resolved = bootstrapper.resolve(&id(), None).await.unwrap();
        assert_eq!(resolved.details.title, "Test Video");
        assert!(!resolved.parameters.formats.is_empty());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_reload_context_is_forwarded() {
        let provider = Arc::new(MockProvider::new(player_response()));
        let bootstrapper = Bootstrapper::new(provider.clone(), Duration::from_secs(30));
        let context = ReloadContext(serde_json::json!({ "scrubbedReload": true }));

        bootstrapper.resolve(&id(), Some(&context)).await.unwrap();
        assert_eq!(provider.last_reload(), Some(context));
    }

    #[tokio::test]
    async fn test_missing_pieces_are_reported() {
        let mut response = player_response();
        response.transport_config = None;
        let bootstrapper =
            Bootstrapper::new(Arc::new(MockProvider::new(response)), Duration::from_secs(30));
        assert!(matches!(
            bootstrapper.resolve(&id(), None).await,
            Err(BootstrapError::MissingTransportConfig)
        ));

        let mut response = player_response();
        response.streaming_endpoint = None;
        let bootstrapper =
            Bootstrapper::new(Arc::new(MockProvider::new(response)), Duration::from_secs(30));
        assert!(matches!(
            bootstrapper.resolve(&id(), None).await,
            Err(BootstrapError::MissingStreamingEndpoint)
        ));

        let mut response = player_response();
        response.formats.clear();
        let bootstrapper =
            Bootstrapper::new(Arc::new(MockProvider::new(response)), Duration::from_secs(30));
        assert!(matches!(
            bootstrapper.resolve(&id(), None).await,
            Err(BootstrapError::NoFormats)
        ));
    }

    #[tokio::test]
    async fn test_playability_errors() {
        let mut response = player_response();
        response.playability = PlayabilityStatus {
            status: "LOGIN_REQUIRED".to_string(),
            reason: Some("Sign in to confirm your age".to_string()),
        };
        let bootstrapper =
            Bootstrapper::new(Arc::new(MockProvider::new(response)), Duration::from_secs(30));
        assert!(matches!(
            bootstrapper.resolve(&id(), None).await,
            Err(BootstrapError::Restricted(reason)) if reason.contains("age")
        ));

        let mut response = player_response();
        response.playability = PlayabilityStatus {
            status: "ERROR".to_string(),
            reason: None,
        };
        let bootstrapper =
            Bootstrapper::new(Arc::new(MockProvider::new(response)), Duration::from_secs(30));
        assert!(matches!(
            bootstrapper.resolve(&id(), None).await,
            Err(BootstrapError::NotPlayable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_timeout() {
        let provider = MockProvider::new(player_response()).with_delay(Duration::from_secs(60));
        let bootstrapper = Bootstrapper::new(Arc::new(provider), Duration::from_secs(30));
        assert!(matches!(
            bootstrapper.resolve(&id(), None).await,
            Err(BootstrapError::Timeout(_))
        ));
    }
}
