//! Reference [`MetadataProvider`] speaking the platform's JSON `player` API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use super::{MetadataProvider, PlayabilityStatus, PlayerResponse, ReloadContext, TransportConfig, VideoDetails};
use crate::error::BootstrapError;
use crate::media::{FormatDescriptor, VideoIdentifier};

#[derive(Debug, Clone)]
pub struct InnertubeConfig {
    pub base_url: String,
    pub client_name: String,
    pub client_version: String,
    /// Visitor data sent as the content binding of the session, when known
    pub visitor_data: Option<String>,
    pub signature_timestamp: Option<u64>,
}

impl Default for InnertubeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.youtube.com".to_string(),
            client_name: "WEB".to_string(),
            client_version: "2.20250515.01.00".to_string(),
            visitor_data: None,
            signature_timestamp: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InnertubeClient {
    client: Client,
    config: InnertubeConfig,
}

impl InnertubeClient {
    pub fn new(client: Client, config: InnertubeConfig) -> Self {
        Self { client, config }
    }

    fn player_url(&self) -> Result<Url, BootstrapError> {
        let mut url = Url::parse(&self.config.base_url)
            .and_then(|base| base.join("youtubei/v1/player"))
            .map_err(|e| BootstrapError::InvalidResponse(format!("bad base url: {e}")))?;
        url.query_pairs_mut().append_pair("prettyPrint", "false");
        Ok(url)
    }

    fn request_body(&self, id: &VideoIdentifier, reload: Option<&ReloadContext>) -> Value {
        let mut client = json!({
            "clientName": self.config.client_name,
            "clientVersion": self.config.client_version,
            "hl": "en",
        });
        if let Some(visitor) = &self.config.visitor_data {
            client["visitorData"] = json!(visitor);
        }

        let mut playback_context = json!({
            "adPlaybackContext": { "pyv": true },
            "contentPlaybackContext": {
                "vis": 0,
                "splay": false,
                "lactMilliseconds": "-1",
                "signatureTimestamp": self.config.signature_timestamp,
            }
        });
        if let Some(context) = reload {
            playback_context["reloadPlaybackContext"] = context.0.clone();
        }

        json!({
            "context": { "client": client },
            "videoId": id.as_str(),
            "playbackContext": playback_context,
            "contentCheckOk": true,
            "racyCheckOk": true,
        })
    }
}

#[async_trait]
impl MetadataProvider for InnertubeClient {
    async fn resolve_metadata(
        &self,
        id: &VideoIdentifier,
        reload: Option<&ReloadContext>,
    ) -> Result<PlayerResponse, BootstrapError> {
        let url = self.player_url()?;
        debug!(%url, video_id = %id, "Sending player request");

        let response = self
            .client
            .post(url)
            .json(&self.request_body(id, reload))
            .send()
            .await?
            .error_for_status()?;

        let bytes = response.bytes().await?;
        let raw: RawPlayerResponse = serde_json::from_slice(&bytes)?;
        Ok(raw.into())
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawPlayerResponse {
    playability_status: Option<RawPlayability>,
    video_details: Option<RawVideoDetails>,
    streaming_data: Option<RawStreamingData>,
    player_config: Option<RawPlayerConfig>,
}

#[derive(Debug, Deserialize)]
struct RawPlayability {
    status: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawVideoDetails {
    video_id: String,
    title: String,
    author: String,
    #[serde(deserialize_with = "lenient_u64")]
    length_seconds: Option<u64>,
    #[serde(deserialize_with = "lenient_u64")]
    view_count: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawStreamingData {
    adaptive_formats: Vec<RawFormat>,
    server_abr_streaming_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFormat {
    itag: u32,
    mime_type: String,
    #[serde(default)]
    bitrate: u64,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u64")]
    content_length: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    last_modified: Option<u64>,
    quality_label: Option<String>,
    audio_quality: Option<String>,
    xtags: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawPlayerConfig {
    media_common_config: Option<RawMediaCommonConfig>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawMediaCommonConfig {
    media_ustreamer_request_config: Option<RawUstreamerRequestConfig>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawUstreamerRequestConfig {
    video_playback_ustreamer_config: Option<String>,
}

/// The API encodes most counters as strings.
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    Ok(
        match Option::<NumberOrString>::deserialize(deserializer)? {
            Some(NumberOrString::Number(n)) => Some(n),
            Some(NumberOrString::String(s)) => s.trim().parse().ok(),
            None => None,
        },
    )
}

impl From<RawFormat> for FormatDescriptor {
    fn from(raw: RawFormat) -> Self {
        FormatDescriptor {
            itag: raw.itag,
            mime_type: raw.mime_type,
            bitrate: raw.bitrate,
            quality_label: raw.quality_label,
            audio_quality: raw.audio_quality,
            width: raw.width,
            height: raw.height,
            content_length: raw.content_length,
            last_modified: raw.last_modified,
            xtags: raw.xtags,
            url: raw.url,
        }
    }
}

impl From<RawPlayerResponse> for PlayerResponse {
    fn from(raw: RawPlayerResponse) -> Self {
        let playability = raw
            .playability_status
            .map(|p| PlayabilityStatus {
                status: p.status,
                reason: p.reason,
            })
            .unwrap_or_else(|| PlayabilityStatus {
                status: "UNKNOWN".to_string(),
                reason: Some("missing playability status".to_string()),
            });

        let details = raw
            .video_details
            .map(|d| VideoDetails {
                id: d.video_id,
                title: d.title,
                author: d.author,
                duration_secs: d.length_seconds.unwrap_or_default(),
                view_count: d.view_count.unwrap_or_default(),
            })
            .unwrap_or_default();

        let transport_config = raw
            .player_config
            .and_then(|c| c.media_common_config)
            .and_then(|c| c.media_ustreamer_request_config)
            .and_then(|c| c.video_playback_ustreamer_config)
            .filter(|c| !c.is_empty())
            .map(TransportConfig);

        let (formats, streaming_endpoint) = match raw.streaming_data {
            Some(data) => (
                data.adaptive_formats.into_iter().map(Into::into).collect(),
                data.server_abr_streaming_url.filter(|u| !u.is_empty()),
            ),
            None => (Vec::new(), None),
        };

        PlayerResponse {
            details,
            playability,
            formats,
            streaming_endpoint,
            transport_config,
        }
    }
}
