use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use super::{MintOptions, TokenMinter};
use crate::error::TokenError;

pub const DEFAULT_PROVIDER_URL: &str = "http://127.0.0.1:4416";

#[derive(Debug, Serialize)]
struct MintRequest<'a> {
    content_binding: &'a str,
    bypass_cache: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MintResponse {
    po_token: Option<String>,
    error: Option<String>,
}

/// Minter backed by an external proof-of-origin provider service.
///
/// The service runs the challenge interpreter; this side only speaks its
/// JSON API (`POST /get_pot`, `POST /invalidate_caches`).
#[derive(Debug, Clone)]
pub struct HttpTokenMinter {
    client: Client,
    base_url: Url,
}

impl HttpTokenMinter {
    pub fn new(client: Client, base_url: &str) -> Result<Self, TokenError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TokenError::ChallengeUnavailable(format!("bad provider url: {e}")))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TokenError> {
        self.base_url
            .join(path)
            .map_err(|e| TokenError::ChallengeUnavailable(e.to_string()))
    }
}

#[async_trait]
impl TokenMinter for HttpTokenMinter {
    async fn mint(&self, identifier: &str, options: MintOptions) -> Result<String, TokenError> {
        let url = self.endpoint("get_pot")?;
        debug!(%url, identifier, "Requesting token from provider");

        let response = self
            .client
            .post(url)
            .json(&MintRequest {
                content_binding: identifier,
                bypass_cache: options.force_refresh,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    TokenError::ChallengeUnavailable(format!("provider unreachable: {e}"))
                } else {
                    TokenError::from(e)
                }
            })?;

        let status = response.status();
        let body: MintResponse = response.json().await?;

        match (status, body.po_token, body.error) {
            (s, Some(token), _) if s.is_success() && !token.is_empty() => Ok(token),
            (_, _, Some(error)) => Err(TokenError::Provider(error)),
            (s, _, None) => Err(TokenError::Provider(format!(
                "provider returned {s} without a token"
            ))),
        }
    }

    async fn invalidate(&self) -> Result<(), TokenError> {
        let url = self.endpoint("invalidate_caches")?;
        let response = self.client.post(url).send().await?;

        match response.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => {
                info!("Token provider caches invalidated");
                Ok(())
            }
            s => Err(TokenError::Provider(format!(
                "cache invalidation returned {s}"
            ))),
        }
    }
}
