use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::proxy::ProxyConfig;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36";

/// HTTP client options shared by every reference collaborator.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Overall timeout for a single HTTP request, zero disables it
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Idle timeout for pooled connections
    pub read_timeout: Duration,

    pub follow_redirects: bool,

    pub user_agent: String,

    /// Custom HTTP headers for requests
    pub headers: HeaderMap,

    /// Proxy configuration (optional)
    pub proxy: Option<ProxyConfig>,

    /// Whether to use system proxy settings if available
    pub use_system_proxy: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: HttpConfig::default_headers(),
            proxy: None,
            use_system_proxy: true,
        }
    }
}

impl HttpConfig {
    pub fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );
        headers
    }
}

/// How aggressively the session rotates tokens on soft rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Consecutive failures at which a rotation asks the minter to rebuild its state
    pub force_refresh_threshold: u32,
    /// Cap for the consecutive failure counter; rotation failing at the cap is fatal
    pub max_consecutive_failures: u32,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            force_refresh_threshold: 3,
            max_consecutive_failures: 10,
        }
    }
}

/// Configuration for the download engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub http: HttpConfig,

    pub rotation: RotationPolicy,

    /// Upper bound for resolving metadata / session parameters
    pub bootstrap_timeout: Duration,

    /// Upper bound for one token mint
    pub mint_timeout: Duration,

    /// Upper bound for the transport to accept the open request
    pub open_timeout: Duration,

    /// How long a minted token is reused for the same identifier
    pub token_ttl: Duration,

    /// Capacity of the stream session's event queue
    pub event_queue_capacity: usize,

    /// Delete output files of a failed or cancelled download
    pub remove_partial_files: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            rotation: RotationPolicy::default(),
            bootstrap_timeout: Duration::from_secs(30),
            mint_timeout: Duration::from_secs(45),
            open_timeout: Duration::from_secs(30),
            token_ttl: Duration::from_secs(6 * 60 * 60),
            event_queue_capacity: 32,
            remove_partial_files: true,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> crate::builder::EngineConfigBuilder {
        crate::builder::EngineConfigBuilder::new()
    }
}
