//! # Builder for EngineConfig
//!
//! Fluent construction of [`EngineConfig`] instances.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use abrdl_engine::EngineConfig;
//!
//! let config = EngineConfig::builder()
//!     .with_mint_timeout(Duration::from_secs(20))
//!     .with_user_agent("MyApp/1.0")
//!     .with_header("X-Goog-Visitor-Id", "abc")
//!     .with_force_refresh_threshold(2)
//!     .build();
//!
//! assert_eq!(config.rotation.force_refresh_threshold, 2);
//! ```

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::{EngineConfig, config::RotationPolicy, proxy::ProxyConfig};

/// Builder for creating EngineConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    /// Set the overall timeout for a single HTTP request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.http.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.http.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.http.read_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.http.user_agent = user_agent.into();
        self
    }

    /// Add a custom HTTP header, ignoring names or values that are not valid
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.as_ref().parse::<reqwest::header::HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.config.http.headers.insert(name, value);
        }
        self
    }

    /// Merge headers over the current ones
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.config.http.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Set the proxy configuration, disabling the system proxy
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.http.proxy = Some(proxy);
        self.config.http.use_system_proxy = false;
        self
    }

    /// Only honoured when no explicit proxy is configured
    pub fn with_system_proxy(mut self, use_system_proxy: bool) -> Self {
        if self.config.http.proxy.is_none() {
            self.config.http.use_system_proxy = use_system_proxy;
        }
        self
    }

    pub fn with_bootstrap_timeout(mut self, timeout: Duration) -> Self {
        self.config.bootstrap_timeout = timeout;
        self
    }

    pub fn with_mint_timeout(mut self, timeout: Duration) -> Self {
        self.config.mint_timeout = timeout;
        self
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.config.open_timeout = timeout;
        self
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.config.token_ttl = ttl;
        self
    }

    pub fn with_rotation_policy(mut self, policy: RotationPolicy) -> Self {
        self.config.rotation = policy;
        self
    }

    pub fn with_force_refresh_threshold(mut self, threshold: u32) -> Self {
        self.config.rotation.force_refresh_threshold = threshold;
        self
    }

    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.event_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_remove_partial_files(mut self, remove: bool) -> Self {
        self.config.remove_partial_files = remove;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
