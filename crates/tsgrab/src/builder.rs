//! # Builder for DownloaderConfig
//!
//! Fluent construction of [`DownloaderConfig`] instances.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tsgrab_engine::DownloaderConfig;
//!
//! let config = DownloaderConfig::builder()
//!     .with_timeout(Duration::from_secs(30))
//!     .with_user_agent("MyApp/1.0")
//!     .with_referer("https://example.com/watch")
//!     .with_header("X-Api-Key", "my-secret-key")
//!     .build();
//! assert_eq!(config.user_agent, "MyApp/1.0");
//! ```

use std::time::Duration;

use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue, REFERER};
use tracing::warn;

use crate::{DownloaderConfig, proxy::ProxyConfig};

/// Builder for creating DownloaderConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct DownloaderConfigBuilder {
    config: DownloaderConfig,
}

impl DownloaderConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: DownloaderConfig::default(),
        }
    }

    /// Set the overall timeout for each HTTP request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    /// Set the user agent string. Empty values keep the default.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into();
        if !user_agent.is_empty() {
            self.config.user_agent = user_agent;
        }
        self
    }

    /// Send a `Referer` header with every request
    pub fn with_referer(self, referer: impl AsRef<str>) -> Self {
        self.with_known_header(REFERER, referer.as_ref())
    }

    /// Send a `Cookie` header with every request
    pub fn with_cookie(self, cookie: impl AsRef<str>) -> Self {
        self.with_known_header(COOKIE, cookie.as_ref())
    }

    /// Add a custom HTTP header. Invalid names or values are ignored with a warning,
    /// empty values are not sent.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        match name.as_ref().parse::<HeaderName>() {
            Ok(name) => self = self.with_known_header(name, value.as_ref()),
            Err(_) => warn!("Ignoring invalid header name: '{}'", name.as_ref()),
        }
        self
    }

    /// Merge headers into the configured set, replacing entries with the same name
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            if !value.is_empty() {
                self.config.headers.insert(name.clone(), value.clone());
            }
        }
        self
    }

    /// Set the proxy configuration
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        // Explicit proxy overrides system proxy
        self.config.use_system_proxy = false;
        self
    }

    /// Set whether to use system proxy settings if available
    pub fn with_system_proxy(mut self, use_system_proxy: bool) -> Self {
        if self.config.proxy.is_none() {
            self.config.use_system_proxy = use_system_proxy;
        }
        self
    }

    pub fn build(self) -> DownloaderConfig {
        self.config
    }

    fn with_known_header(mut self, name: HeaderName, value: &str) -> Self {
        if value.is_empty() {
            return self;
        }
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.config.headers.insert(name, value);
            }
            Err(_) => warn!("Ignoring invalid value for header '{}'", name),
        }
        self
    }
}

impl Default for DownloaderConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
