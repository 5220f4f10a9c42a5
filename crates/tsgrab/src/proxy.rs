// Outbound proxy settings for the HTTP transport.
//
// Proxy addresses come straight from the command line, so a bare
// `host:port` is accepted and given the scheme matching the proxy type.

use std::fmt;

use reqwest::Proxy;
use url::Url;

/// Traffic routed through the proxy, and the scheme assumed for bare addresses.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ProxyType {
    /// Plain HTTP requests only
    Http,
    /// HTTPS requests only
    Https,
    /// Every request, through a SOCKS5 server
    Socks5,
    /// Every request, through an HTTP proxy
    All,
}

impl ProxyType {
    fn default_scheme(self) -> &'static str {
        match self {
            ProxyType::Socks5 => "socks5",
            _ => "http",
        }
    }

    fn accepts_scheme(self, scheme: &str) -> bool {
        match self {
            ProxyType::Socks5 => matches!(scheme, "socks5" | "socks5h"),
            _ => matches!(scheme, "http" | "https"),
        }
    }
}

#[derive(Clone)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

// Keeps the password out of logs.
impl fmt::Debug for ProxyAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyAuth")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy address, with or without scheme (e.g. `127.0.0.1:1080`)
    pub url: String,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

impl ProxyConfig {
    pub fn new(url: impl Into<String>, proxy_type: ProxyType) -> Self {
        Self {
            url: url.into(),
            proxy_type,
            auth: None,
        }
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(ProxyAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// The proxy address as a URL, with the type's default scheme added when
    /// none was given.
    pub fn endpoint(&self) -> Result<Url, String> {
        let raw = self.url.trim();
        if raw.is_empty() {
            return Err("Proxy URL is empty".to_string());
        }
        let candidate = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("{}://{raw}", self.proxy_type.default_scheme())
        };
        let url = Url::parse(&candidate).map_err(|e| format!("Invalid proxy URL '{raw}': {e}"))?;
        if !url.has_host() {
            return Err(format!("Proxy URL '{raw}' has no host"));
        }
        if !self.proxy_type.accepts_scheme(url.scheme()) {
            return Err(format!(
                "Scheme '{}' cannot be used for a {:?} proxy",
                url.scheme(),
                self.proxy_type
            ));
        }
        Ok(url)
    }

    /// Endpoint without credentials, for logging.
    pub fn redacted(&self) -> String {
        match self.endpoint() {
            Ok(mut url) => {
                let _ = url.set_username("");
                let _ = url.set_password(None);
                url.to_string()
            }
            Err(_) => "<invalid proxy>".to_string(),
        }
    }

    /// Builds the reqwest proxy. Explicit credentials take precedence over any
    /// embedded in the URL.
    pub fn build(&self) -> Result<Proxy, String> {
        let endpoint = self.endpoint()?;
        let proxy = match self.proxy_type {
            ProxyType::Http => Proxy::http(endpoint.as_str()),
            ProxyType::Https => Proxy::https(endpoint.as_str()),
            ProxyType::Socks5 | ProxyType::All => Proxy::all(endpoint.as_str()),
        }
        .map_err(|e| format!("Invalid proxy URL '{}': {e}", self.redacted()))?;

        Ok(match &self.auth {
            Some(auth) => proxy.basic_auth(&auth.username, &auth.password),
            None => proxy,
        })
    }
}
