// Transport: a single GET returning the whole body, without retries or state.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, trace};
use url::Url;

use crate::DownloaderConfig;

#[derive(Debug, thiserror::Error, Clone)]
pub enum TransportError {
    #[error("Server returned status code {status} for {url}")]
    Status { url: String, status: StatusCode },
    #[error("Network error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: Arc<reqwest::Error>,
    },
    #[error("Invalid URL {0}")]
    InvalidUrl(String),
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

impl TransportError {
    /// The HTTP status code, if the server answered at all
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one GET of `url` with the given extra headers and returns the body.
    async fn fetch(&self, url: &Url, headers: &HeaderMap) -> Result<Bytes, TransportError>;
}

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &DownloaderConfig) -> Result<Client, TransportError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(16)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if let Some(proxy_config) = &config.proxy {
        let proxy = proxy_config.build().map_err(TransportError::ClientBuild)?;
        client_builder = client_builder.proxy(proxy);
        info!(proxy = %proxy_config.redacted(), "Using explicitly configured proxy for downloads");
    } else if config.use_system_proxy {
        // reqwest picks up system proxy settings unless no_proxy() is called
        debug!("Using system proxy settings for downloads");
    } else {
        client_builder = client_builder.no_proxy();
        debug!("Proxy disabled for downloads");
    }

    client_builder
        .build()
        .map_err(|e| TransportError::ClientBuild(e.to_string()))
}

/// [`Transport`] backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &DownloaderConfig) -> Result<Self, TransportError> {
        Ok(Self {
            client: create_client(config)?,
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &Url, headers: &HeaderMap) -> Result<Bytes, TransportError> {
        let mut request = self.client.get(url.clone());
        for (name, value) in headers.iter() {
            if !value.is_empty() {
                request = request.header(name, value);
            }
        }

        let network_error = |e: reqwest::Error| TransportError::Network {
            url: url.to_string(),
            source: Arc::new(e),
        };

        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.bytes().await.map_err(network_error)?;
        trace!(url = %url, bytes = body.len(), "GET complete");
        Ok(body)
    }
}
