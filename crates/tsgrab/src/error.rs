use crate::hls::HlsError;
use crate::transport::TransportError;

/// Top-level error for a download run
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Invalid URL: {0}")]
    UrlError(String),

    #[error("Invalid proxy configuration: {0}")]
    ProxyError(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("HLS error: {0}")]
    HlsError(#[from] HlsError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
