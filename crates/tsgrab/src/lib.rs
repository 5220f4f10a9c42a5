//! # tsgrab
//!
//! Engine for downloading a single HLS media playlist into one output file.
//!
//! The flow is playlist text, to an ordered list of segments plus an optional
//! cipher context, to decrypted segment files in a per-job temporary
//! directory, to one concatenated intermediate file, and finally to an MP4
//! produced by an external transcode tool.
//!
//! ## Features
//!
//! - Line-order preserving playlist interpretation with relative reference
//!   resolution
//! - AES-128 (CBC) segment decryption with transport-stream realignment
//! - Bounded-concurrency acquisition with fixed-delay retries and resume
//! - Ordered reassembly with retrying cleanup

pub mod builder;
pub mod config;
pub mod error;
pub mod hls;
pub mod progress;
pub mod proxy;
pub mod retry;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_utils;

pub use builder::DownloaderConfigBuilder;
pub use config::DownloaderConfig;
pub use error::DownloadError;

pub use hls::{
    AcquireReport, Assembler, DownloadOutcome, EncryptionDescriptor, EncryptionMethod,
    FfmpegTranscoder, HlsConfig, HlsDownloader, HlsError, JobContext, Manifest, PlaylistEngine,
    Segment, Transcoder,
};
pub use progress::{AtomicProgress, NoProgress, ProgressSink};
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
pub use retry::{Backoff, RetryPolicy};
pub use transport::{HttpTransport, Transport, TransportError, create_client};
