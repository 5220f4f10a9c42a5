// HLS (single media playlist) download pipeline

pub mod assembler;
pub mod config;
pub mod decryption;
pub mod error;
pub mod fetcher;
pub mod hls_downloader;
pub mod job;
pub mod playlist;
pub mod scheduler;

// Re-exports for easier access
pub use assembler::{Assembler, FfmpegTranscoder, Transcoder};
pub use config::HlsConfig;
pub use decryption::{CipherContext, EncryptionDescriptor, EncryptionMethod};
pub use error::HlsError;
pub use hls_downloader::{DownloadOutcome, HlsDownloader};
pub use job::JobContext;
pub use playlist::{Manifest, PlaylistEngine, Segment};
pub use scheduler::{AcquireReport, SegmentScheduler};
