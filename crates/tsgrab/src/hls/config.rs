use std::path::PathBuf;
use std::time::Duration;

use crate::DownloaderConfig;
use crate::retry::RetryPolicy;

/// Canonical extension given to every persisted segment.
pub const SEGMENT_EXTENSION: &str = "ts";

// --- Top-Level Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsConfig {
    /// Base transport configuration
    pub base: DownloaderConfig,
    pub scheduler_config: HlsSchedulerConfig,
    pub fetcher_config: HlsFetcherConfig,
    pub output_config: HlsOutputConfig,
}

impl HlsConfig {
    pub fn segment_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.fetcher_config.max_segment_retries.saturating_add(1),
            self.fetcher_config.segment_retry_delay,
        )
    }

    pub fn key_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.fetcher_config.max_key_retries.saturating_add(1),
            self.fetcher_config.key_retry_delay,
        )
    }

    pub fn cleanup_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(
            self.output_config.cleanup_max_attempts,
            self.output_config.cleanup_delay_base,
        )
    }
}

// --- Scheduler Configuration ---
#[derive(Debug, Clone)]
pub struct HlsSchedulerConfig {
    pub download_concurrency: usize, // Max concurrent segment downloads
}

impl Default for HlsSchedulerConfig {
    fn default() -> Self {
        Self {
            download_concurrency: 50,
        }
    }
}

// --- Fetcher Configuration ---
#[derive(Debug, Clone)]
pub struct HlsFetcherConfig {
    /// Retries after the first failed attempt of a segment
    pub max_segment_retries: u32,
    /// Fixed delay between two attempts of the same segment
    pub segment_retry_delay: Duration,
    /// Retries after the first failed key request
    pub max_key_retries: u32,
    pub key_retry_delay: Duration,
}

impl Default for HlsFetcherConfig {
    fn default() -> Self {
        Self {
            max_segment_retries: 100,
            segment_retry_delay: Duration::from_millis(500),
            max_key_retries: 3,
            key_retry_delay: Duration::from_millis(500),
        }
    }
}

// --- Output Configuration ---
#[derive(Debug, Clone)]
pub struct HlsOutputConfig {
    /// External transcode program
    pub transcoder_program: PathBuf,
    /// Pass `-movflags +faststart` to the transcode tool
    pub faststart: bool,
    pub cleanup_max_attempts: u32,
    /// Cleanup waits base, 2*base, 3*base ... between attempts
    pub cleanup_delay_base: Duration,
    /// Leave the temporary directory and intermediate file in place
    pub keep_temp: bool,
}

impl Default for HlsOutputConfig {
    fn default() -> Self {
        Self {
            transcoder_program: PathBuf::from("ffmpeg"),
            faststart: false,
            cleanup_max_attempts: 10,
            cleanup_delay_base: Duration::from_secs(1),
            keep_temp: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Backoff;

    #[test]
    fn test_default_policies() {
        let config = HlsConfig::default();
        let segment = config.segment_retry_policy();
        assert_eq!(segment.max_attempts, 101);
        assert_eq!(segment.backoff, Backoff::Fixed(Duration::from_millis(500)));

        let cleanup = config.cleanup_retry_policy();
        assert_eq!(cleanup.max_attempts, 10);
        assert_eq!(cleanup.backoff, Backoff::Linear(Duration::from_secs(1)));
        assert_eq!(config.scheduler_config.download_concurrency, 50);
    }
}
