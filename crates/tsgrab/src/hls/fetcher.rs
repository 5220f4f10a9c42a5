// HLS Segment Fetcher: fetch, decrypt and persist one segment with bounded retries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use tracing::{debug, error};

use crate::hls::HlsError;
use crate::hls::decryption::CipherContext;
use crate::hls::playlist::Segment;
use crate::retry::RetryPolicy;
use crate::transport::Transport;

const PARTIAL_SUFFIX: &str = "part";

/// Final result of acquiring one segment.
#[derive(Debug)]
pub enum SegmentOutcome {
    /// Written during this run
    Downloaded { bytes: usize, attempts: u32 },
    /// Already present from an earlier run
    Skipped,
    /// Retry budget exhausted or the failure cannot be retried; the segment
    /// is missing from the output
    Abandoned { error: HlsError },
}

pub struct SegmentFetcher {
    transport: Arc<dyn Transport>,
    cipher: Option<CipherContext>,
    retry_policy: RetryPolicy,
    headers: HeaderMap,
    temp_dir: PathBuf,
}

impl SegmentFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        cipher: Option<CipherContext>,
        retry_policy: RetryPolicy,
        headers: HeaderMap,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transport,
            cipher,
            retry_policy,
            headers,
            temp_dir: temp_dir.into(),
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Acquires `segment` into `<temp_dir>/<segment.name>`. Never fails: an
    /// exhausted segment is reported as [`SegmentOutcome::Abandoned`].
    pub async fn acquire(&self, segment: &Segment) -> SegmentOutcome {
        let path = self.temp_dir.join(&segment.name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(name = %segment.name, "Segment already present, skipping");
            return SegmentOutcome::Skipped;
        }

        let mut attempts = 0;
        let result = self
            .retry_policy
            .run_while(HlsError::is_recoverable, |attempt| {
                attempts = attempt;
                self.attempt(segment, &path, attempt)
            })
            .await;

        match result {
            Ok(bytes) => SegmentOutcome::Downloaded { bytes, attempts },
            Err(error) => {
                error!(
                    url = %segment.url,
                    name = %segment.name,
                    attempts,
                    error = %error,
                    "Segment download failed, giving up"
                );
                SegmentOutcome::Abandoned { error }
            }
        }
    }

    async fn attempt(&self, segment: &Segment, path: &Path, attempt: u32) -> Result<usize, HlsError> {
        let raw = self
            .transport
            .fetch(&segment.url, &self.headers)
            .await
            .inspect_err(|e| debug!(url = %segment.url, attempt, error = %e, "Segment fetch failed"))?;

        let data: Bytes = match &self.cipher {
            Some(cipher) => cipher
                .decrypt_segment(&raw, segment.sequence)
                .inspect_err(|e| debug!(name = %segment.name, attempt, error = %e, "Segment decryption failed"))?,
            None => raw,
        };

        persist(path, &data)
            .await
            .inspect_err(|e| debug!(path = %path.display(), attempt, error = %e, "Segment write failed"))?;

        debug!(name = %segment.name, bytes = data.len(), attempt, "Segment stored");
        Ok(data.len())
    }
}

/// Writes through a `.part` file so an interrupted write never looks like a
/// finished segment to the resume check.
async fn persist(path: &Path, data: &[u8]) -> Result<(), HlsError> {
    let partial = path.with_extension(PARTIAL_SUFFIX);
    let display = path.display().to_string();
    tokio::fs::write(&partial, data)
        .await
        .map_err(|e| HlsError::write(display.clone(), e))?;
    tokio::fs::rename(&partial, path)
        .await
        .map_err(|e| HlsError::write(display, e))
}
