// HLS Segment Scheduler: runs the bounded pool of segment workers and reconciles the result.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::hls::HlsError;
use crate::hls::config::HlsConfig;
use crate::hls::fetcher::{SegmentFetcher, SegmentOutcome};
use crate::hls::job::JobContext;
use crate::hls::playlist::Manifest;
use crate::progress::ProgressSink;
use crate::transport::Transport;

/// Aggregate result of one acquisition pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquireReport {
    /// Segments listed by the manifest
    pub total: usize,
    /// Segment files present in the temporary directory after the pool drained
    pub completed: usize,
    /// Segments written during this pass
    pub downloaded: usize,
    /// Segments found from an earlier pass
    pub skipped: usize,
    /// Names of segments abandoned after exhausting their retries
    pub failed: Vec<String>,
}

impl AcquireReport {
    /// Completion in percent. An empty manifest counts as complete.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed as f64 * 100.0 / self.total as f64
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

pub struct SegmentScheduler {
    config: Arc<HlsConfig>,
    transport: Arc<dyn Transport>,
    progress: Arc<dyn ProgressSink>,
}

impl SegmentScheduler {
    pub fn new(
        config: Arc<HlsConfig>,
        transport: Arc<dyn Transport>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            config,
            transport,
            progress,
        }
    }

    /// Downloads every segment of `manifest` into the job's temporary
    /// directory with at most `job.concurrency` segments in flight.
    ///
    /// Individual segment failures never fail the call; they show up in the
    /// report as a shortfall. Only setting up the temporary directory or an
    /// unusable cipher context returns an error.
    pub async fn acquire(
        &self,
        manifest: &Manifest,
        job: &JobContext,
    ) -> Result<AcquireReport, HlsError> {
        let temp_dir = job.temp_dir();
        tokio::fs::create_dir_all(&temp_dir).await?;

        let fetcher = Arc::new(SegmentFetcher::new(
            Arc::clone(&self.transport),
            manifest.encryption.cipher()?,
            self.config.segment_retry_policy(),
            job.headers.clone(),
            &temp_dir,
        ));

        let concurrency = job.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut workers = JoinSet::new();

        info!(
            segments = manifest.len(),
            concurrency,
            temp_dir = %temp_dir.display(),
            "Starting segment acquisition"
        );

        for segment in manifest.segments.iter().cloned() {
            // The pool is never closed, so acquiring can only fail if that changes.
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| HlsError::Config(format!("Worker pool closed: {e}")))?;
            let fetcher = Arc::clone(&fetcher);
            let progress = Arc::clone(&self.progress);

            workers.spawn(async move {
                let outcome = fetcher.acquire(&segment).await;
                progress.advance(1);
                drop(permit);
                (segment.name, outcome)
            });
        }

        let mut report = AcquireReport {
            total: manifest.len(),
            ..Default::default()
        };

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((name, SegmentOutcome::Downloaded { bytes, attempts })) => {
                    if attempts > 1 {
                        debug!(name = %name, bytes, attempts, "Segment recovered after retries");
                    }
                    report.downloaded += 1;
                }
                Ok((_, SegmentOutcome::Skipped)) => report.skipped += 1,
                Ok((name, SegmentOutcome::Abandoned { .. })) => report.failed.push(name),
                Err(e) => {
                    error!(error = %e, "Segment worker panicked");
                    self.progress.advance(1);
                }
            }
        }

        report.completed = count_present(manifest, job).await;
        report.failed.sort();

        if report.is_complete() {
            info!(
                completed = report.completed,
                total = report.total,
                downloaded = report.downloaded,
                skipped = report.skipped,
                "All segments acquired"
            );
        } else {
            warn!(
                completed = report.completed,
                total = report.total,
                "Only {:.2}% of segments acquired, lower the concurrency and run again",
                report.percentage()
            );
        }

        Ok(report)
    }
}

/// Counts the manifest's segment files present on disk.
async fn count_present(manifest: &Manifest, job: &JobContext) -> usize {
    let mut present = 0;
    for segment in &manifest.segments {
        if tokio::fs::try_exists(job.segment_path(&segment.name))
            .await
            .unwrap_or(false)
        {
            present += 1;
        }
    }
    present
}
