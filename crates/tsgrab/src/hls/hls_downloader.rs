use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use url::Url;

use crate::hls::assembler::{Assembler, FfmpegTranscoder, Transcoder};
use crate::hls::playlist::{Manifest, PlaylistEngine};
use crate::hls::scheduler::{AcquireReport, SegmentScheduler};
use crate::hls::{HlsConfig, JobContext};
use crate::progress::{NoProgress, ProgressSink};
use crate::transport::{HttpTransport, Transport};
use crate::DownloadError;

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    /// Path of the produced `.mp4`
    pub output: PathBuf,
    pub report: AcquireReport,
}

/// Playlist URL in, one media file out.
///
/// The three stages are also exposed separately so callers can inspect the
/// manifest (e.g. to size a progress bar) before acquisition starts.
pub struct HlsDownloader {
    config: Arc<HlsConfig>,
    transport: Arc<dyn Transport>,
    transcoder: Arc<dyn Transcoder>,
    progress: Arc<dyn ProgressSink>,
}

impl HlsDownloader {
    /// Creates a downloader over HTTP with ffmpeg as the transcoder.
    pub fn new(config: HlsConfig) -> Result<Self, DownloadError> {
        let transport = HttpTransport::new(&config.base)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: HlsConfig, transport: Arc<dyn Transport>) -> Self {
        let transcoder = Arc::new(FfmpegTranscoder::from_config(&config.output_config));
        Self {
            config: Arc::new(config),
            transport,
            transcoder,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = transcoder;
        self
    }

    /// Sink advanced once per segment during acquisition.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &HlsConfig {
        &self.config
    }

    /// Fetches and interprets the playlist, including its key.
    pub async fn load_manifest(&self, url: &str, job: &JobContext) -> Result<Manifest, DownloadError> {
        Url::parse(url).map_err(|e| DownloadError::UrlError(format!("{url}: {e}")))?;
        let engine = PlaylistEngine::new(Arc::clone(&self.transport))
            .with_key_retry_policy(self.config.key_retry_policy());
        Ok(engine.load(url, &job.headers).await?)
    }

    pub async fn acquire(
        &self,
        manifest: &Manifest,
        job: &JobContext,
    ) -> Result<AcquireReport, DownloadError> {
        let scheduler = SegmentScheduler::new(
            Arc::clone(&self.config),
            Arc::clone(&self.transport),
            Arc::clone(&self.progress),
        );
        Ok(scheduler.acquire(manifest, job).await?)
    }

    /// Concatenates and transcodes the acquired segments.
    ///
    /// When `report` is incomplete the segment cache is left in place, so
    /// running the same job again only fetches the missing segments.
    pub async fn assemble(
        &self,
        manifest: &Manifest,
        job: &JobContext,
        report: &AcquireReport,
    ) -> Result<PathBuf, DownloadError> {
        let keep_temp = self.config.output_config.keep_temp || !report.is_complete();
        if keep_temp && !self.config.output_config.keep_temp {
            info!(
                temp_dir = %job.temp_dir().display(),
                "Keeping downloaded segments for the next run"
            );
        }
        let assembler = Assembler::new(
            Arc::clone(&self.transcoder),
            self.config.cleanup_retry_policy(),
        )
        .with_keep_temp(keep_temp);
        Ok(assembler.assemble(manifest, job).await?)
    }

    /// Runs all stages. An incomplete acquisition still proceeds to assembly
    /// and keeps its segments for a later run.
    pub async fn download(&self, url: &str, job: &JobContext) -> Result<DownloadOutcome, DownloadError> {
        let start_time = Instant::now();

        let manifest = self.load_manifest(url, job).await?;
        let report = self.acquire(&manifest, job).await?;
        if !report.is_complete() {
            warn!(
                missing = report.total - report.completed,
                "Assembling an incomplete download"
            );
        }
        let output = self.assemble(&manifest, job, &report).await?;

        info!(
            output = %output.display(),
            elapsed = ?start_time.elapsed(),
            "Download finished"
        );
        Ok(DownloadOutcome { output, report })
    }
}
