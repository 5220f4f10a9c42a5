// HLS Assembler: concatenates persisted segments in playlist order and hands the result to a transcode tool.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::hls::HlsError;
use crate::hls::config::HlsOutputConfig;
use crate::hls::job::JobContext;
use crate::hls::playlist::Manifest;
use crate::retry::RetryPolicy;

/// Turns the concatenated intermediate file into the final container.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), HlsError>;
}

/// Stream-copies the intermediate file into MP4 with an external ffmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    faststart: bool,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            faststart: false,
        }
    }

    pub fn from_config(config: &HlsOutputConfig) -> Self {
        Self::new(&config.transcoder_program).with_faststart(config.faststart)
    }

    /// Moves the index to the front of the file (`-movflags +faststart`).
    pub fn with_faststart(mut self, faststart: bool) -> Self {
        self.faststart = faststart;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// `-y -i <input> -c copy [-movflags +faststart] <output>`
    pub fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-i".into(),
            input.into(),
            "-c".into(),
            "copy".into(),
        ];
        if self.faststart {
            args.push("-movflags".into());
            args.push("+faststart".into());
        }
        args.push(output.into());
        args
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::from_config(&HlsOutputConfig::default())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), HlsError> {
        let program_name = self.program.display().to_string();
        debug!(program = %program_name, input = %input.display(), output = %output.display(), "Running transcoder");

        let result = Command::new(&self.program)
            .args(self.args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| HlsError::Assemble(format!("Failed to spawn {program_name}: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            // ffmpeg prints its banner first, the cause is at the end
            let tail: Vec<&str> = stderr.trim().lines().rev().take(5).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(HlsError::Assemble(format!(
                "{program_name} exited with {}: {}",
                result.status,
                tail.join("\n")
            )));
        }
        Ok(())
    }
}

pub struct Assembler {
    transcoder: Arc<dyn Transcoder>,
    cleanup_policy: RetryPolicy,
    keep_temp: bool,
}

impl Assembler {
    pub fn new(transcoder: Arc<dyn Transcoder>, cleanup_policy: RetryPolicy) -> Self {
        Self {
            transcoder,
            cleanup_policy,
            keep_temp: false,
        }
    }

    pub fn with_keep_temp(mut self, keep_temp: bool) -> Self {
        self.keep_temp = keep_temp;
        self
    }

    /// Builds `<target_dir>/<output>.mp4` from the segment files of `manifest`.
    ///
    /// Segments missing from the temporary directory are skipped; completeness
    /// is reported by the acquisition step, not re-checked here.
    pub async fn assemble(&self, manifest: &Manifest, job: &JobContext) -> Result<PathBuf, HlsError> {
        let intermediate = job.intermediate_path();
        let output = job.output_path();

        tokio::fs::create_dir_all(job.target_dir())
            .await
            .map_err(|e| assemble_io("create", job.target_dir(), e))?;
        remove_file_if_exists(&intermediate)
            .await
            .map_err(|e| assemble_io("remove stale", &intermediate, e))?;

        let written = self.concatenate(manifest, job, &intermediate).await?;
        info!(
            segments = written,
            total = manifest.len(),
            intermediate = %intermediate.display(),
            "Segments concatenated"
        );

        self.transcoder.transcode(&intermediate, &output).await?;
        info!(output = %output.display(), "Transcode finished");

        if self.keep_temp {
            debug!(temp_dir = %job.temp_dir().display(), "Keeping temporary files");
        } else {
            self.cleanup(job, &intermediate).await;
        }

        Ok(output)
    }

    async fn concatenate(
        &self,
        manifest: &Manifest,
        job: &JobContext,
        intermediate: &Path,
    ) -> Result<usize, HlsError> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(intermediate)
            .await
            .map_err(|e| assemble_io("open", intermediate, e))?;
        let mut writer = BufWriter::new(file);
        let mut written = 0;

        for segment in &manifest.segments {
            let path = job.segment_path(&segment.name);
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!(name = %segment.name, "Segment missing, skipping");
                    continue;
                }
                Err(e) => return Err(assemble_io("read", &path, e)),
            };

            writer
                .write_all(&data)
                .await
                .map_err(|e| assemble_io("append to", intermediate, e))?;
            written += 1;

            if !self.keep_temp {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "Failed to remove segment file");
                }
            }
        }

        writer
            .flush()
            .await
            .map_err(|e| assemble_io("flush", intermediate, e))?;
        Ok(written)
    }

    // The transcoder may still hold handles for a moment after exiting.
    async fn cleanup(&self, job: &JobContext, intermediate: &Path) {
        let temp_dir = job.temp_dir();

        let result = self
            .cleanup_policy
            .run(|attempt| {
                let temp_dir = temp_dir.clone();
                async move {
                    remove_dir_if_exists(&temp_dir)
                        .await
                        .inspect_err(|e| debug!(attempt, error = %e, "Temp dir removal failed"))?;
                    remove_file_if_exists(intermediate)
                        .await
                        .inspect_err(|e| debug!(attempt, error = %e, "Intermediate removal failed"))
                }
            })
            .await;

        match result {
            Ok(()) => debug!(temp_dir = %temp_dir.display(), "Temporary files removed"),
            Err(e) => warn!(
                temp_dir = %temp_dir.display(),
                intermediate = %intermediate.display(),
                error = %e,
                "Failed to remove temporary files"
            ),
        }
    }
}

fn assemble_io(action: &str, path: &Path, err: std::io::Error) -> HlsError {
    HlsError::Assemble(format!("Failed to {action} {}: {err}", path.display()))
}

async fn remove_file_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

async fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
