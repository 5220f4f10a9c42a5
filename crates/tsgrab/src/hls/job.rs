use std::path::{Path, PathBuf};

use reqwest::header::HeaderMap;

use crate::hls::HlsError;

/// Directory under the home directory holding per-output segment folders.
pub const TEMP_ROOT_DIR_NAME: &str = ".m3u8_temp";

/// Ambient settings for one download run.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Base name of the final file, without extension
    pub output: String,
    /// Directory receiving the intermediate and final files
    pub target_dir: PathBuf,
    /// Root under which `<output>/` holds the downloaded segments
    pub temp_root: PathBuf,
    pub concurrency: usize,
    /// Forwarded to every transport call
    pub headers: HeaderMap,
}

impl JobContext {
    /// Creates a context whose temporary root is `<home>/.m3u8_temp`.
    pub fn new(
        output: impl Into<String>,
        target_dir: impl Into<PathBuf>,
        concurrency: usize,
    ) -> Result<Self, HlsError> {
        let temp_root = default_temp_root()?;
        Self::with_temp_root(output, target_dir, temp_root, concurrency)
    }

    pub fn with_temp_root(
        output: impl Into<String>,
        target_dir: impl Into<PathBuf>,
        temp_root: impl Into<PathBuf>,
        concurrency: usize,
    ) -> Result<Self, HlsError> {
        let output = output.into();
        validate_output_name(&output)?;
        if concurrency == 0 {
            return Err(HlsError::Config(
                "Concurrency must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            output,
            target_dir: target_dir.into(),
            temp_root: temp_root.into(),
            concurrency,
            headers: HeaderMap::new(),
        })
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// `<temp_root>/<output>`, shared by all runs with the same output name
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_root.join(&self.output)
    }

    pub fn segment_path(&self, segment_name: &str) -> PathBuf {
        self.temp_dir().join(segment_name)
    }

    /// `<target_dir>/<output>.tmp-playlist`
    pub fn intermediate_path(&self) -> PathBuf {
        self.target_dir.join(format!("{}.tmp-playlist", self.output))
    }

    /// `<target_dir>/<output>.mp4`
    pub fn output_path(&self) -> PathBuf {
        self.target_dir.join(format!("{}.mp4", self.output))
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }
}

pub fn default_temp_root() -> Result<PathBuf, HlsError> {
    dirs::home_dir()
        .map(|home| home.join(TEMP_ROOT_DIR_NAME))
        .ok_or_else(|| HlsError::Config("Unable to determine the home directory".to_string()))
}

// The output name keys the temp directory, so it must stay a single path component.
fn validate_output_name(output: &str) -> Result<(), HlsError> {
    let invalid = output.is_empty()
        || output == "."
        || output == ".."
        || output.contains(['/', '\\']);
    if invalid {
        return Err(HlsError::Config(format!(
            "Invalid output name '{output}': expected a plain file name"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_keyed_by_output_name() {
        let job = JobContext::with_temp_root("movie", "/data/out", "/tmp/root", 4).unwrap();
        assert_eq!(job.temp_dir(), PathBuf::from("/tmp/root/movie"));
        assert_eq!(
            job.segment_path("a.ts"),
            PathBuf::from("/tmp/root/movie/a.ts")
        );
        assert_eq!(
            job.intermediate_path(),
            PathBuf::from("/data/out/movie.tmp-playlist")
        );
        assert_eq!(job.output_path(), PathBuf::from("/data/out/movie.mp4"));
    }

    #[test]
    fn test_rejects_invalid_settings() {
        assert!(JobContext::with_temp_root("", "/out", "/tmp", 1).is_err());
        assert!(JobContext::with_temp_root("a/b", "/out", "/tmp", 1).is_err());
        assert!(JobContext::with_temp_root("..", "/out", "/tmp", 1).is_err());
        assert!(JobContext::with_temp_root("ok", "/out", "/tmp", 0).is_err());
    }
}
