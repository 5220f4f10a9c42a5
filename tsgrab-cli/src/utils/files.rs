use std::path::{Path, PathBuf};

use crate::error::AppError;

const FALLBACK_NAME: &str = "stream";
const MAX_NAME_LEN: usize = 30;

/// Creates all directories in the given path, including parent directories if they don't exist.
#[inline]
pub async fn create_dirs(path: &Path) -> Result<(), AppError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(AppError::Io)?;
    Ok(())
}

/// Extracts the playlist file name from a URL, without its extension.
///
/// Long names are truncated to keep the temporary directory name short.
///
/// # Examples
///
/// ```ignore
/// let filename = extract_filename_from_url("https://example.com/vod/episode.m3u8")?;
/// assert_eq!(filename, "episode");
/// ```
pub fn extract_filename_from_url(url_str: &str) -> Result<String, AppError> {
    let url = url_str
        .parse::<reqwest::Url>()
        .map_err(|e| AppError::InvalidInput(format!("{url_str}: {e}")))?;

    let file_name = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .filter(|s| !s.is_empty())
        .unwrap_or(FALLBACK_NAME);

    let url_name = match file_name.rfind('.') {
        Some(pos) if pos > 0 => &file_name[..pos],
        _ => file_name,
    };

    // we dont want large filenames
    let filename: String = url_name.chars().take(MAX_NAME_LEN).collect();
    Ok(filename)
}

/// Expands the `%u` placeholder of an output name with the playlist file name.
pub fn expand_name_url(name_template: &str, url_str: &str) -> Result<String, AppError> {
    if !name_template.contains("%u") {
        return Ok(name_template.to_string());
    }
    let url_name = extract_filename_from_url(url_str)?;
    Ok(name_template.replace("%u", &url_name))
}

/// `--dir` when given, the home directory otherwise.
pub fn resolve_target_dir(dir: Option<PathBuf>) -> Result<PathBuf, AppError> {
    match dir {
        Some(dir) => Ok(dir),
        None => dirs::home_dir().ok_or_else(|| {
            AppError::InvalidInput("Unable to determine the home directory, pass --dir".to_string())
        }),
    }
}
