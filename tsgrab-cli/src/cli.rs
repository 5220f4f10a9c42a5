use clap::Parser;
use std::path::PathBuf;
use tsgrab_engine::ProxyType;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Download an HLS playlist into a single MP4 file",
    long_about = "Downloads every segment of an HLS media playlist in parallel, decrypts\n\
                  AES-128 protected segments, concatenates them in playlist order and\n\
                  remuxes the result into MP4 with ffmpeg (stream copy, no re-encoding).\n\
                  \n\
                  Segments are cached under ~/.m3u8_temp/<output>, so re-running the same\n\
                  command after a partial download only fetches what is missing."
)]
pub struct CliArgs {
    /// Media playlist URL
    #[arg(short = 'l', long = "url", help = "URL of the media playlist (.m3u8)")]
    pub url: String,

    /// Target directory
    #[arg(
        short = 'd',
        long = "dir",
        help = "Directory receiving the final file (default: home directory)"
    )]
    pub dir: Option<PathBuf>,

    /// Output base name
    #[arg(
        short = 'o',
        long = "output",
        default_value = "output",
        help = "Output file name without extension. %u expands to the playlist file name"
    )]
    pub output: String,

    /// Number of concurrent segment downloads
    #[arg(
        short = 'p',
        long = "parallel",
        default_value = "50",
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Maximum number of segments downloaded at the same time"
    )]
    pub parallel: u32,

    #[arg(long, help = "Referer header sent with every request")]
    pub referer: Option<String>,

    #[arg(long, help = "Cookie header sent with every request")]
    pub cookie: Option<String>,

    #[arg(long, help = "User-Agent header (default: a desktop browser)")]
    pub user_agent: Option<String>,

    /// Custom HTTP headers for download requests
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    /// Request timeout in seconds
    #[arg(
        long,
        default_value = "64",
        help = "Overall timeout in seconds for each HTTP request (0 disables it)"
    )]
    pub timeout: u64,

    /// Segment retry attempts
    #[arg(
        long,
        default_value = "100",
        help = "Number of retries for a failing segment before it is given up"
    )]
    pub retries: u32,

    #[arg(
        long,
        default_value = "500",
        help = "Delay in milliseconds between two attempts of the same segment"
    )]
    pub retry_delay_ms: u64,

    /// Transcode program
    #[arg(
        long,
        default_value = "ffmpeg",
        help = "Path of the ffmpeg binary used to produce the MP4"
    )]
    pub ffmpeg: PathBuf,

    #[arg(long, help = "Move the MP4 index to the front of the file (-movflags +faststart)")]
    pub faststart: bool,

    #[arg(
        long,
        help = "Root directory for cached segments (default: ~/.m3u8_temp)"
    )]
    pub temp_dir: Option<PathBuf>,

    #[arg(long, help = "Keep cached segments and the intermediate file after success")]
    pub keep_temp: bool,

    /// Proxy URL (e.g., "http://proxy.example.com:8080")
    #[arg(
        long,
        help = "Proxy server URL for downloads (e.g., \"http://proxy.example.com:8080\")"
    )]
    pub proxy: Option<String>,

    /// Proxy type
    #[arg(long, value_enum, default_value = "http", help = "Proxy type")]
    pub proxy_type: ProxyType,

    /// Proxy username
    #[arg(long, requires = "proxy_pass", help = "Username for proxy authentication")]
    pub proxy_user: Option<String>,

    /// Proxy password
    #[arg(long, requires = "proxy_user", help = "Password for proxy authentication")]
    pub proxy_pass: Option<String>,

    /// Disable all proxy settings for downloads
    #[arg(
        long,
        conflicts_with = "proxy",
        help = "Disable all proxy settings (including system proxy) for downloads"
    )]
    pub no_proxy: bool,

    #[arg(long, help = "Do not draw the progress bar")]
    pub no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["tsgrab", "-l", "https://example.com/a/index.m3u8"]);
        assert_eq!(args.output, "output");
        assert_eq!(args.parallel, 50);
        assert_eq!(args.timeout, 64);
        assert_eq!(args.retries, 100);
        assert_eq!(args.retry_delay_ms, 500);
        assert_eq!(args.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(args.proxy_type, ProxyType::Http);
        assert!(args.dir.is_none());
        assert!(!args.faststart);
    }

    #[test]
    fn test_zero_parallelism_is_rejected() {
        let result = CliArgs::try_parse_from(["tsgrab", "-l", "https://e.com/x.m3u8", "-p", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_repeated_headers() {
        let args = CliArgs::parse_from([
            "tsgrab",
            "-l",
            "https://e.com/x.m3u8",
            "-H",
            "Origin: https://e.com",
            "-H",
            "X-Token: abc",
        ]);
        assert_eq!(args.headers.len(), 2);
    }
}
