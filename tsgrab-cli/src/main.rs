use std::time::Duration;

use clap::Parser;
use error::AppError;
use indicatif::MultiProgress;
use mimalloc::MiMalloc;
use tracing::{Level, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tsgrab_engine::hls::config::{HlsFetcherConfig, HlsOutputConfig, HlsSchedulerConfig};
use tsgrab_engine::{
    DownloadError, DownloaderConfig, HlsConfig, HlsDownloader, JobContext, ProxyConfig,
};

mod cli;
mod error;
mod utils;

use cli::CliArgs;
use utils::progress::ProgressManager;
use utils::{create_dirs, expand_name_url, parse_headers, resolve_target_dir};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const LOG_FILE: &str = "tsgrab.log";

fn main() {
    let args = CliArgs::parse();

    let guard = match init_logging(args.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = bootstrap(args) {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        // exit() skips destructors, flush the log file first
        drop(guard);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) -> Result<WorkerGuard, AppError> {
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(LOG_FILE)?;
    let (file_writer, guard) = tracing_appender::non_blocking(log_file);

    let multi_writer = MakeWriterExt::and(std::io::stdout, file_writer);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(multi_writer)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;
    Ok(guard)
}

fn proxy_settings(args: &CliArgs) -> Result<(Option<ProxyConfig>, bool), DownloadError> {
    if args.no_proxy {
        // No proxy flag overrides everything else
        info!("All proxy settings disabled (--no-proxy flag)");
        return Ok((None, false));
    }

    let Some(proxy_url) = args.proxy.as_ref() else {
        return Ok((None, true));
    };

    let mut proxy = ProxyConfig::new(proxy_url, args.proxy_type);
    // Configure proxy authentication if both username and password are provided
    if let (Some(username), Some(password)) = (&args.proxy_user, &args.proxy_pass) {
        proxy = proxy.with_auth(username, password);
    }
    // Reject a bad address before any request is made
    proxy.endpoint().map_err(DownloadError::ProxyError)?;

    info!(
        proxy = %proxy.redacted(),
        proxy_type = ?args.proxy_type,
        has_auth = proxy.auth.is_some(),
        "Using explicit proxy configuration for downloads"
    );

    // Don't use system proxy when explicit proxy is configured
    Ok((Some(proxy), false))
}

fn build_config(args: &CliArgs) -> Result<HlsConfig, AppError> {
    let (proxy_config, use_system_proxy) = proxy_settings(args)?;

    let mut builder = DownloaderConfig::builder()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_headers(parse_headers(&args.headers));
    if let Some(user_agent) = &args.user_agent {
        builder = builder.with_user_agent(user_agent);
    }
    if let Some(referer) = &args.referer {
        builder = builder.with_referer(referer);
    }
    if let Some(cookie) = &args.cookie {
        builder = builder.with_cookie(cookie);
    }
    builder = match proxy_config {
        Some(proxy) => builder.with_proxy(proxy),
        None => builder.with_system_proxy(use_system_proxy),
    };

    Ok(HlsConfig {
        base: builder.build(),
        scheduler_config: HlsSchedulerConfig {
            download_concurrency: args.parallel as usize,
        },
        fetcher_config: HlsFetcherConfig {
            max_segment_retries: args.retries,
            segment_retry_delay: Duration::from_millis(args.retry_delay_ms),
            ..Default::default()
        },
        output_config: HlsOutputConfig {
            transcoder_program: args.ffmpeg.clone(),
            faststart: args.faststart,
            keep_temp: args.keep_temp,
            ..Default::default()
        },
    })
}

#[tokio::main]
async fn bootstrap(args: CliArgs) -> Result<(), AppError> {
    info!("tsgrab {} - HLS playlist downloader", env!("CARGO_PKG_VERSION"));

    let output = expand_name_url(&args.output, &args.url)?;
    let target_dir = resolve_target_dir(args.dir.clone())?;
    create_dirs(&target_dir).await?;

    let hls_config = build_config(&args)?;
    let concurrency = hls_config.scheduler_config.download_concurrency;
    info!(
        "HTTP timeout: {}s, retries per segment: {} every {}ms, parallel downloads: {}",
        args.timeout, args.retries, args.retry_delay_ms, concurrency
    );

    let job = match &args.temp_dir {
        Some(temp_root) => JobContext::with_temp_root(&output, &target_dir, temp_root, concurrency)?,
        None => JobContext::new(&output, &target_dir, concurrency)?,
    };

    let progress_manager = if args.no_progress {
        ProgressManager::new_disabled()
    } else {
        ProgressManager::new(MultiProgress::new())
    };

    let downloader = HlsDownloader::new(hls_config)?.with_progress(progress_manager.sink());

    let manifest = downloader.load_manifest(&args.url, &job).await?;
    info!(
        segments = manifest.len(),
        encrypted = manifest.is_encrypted(),
        temp_dir = %job.temp_dir().display(),
        "Downloading {}",
        output
    );

    progress_manager.start(manifest.len() as u64, format!("Downloading {output}"));
    let report = downloader.acquire(&manifest, &job).await?;
    progress_manager.finish(format!("{}/{} segments", report.completed, report.total));

    info!("Completion: {:.2}%", report.percentage());
    if !report.is_complete() {
        warn!(
            missing = report.total - report.completed,
            temp_dir = %job.temp_dir().display(),
            "Some segments could not be downloaded. Lower --parallel (currently {}) and run the same command again to fetch only the missing ones",
            concurrency
        );
    }

    let output_path = downloader.assemble(&manifest, &job, &report).await?;
    info!(path = %output_path.display(), "Saved");
    println!("{}", output_path.display());
    Ok(())
}
