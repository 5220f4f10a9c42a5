use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tsgrab_engine::ProgressSink;

fn segment_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} segments ({percent}%) eta {eta}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Segment progress bar fed by the engine.
#[derive(Clone)]
pub struct ProgressManager {
    bar: Option<ProgressBar>,
}

impl ProgressManager {
    pub fn new(multi: MultiProgress) -> Self {
        let bar = multi.add(ProgressBar::new(0));
        bar.set_style(segment_style());
        Self { bar: Some(bar) }
    }

    pub fn new_disabled() -> Self {
        Self { bar: None }
    }

    /// Sink to hand to the downloader. Advances the bar by one per segment.
    pub fn sink(&self) -> Arc<dyn ProgressSink> {
        Arc::new(BarSink {
            bar: self.bar.clone(),
        })
    }

    /// Sizes the bar once the playlist is known.
    pub fn start(&self, total_segments: u64, message: impl Into<String>) {
        if let Some(bar) = &self.bar {
            bar.set_length(total_segments);
            bar.set_position(0);
            bar.set_message(message.into());
            bar.enable_steady_tick(Duration::from_millis(500));
        }
    }

    pub fn finish(&self, message: impl Into<String>) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(message.into());
        }
    }

    #[inline]
    #[allow(unused)]
    pub fn is_disabled(&self) -> bool {
        self.bar.is_none()
    }
}

struct BarSink {
    bar: Option<ProgressBar>,
}

impl ProgressSink for BarSink {
    fn advance(&self, by: u64) {
        if let Some(bar) = &self.bar {
            bar.inc(by);
        }
    }
}
