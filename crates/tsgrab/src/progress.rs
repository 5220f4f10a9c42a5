use std::sync::atomic::{AtomicU64, Ordering};

/// Receives one unit per finished segment. Never fails the caller.
pub trait ProgressSink: Send + Sync {
    fn advance(&self, by: u64);
}

impl<F> ProgressSink for F
where
    F: Fn(u64) + Send + Sync,
{
    fn advance(&self, by: u64) {
        self(by)
    }
}

/// Sink that discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn advance(&self, _by: u64) {}
}

/// Shared counter sink.
#[derive(Debug, Default)]
pub struct AtomicProgress {
    count: AtomicU64,
}

impl AtomicProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl ProgressSink for AtomicProgress {
    fn advance(&self, by: u64) {
        self.count.fetch_add(by, Ordering::Relaxed);
    }
}
