//! Progress reporting and build counters.
//!
//! Workers bump lock-free atomic counters; the writer reports one
//! [`FileProgress`] per file, in archive order, once that file is on disk.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// One completed file as seen by a progress callback.
#[derive(Debug, Clone, Copy)]
pub struct FileProgress<'a> {
    pub relative_path: &'a str,
    pub original_size: u64,
    /// Stored bytes written for this file.
    pub compressed_size: u64,
    /// Files written so far, including this one.
    pub files_processed: usize,
}

/// Progress callback function type
pub type ProgressCallback<'a> = dyn Fn(&FileProgress<'_>) + Send + Sync + 'a;

/// Counters shared by all pipeline threads.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    chunks: AtomicU64,
    bytes_in: AtomicU64,
    dedup_hits: AtomicU64,
    store_fallbacks: AtomicU64,
    compress_calls: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a chunk entering a worker (zero-overhead atomic increment)
    pub fn record_chunk(&self, raw_len: usize) {
        self.chunks.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(raw_len as u64, Ordering::Relaxed);
    }

    pub fn record_dedup_hit(&self) {
        self.dedup_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_fallback(&self) {
        self.store_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compress_call(&self) {
        self.compress_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunks(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed)
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    pub fn dedup_hits(&self) -> u64 {
        self.dedup_hits.load(Ordering::Relaxed)
    }

    pub fn store_fallbacks(&self) -> u64 {
        self.store_fallbacks.load(Ordering::Relaxed)
    }

    pub fn compress_calls(&self) -> u64 {
        self.compress_calls.load(Ordering::Relaxed)
    }
}

/// What a finished build did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub files_written: usize,
    /// Raw bytes read from inputs.
    pub bytes_in: u64,
    /// Stored chunk bytes written to the archive (payload only).
    pub bytes_out: u64,
    pub chunks: u64,
    pub dedup_hits: u64,
    pub store_fallbacks: u64,
    /// Codec invocations; dedup hits and stored executables do not count.
    pub compress_calls: u64,
    /// Inputs that could not be read and were left out.
    pub skipped: Vec<PathBuf>,
}

impl BuildSummary {
    /// Stored payload as a fraction of the input; 1.0 for an empty build.
    pub fn ratio(&self) -> f64 {
        if self.bytes_in == 0 {
            1.0
        } else {
            self.bytes_out as f64 / self.bytes_in as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_metrics_across_threads() {
        let metrics = Arc::new(PipelineMetrics::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..250 {
                        metrics.record_chunk(1024);
                    }
                    metrics.record_dedup_hit();
                    metrics.record_compress_call();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.chunks(), 1000);
        assert_eq!(metrics.bytes_in(), 1024 * 1000);
        assert_eq!(metrics.dedup_hits(), 4);
        assert_eq!(metrics.compress_calls(), 4);
        assert_eq!(metrics.store_fallbacks(), 0);
    }

    #[test]
    fn test_summary_ratio() {
        let mut summary = BuildSummary::default();
        assert_eq!(summary.ratio(), 1.0);
        summary.bytes_in = 200;
        summary.bytes_out = 50;
        assert_eq!(summary.ratio(), 0.25);
    }
}
