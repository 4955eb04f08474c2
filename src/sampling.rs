//! Sample-based compressibility testing.
//!
//! Before committing a whole file to an algorithm, the decision engine runs
//! the candidates over a small sample and compares ratios.

use crate::codecs::{compress_guarded, Algorithm, CompressionAlgorithm};

/// `compressed_len / sample_len`, or `+inf` for an empty sample or any failure.
pub fn test_compression_ratio(algo: &dyn CompressionAlgorithm, sample: &[u8]) -> f64 {
    if sample.is_empty() {
        return f64::INFINITY;
    }
    match compress_guarded(algo, sample) {
        Some(out) => out.len() as f64 / sample.len() as f64,
        None => f64::INFINITY,
    }
}

/// Runs every candidate on `sample` and returns the one with the lowest ratio,
/// provided that ratio is strictly below `required_ratio`. The first candidate
/// reaching the minimum wins ties.
pub fn choose_best_compressor_by_sample(
    sample: &[u8],
    candidates: &[Algorithm],
    required_ratio: f64,
) -> Option<Algorithm> {
    if sample.is_empty() {
        return None;
    }
    let mut best: Option<(&Algorithm, f64)> = None;
    for candidate in candidates {
        let ratio = test_compression_ratio(candidate.as_ref(), sample);
        tracing::trace!(method = candidate.name(), ratio, "sample ratio");
        if best.map_or(true, |(_, r)| ratio < r) {
            best = Some((candidate, ratio));
        }
    }
    match best {
        Some((algo, ratio)) if ratio < required_ratio => Some(algo.clone()),
        _ => None,
    }
}
