//! # Content Analysis
//!
//! Cheap statistical and structural profiling of byte buffers. The chunk
//! picker runs [`analyze`] on every chunk in the hot path, so everything here
//! is a single pass with no allocation beyond a 256-entry histogram.
//!
//! File-level heuristics used by the decision engine (sampling, extension
//! lists, magic sniffing) live in [`classifier`].

pub mod classifier;

pub use classifier::shannon_entropy;

/// Statistical profile of one chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkProfile {
    pub is_image: bool,
    pub is_text: bool,
    pub has_repeats: bool,
    /// Shannon entropy in bits per byte, `0.0..=8.0`.
    pub entropy: f64,
}

/// Profiles a chunk.
///
/// * `is_text`: every byte is LF, CR or printable ASCII. Empty input counts as text.
/// * `has_repeats`: fewer distinct byte values than 80% of the length.
/// * `is_image`: starts with a known raster image signature.
pub fn analyze(chunk: &[u8]) -> ChunkProfile {
    let histogram = byte_histogram(chunk);
    let distinct = histogram.iter().filter(|&&c| c > 0).count();

    ChunkProfile {
        is_image: is_image_data(chunk),
        is_text: is_text(chunk),
        has_repeats: (distinct as f64) < chunk.len() as f64 * 0.8,
        entropy: entropy_from_histogram(&histogram, chunk.len()),
    }
}

pub(crate) fn byte_histogram(data: &[u8]) -> [u64; 256] {
    let mut counts = [0u64; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    counts
}

pub(crate) fn entropy_from_histogram(counts: &[u64; 256], len: usize) -> f64 {
    if len == 0 {
        return 0.0;
    }
    let len = len as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

fn is_text(data: &[u8]) -> bool {
    data.iter()
        .all(|&b| b == b'\n' || b == b'\r' || (32..=126).contains(&b))
}

/// Raster image signature check: PNG, JPEG, BMP, GIF and both TIFF byte orders.
/// Buffers shorter than four bytes are never images.
pub fn is_image_data(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }
    matches!(
        data,
        [0x89, 0x50, 0x4E, 0x47, ..]
            | [0xFF, 0xD8, ..]
            | [0x42, 0x4D, ..]
            | [0x47, 0x49, 0x46, ..]
            | [0x49, 0x49, 0x2A, 0x00, ..]
            | [0x4D, 0x4D, 0x00, 0x2A, ..]
    )
}
