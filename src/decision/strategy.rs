//! Coarse strategy hints for a single file or a whole folder.
//!
//! These are advisory; the `analyze` command reports them next to the
//! per-file decision.

use std::fmt;
use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::analysis::classifier::extension_of;

pub const LARGE_FILE_BYTES: u64 = 200 * 1024 * 1024;
pub const MANY_FILES: usize = 200;
pub const SMALL_FILE_BYTES: u64 = 32 * 1024;

const FORMAT_OPTIMIZED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "webp", "gif", "bmp", "tiff", "wav", "flac", "mp3", "ogg",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionStrategy {
    Chunk,
    FullFile,
    FormatOptimized,
}

impl fmt::Display for CompressionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompressionStrategy::Chunk => "chunk",
            CompressionStrategy::FullFile => "full-file",
            CompressionStrategy::FormatOptimized => "format-optimized",
        })
    }
}

fn is_format_optimized(path: &Path) -> bool {
    extension_of(path).map_or(false, |ext| FORMAT_OPTIMIZED_EXTENSIONS.contains(&ext.as_str()))
}

/// Media formats get `FormatOptimized`, very large files `Chunk`, the rest
/// `FullFile`. Unreadable paths fall back to `Chunk`.
pub fn decide_for_file(path: &Path) -> CompressionStrategy {
    let Ok(meta) = fs::metadata(path) else {
        return CompressionStrategy::Chunk;
    };
    if !meta.is_file() {
        return CompressionStrategy::Chunk;
    }
    if is_format_optimized(path) {
        return CompressionStrategy::FormatOptimized;
    }
    if meta.len() >= LARGE_FILE_BYTES {
        return CompressionStrategy::Chunk;
    }
    CompressionStrategy::FullFile
}

/// Looks at the distribution of files under `folder`.
pub fn decide_for_folder(folder: &Path) -> CompressionStrategy {
    let mut count = 0usize;
    let mut total = 0u64;
    let mut small = 0usize;
    let mut media = 0usize;

    for entry in WalkDir::new(folder).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        count += 1;
        // Inaccessible files still count towards the total number of files.
        if let Ok(meta) = entry.metadata() {
            total += meta.len();
            if meta.len() <= SMALL_FILE_BYTES {
                small += 1;
            }
        }
        if is_format_optimized(entry.path()) {
            media += 1;
        }
    }

    if count == 0 {
        return CompressionStrategy::Chunk;
    }
    if count >= MANY_FILES || small > count / 2 {
        return CompressionStrategy::FullFile;
    }
    if media > count / 3 {
        return CompressionStrategy::FormatOptimized;
    }
    let average = total as f64 / count as f64;
    if average >= LARGE_FILE_BYTES as f64 / 4.0 {
        return CompressionStrategy::Chunk;
    }
    CompressionStrategy::FullFile
}
