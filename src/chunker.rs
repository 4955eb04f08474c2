//! # Chunk Sizing
//!
//! Two independent sizing policies:
//!
//! * [`stepped_chunk_size`] drives the single-file and simple batch paths.
//! * [`logarithmic_chunk_size`] drives the concurrent pipeline and
//!   interpolates between a configured minimum and maximum.
//!
//! They are not expected to agree.

use std::fs;
use std::io;
use std::path::Path;

use crate::analysis::is_image_data;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// Threshold-stepped chunk size: 512 KiB below 10 MiB, 2 MiB below 100 MiB,
/// 8 MiB otherwise.
pub fn stepped_chunk_size(file_size: u64) -> usize {
    if file_size < 10 * MIB {
        (512 * KIB) as usize
    } else if file_size < 100 * MIB {
        (2 * MIB) as usize
    } else {
        (8 * MIB) as usize
    }
}

/// Log2-interpolated chunk size clamped into `[min, max]`.
///
/// Files no larger than `min` become a single chunk. Above that the size
/// grows linearly in `log2(file_size)` from 64 KiB files (2^16) to 64 MiB
/// files (2^26), reaching `max`.
pub fn logarithmic_chunk_size(file_size: u64, min: usize, max: usize) -> usize {
    let max = max.max(min).max(1);
    if file_size <= min as u64 {
        return (file_size as usize).max(1);
    }
    let t = ((file_size as f64) + 1.0).log2();
    let n = ((t - 16.0) / 10.0).clamp(0.0, 1.0);
    let size = min as f64 + n * (max - min) as f64;
    (size as usize).clamp(min.max(1), max)
}

/// A named sizing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkSizing {
    Stepped,
    Logarithmic { min: usize, max: usize },
}

impl ChunkSizing {
    pub fn chunk_size(self, file_size: u64) -> usize {
        match self {
            ChunkSizing::Stepped => stepped_chunk_size(file_size),
            ChunkSizing::Logarithmic { min, max } => logarithmic_chunk_size(file_size, min, max),
        }
    }
}

/// Splits a buffer into consecutive chunks of at most `chunk_size` bytes.
/// Image data is never split. Empty input yields no chunks.
pub fn split_bytes(data: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if data.is_empty() {
        return Vec::new();
    }
    if is_image_data(data) {
        return vec![data];
    }
    data.chunks(chunk_size.max(1)).collect()
}

/// Reads a file and splits it with the stepped policy.
pub fn split_file(path: &Path) -> io::Result<Vec<Vec<u8>>> {
    let data = fs::read(path)?;
    let chunk_size = stepped_chunk_size(data.len() as u64);
    Ok(split_bytes(&data, chunk_size)
        .into_iter()
        .map(<[u8]>::to_vec)
        .collect())
}
