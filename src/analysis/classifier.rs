//! File-level classification used before any full read of the file.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use super::{byte_histogram, entropy_from_histogram};

/// Extensions whose contents are almost always compressed already.
/// Game package formats are included conservatively.
pub const COMPRESSED_EXTENSIONS: &[&str] = &[
    "zip", "rar", "7z", "gz", "tgz", "bz2", "xz", //
    "mp3", "ogg", "mp4", "mkv", "webm", //
    "jpg", "jpeg", "png", "gif", "bmp", "ico", "tga", "dds", "pkm", "astc", "basis", //
    "wav", "flac", //
    "pak", "pak0", "pak1", "bundle", "unity3d", "assets", "dat",
];

/// Number of header bytes inspected by the magic sniff.
pub const HEADER_SNIFF_LEN: usize = 32;

/// Shannon entropy in bits per byte. Zero for empty input.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    entropy_from_histogram(&byte_histogram(data), data.len())
}

/// Lower-cased extension without the dot, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn has_compressed_extension(path: &Path) -> bool {
    extension_of(path).map_or(false, |ext| COMPRESSED_EXTENSIONS.contains(&ext.as_str()))
}

/// Magic-byte sniff for archives and compressed streams:
/// zip, rar, 7z, PNG, JPEG, gzip and zlib.
pub fn looks_like_compressed_stream(header: &[u8]) -> bool {
    if header.len() < 4 {
        return false;
    }
    const RAR: [u8; 7] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00];
    const SEVEN_Z: [u8; 6] = [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];
    const PNG: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    header.starts_with(b"PK")
        || header.starts_with(&RAR)
        || header.starts_with(&SEVEN_Z)
        || header.starts_with(&PNG)
        || header.starts_with(&[0xFF, 0xD8])
        || header.starts_with(&[0x1F, 0x8B])
        || header[0] == 0x78
}

/// Extension check first, then a sniff of the first [`HEADER_SNIFF_LEN`] bytes.
pub fn is_probably_already_compressed(path: &Path) -> io::Result<bool> {
    if has_compressed_extension(path) {
        return Ok(true);
    }
    let mut header = Vec::with_capacity(HEADER_SNIFF_LEN);
    File::open(path)?
        .take(HEADER_SNIFF_LEN as u64)
        .read_to_end(&mut header)?;
    Ok(looks_like_compressed_stream(&header))
}

/// Reads start, middle and end sections of `section` bytes each.
/// Files no larger than one section are returned whole.
pub fn sample_file(path: &Path, section: usize) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let section64 = section as u64;

    if len <= section64 {
        let mut all = Vec::with_capacity(len as usize);
        file.read_to_end(&mut all)?;
        return Ok(all);
    }

    let offsets = [
        0,
        (len / 2).saturating_sub(section64 / 2),
        len.saturating_sub(section64),
    ];
    let mut sample = Vec::with_capacity(section * offsets.len());
    for offset in offsets {
        file.seek(SeekFrom::Start(offset))?;
        (&mut file).take(section64).read_to_end(&mut sample)?;
    }
    Ok(sample)
}
