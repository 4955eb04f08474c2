//! General-purpose algorithms: thin whole-buffer wrappers over stream codecs.

use std::io::{Cursor, Read, Write};

use flate2::Compression;

use super::{method, CodecError, CompressionAlgorithm};

/// No-op pass-through. The universal fallback; never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Store;

impl CompressionAlgorithm for Store {
    fn name(&self) -> &str {
        method::STORE
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(input.to_vec())
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(input.to_vec())
    }
}

fn read_all<R: Read>(mut reader: R, size_hint: usize) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(size_hint);
    reader.read_to_end(&mut out)?;
    Ok(out)
}

/// gzip member (RFC 1952) at the best flate2 level.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gzip;

impl CompressionAlgorithm for Gzip {
    fn name(&self) -> &str {
        method::GZIP
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::with_capacity(input.len() / 2), Compression::best());
        encoder.write_all(input)?;
        Ok(encoder.finish()?)
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        read_all(flate2::read::GzDecoder::new(input), input.len() * 2)
    }
}

/// Raw deflate stream (RFC 1951).
#[derive(Debug, Clone, Copy, Default)]
pub struct Deflate;

impl CompressionAlgorithm for Deflate {
    fn name(&self) -> &str {
        method::DEFLATE
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut encoder =
            flate2::write::DeflateEncoder::new(
                Vec::with_capacity(input.len() / 2),
                Compression::best(),
            );
        encoder.write_all(input)?;
        Ok(encoder.finish()?)
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        read_all(flate2::read::DeflateDecoder::new(input), input.len() * 2)
    }
}

/// Brotli with a configurable quality and window.
#[derive(Debug, Clone, Copy)]
pub struct Brotli {
    pub quality: u32,
    pub lgwin: u32,
}

impl Default for Brotli {
    fn default() -> Self {
        Self { quality: 9, lgwin: 22 }
    }
}

const BROTLI_BUFFER: usize = 4096;

impl CompressionAlgorithm for Brotli {
    fn name(&self) -> &str {
        method::BROTLI
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut writer = brotli::CompressorWriter::new(
            Vec::with_capacity(input.len() / 2),
            BROTLI_BUFFER,
            self.quality,
            self.lgwin,
        );
        writer.write_all(input)?;
        writer.flush()?;
        Ok(writer.into_inner())
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        read_all(brotli::Decompressor::new(input, BROTLI_BUFFER), input.len() * 2)
    }
}

/// A single-entry zip container holding the chunk as entry `data`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zip;

const ZIP_ENTRY_NAME: &str = "data";

impl CompressionAlgorithm for Zip {
    fn name(&self) -> &str {
        method::ZIP
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let buffer = Cursor::new(Vec::with_capacity(input.len() / 2 + 128));
        let mut writer = zip::ZipWriter::new(buffer);
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .large_file(input.len() as u64 >= u32::MAX as u64);
        writer.start_file(ZIP_ENTRY_NAME, options)?;
        writer.write_all(input)?;
        Ok(writer.finish()?.into_inner())
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(input))?;
        if archive.len() != 1 {
            return Err(CodecError::Invalid(format!(
                "expected a single zip entry, found {}",
                archive.len()
            )));
        }
        let entry = archive.by_index(0)?;
        let size = entry.size() as usize;
        read_all(entry, size)
    }
}

/// bzip2 at block size 9.
#[derive(Debug, Clone, Copy, Default)]
pub struct BZip2;

impl CompressionAlgorithm for BZip2 {
    fn name(&self) -> &str {
        method::BZIP2
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut encoder =
            bzip2::write::BzEncoder::new(
                Vec::with_capacity(input.len() / 2),
                bzip2::Compression::best(),
            );
        encoder.write_all(input)?;
        Ok(encoder.finish()?)
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        read_all(bzip2::read::BzDecoder::new(input), input.len() * 3)
    }
}

/// LZMA2 in an `.xz` container.
#[derive(Debug, Clone, Copy)]
pub struct Lzma {
    /// xz preset (0-9).
    pub preset: u32,
}

impl Default for Lzma {
    fn default() -> Self {
        Self { preset: 6 }
    }
}

impl CompressionAlgorithm for Lzma {
    fn name(&self) -> &str {
        method::LZMA
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut encoder =
            xz2::write::XzEncoder::new(Vec::with_capacity(input.len() / 2), self.preset.min(9));
        encoder.write_all(input)?;
        Ok(encoder.finish()?)
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        read_all(xz2::read::XzDecoder::new(input), input.len() * 3)
    }
}
