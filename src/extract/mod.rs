//! # Extraction Module
//!
//! Reads archives of every format version and recreates their contents.
//!
//! Files are processed one at a time in archive order. The chunks of a file
//! are decoded in parallel with `rayon`, then written sequentially. Problems
//! confined to one file (an unknown method, a chunk that does not decode, an
//! unsafe path) are recorded in the [`ExtractReport`] and extraction moves on.
//! A structurally broken archive cannot be resynchronized, so those errors
//! stop extraction and are returned as-is.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use rayon::prelude::*;

use crate::archive::{ArchiveReader, FormatVersion};
use crate::codecs::AlgorithmRegistry;
use crate::common::{safe_join, ChunkRecord, FileResult};
use crate::error::{ArchiverError, Result};
use crate::preprocess;

/// A file that could not be extracted.
#[derive(Debug)]
pub struct FileFailure {
    pub relative_path: String,
    pub error: ArchiverError,
}

/// What an extraction did.
#[derive(Debug, Default)]
pub struct ExtractReport {
    pub extracted: usize,
    pub bytes_written: u64,
    pub empty_dirs_created: usize,
    pub failures: Vec<FileFailure>,
}

impl ExtractReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Opens an archive file for streaming.
pub fn open_archive(path: &Path) -> Result<ArchiveReader<BufReader<File>>> {
    let file = File::open(path).map_err(|e| ArchiverError::io(e, path))?;
    ArchiveReader::new(BufReader::new(file))
}

/// Decodes one stored chunk back to its raw bytes.
pub fn decode_chunk(
    registry: &AlgorithmRegistry,
    relative_path: &str,
    chunk: &ChunkRecord,
) -> Result<Vec<u8>> {
    let algo = registry
        .get(&chunk.method)
        .ok_or_else(|| ArchiverError::MissingDecompressor {
            path: relative_path.to_string(),
            chunk: chunk.index,
            method: chunk.method.clone(),
        })?;
    if !chunk.flags.is_known() {
        return Err(ArchiverError::Corrupt(format!(
            "chunk {} of '{}' has unknown preprocessing flags {:#04x}",
            chunk.index,
            relative_path,
            chunk.flags.bits()
        )));
    }
    let data = algo
        .decompress(&chunk.data)
        .map_err(|source| ArchiverError::Decompress {
            path: relative_path.to_string(),
            chunk: chunk.index,
            method: chunk.method.clone(),
            source,
        })?;
    Ok(preprocess::reverse(data, chunk.flags))
}

/// Decodes every chunk of `file` in index order.
pub fn decode_file(registry: &AlgorithmRegistry, file: &FileResult) -> Result<Vec<Vec<u8>>> {
    file.chunks
        .par_iter()
        .map(|chunk| decode_chunk(registry, &file.relative_path, chunk))
        .collect()
}

fn extract_one(registry: &AlgorithmRegistry, file: &FileResult, out_dir: &Path) -> Result<u64> {
    let target = safe_join(out_dir, &file.relative_path)?;
    let parts = decode_file(registry, file)?;

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| ArchiverError::io(e, parent))?;
    }
    let output = File::create(&target).map_err(|e| ArchiverError::io(e, &target))?;
    let mut writer = BufWriter::new(output);
    let mut written = 0u64;
    for part in &parts {
        writer.write_all(part).map_err(|e| ArchiverError::io(e, &target))?;
        written += part.len() as u64;
    }
    writer.flush().map_err(|e| ArchiverError::io(e, &target))?;
    Ok(written)
}

/// Extracts every file and empty directory of `archive` under `out_dir`.
pub fn extract_archive(
    archive: &Path,
    out_dir: &Path,
    registry: &AlgorithmRegistry,
) -> Result<ExtractReport> {
    let mut reader = open_archive(archive)?;
    fs::create_dir_all(out_dir).map_err(|e| ArchiverError::io(e, out_dir))?;
    tracing::info!(
        archive = %archive.display(),
        version = %reader.version(),
        files = reader.file_count(),
        "extracting"
    );

    let mut report = ExtractReport::default();
    while let Some(file) = reader.next_file() {
        let file = file?;
        match extract_one(registry, &file, out_dir) {
            Ok(written) => {
                tracing::debug!(path = %file.relative_path, bytes = written, "extracted");
                report.extracted += 1;
                report.bytes_written += written;
            }
            Err(error) => {
                tracing::warn!(path = %file.relative_path, %error, "failed to extract file");
                report.failures.push(FileFailure {
                    relative_path: file.relative_path,
                    error,
                });
            }
        }
    }

    for dir in reader.read_empty_dirs()? {
        let created = safe_join(out_dir, &dir)
            .and_then(|target| {
                fs::create_dir_all(&target).map_err(|e| ArchiverError::io(e, &target))
            });
        match created {
            Ok(()) => report.empty_dirs_created += 1,
            Err(error) => {
                tracing::warn!(path = %dir, %error, "failed to create empty directory");
                report.failures.push(FileFailure {
                    relative_path: dir,
                    error,
                });
            }
        }
    }

    tracing::info!(
        extracted = report.extracted,
        failures = report.failures.len(),
        "extraction finished"
    );
    Ok(report)
}

/// One file as shown by [`list_archive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub relative_path: String,
    pub chunks: usize,
    pub stored_size: u64,
    pub methods: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveListing {
    pub version: FormatVersion,
    pub entries: Vec<ListEntry>,
    pub empty_directories: BTreeSet<String>,
}

/// Reads an archive's table of contents without decompressing anything.
pub fn list_archive(archive: &Path) -> Result<ArchiveListing> {
    let mut reader = open_archive(archive)?;
    let mut entries = Vec::with_capacity(reader.file_count().min(4096));
    while let Some(file) = reader.next_file() {
        let file = file?;
        entries.push(ListEntry {
            chunks: file.chunks.len(),
            stored_size: file.stored_size(),
            methods: file.chunks.iter().map(|c| c.method.clone()).collect(),
            relative_path: file.relative_path,
        });
    }
    let empty_directories = reader.read_empty_dirs()?;
    Ok(ArchiveListing {
        version: reader.version(),
        entries,
        empty_directories,
    })
}
