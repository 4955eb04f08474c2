//! # Sequential Compression
//!
//! The simple, single-threaded encoders. They write the same container as the
//! concurrent pipeline in [`crate::workers`], but make one decision per file
//! with the [decision engine](crate::decision) and use the threshold-stepped
//! chunk sizing.
//!
//! ## Per-file handling
//! - **Store**: one chunk holding the file verbatim.
//! - **ImageSpecial**: one chunk through the lossless image optimizer.
//! - **FullCompress**: one chunk with the sampled algorithm.
//! - **ChunkCompress**: [`compress_file_chunks`], picking a method per chunk.
//!
//! Executables are always stored. Whatever the path, a chunk whose output is
//! not smaller than its input is written as `STORE`.

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::analysis::analyze;
use crate::archive::{ArchiveWriter, FormatVersion};
use crate::chunker;
use crate::codecs::{compress_guarded, method, AlgorithmRegistry, CompressionAlgorithm};
use crate::common::{
    archive_relative_path, common_base_dir, expand_inputs, find_empty_dirs, ChunkRecord, FileResult,
};
use crate::decision::{self, picker, CompressionDecision};
use crate::error::{ArchiverError, Result};
use crate::preprocess::PreprocessFlags;
use crate::progress::{BuildSummary, FileProgress, ProgressCallback};

fn store_chunk(index: usize, raw: &[u8]) -> ChunkRecord {
    ChunkRecord {
        index,
        method: method::STORE.to_string(),
        data: raw.to_vec(),
        flags: PreprocessFlags::NONE,
    }
}

/// Codec work done while encoding, folded into the [`BuildSummary`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct EncodeStats {
    compress_calls: u64,
    store_fallbacks: u64,
}

/// Compresses `raw` with `algo`, storing it when that does not pay off.
fn compress_or_store(
    index: usize,
    raw: &[u8],
    algo: &dyn CompressionAlgorithm,
    stats: &mut EncodeStats,
) -> ChunkRecord {
    if algo.name() == method::STORE {
        return store_chunk(index, raw);
    }
    stats.compress_calls += 1;
    match compress_guarded(algo, raw) {
        Some(data) if data.len() < raw.len() => ChunkRecord {
            index,
            method: algo.name().to_string(),
            data,
            flags: PreprocessFlags::NONE,
        },
        _ => {
            tracing::debug!(method = algo.name(), chunk = index, "no savings, storing chunk");
            stats.store_fallbacks += 1;
            store_chunk(index, raw)
        }
    }
}

/// Splits one file with the stepped sizing policy and compresses every chunk
/// with the method the chunk picker selects.
pub fn compress_file_chunks(path: &Path, registry: &AlgorithmRegistry) -> Result<Vec<ChunkRecord>> {
    encode_chunks(path, registry, &mut EncodeStats::default())
}

fn encode_chunks(
    path: &Path,
    registry: &AlgorithmRegistry,
    stats: &mut EncodeStats,
) -> Result<Vec<ChunkRecord>> {
    let chunks = chunker::split_file(path).map_err(|e| ArchiverError::io(e, path))?;
    let records = chunks
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let profile = analyze(raw);
            let algo = picker::select_best(&profile, path, registry);
            compress_or_store(index, raw, algo.as_ref(), stats)
        })
        .collect();
    Ok(records)
}

/// Encodes one file according to the decision engine.
fn encode_file(
    path: &Path,
    registry: &AlgorithmRegistry,
) -> Result<(Vec<ChunkRecord>, EncodeStats)> {
    let mut stats = EncodeStats::default();
    if picker::is_executable_path(path) {
        let raw = fs::read(path).map_err(|e| ArchiverError::io(e, path))?;
        return Ok((whole_file(&raw, None, &mut stats), stats));
    }

    let decision = decision::decide(path, registry.candidates());
    let records = match decision.kind.effective() {
        CompressionDecision::ChunkCompress => encode_chunks(path, registry, &mut stats)?,
        CompressionDecision::Store
        | CompressionDecision::FullCompress
        | CompressionDecision::ImageSpecial
        | CompressionDecision::BinaryTransform => {
            let raw = fs::read(path).map_err(|e| ArchiverError::io(e, path))?;
            let algo = match decision.kind {
                CompressionDecision::Store => None,
                _ => decision.algorithm.as_deref(),
            };
            whole_file(&raw, algo, &mut stats)
        }
    };
    Ok((records, stats))
}

/// A whole file as a single chunk. Empty files have no chunks.
fn whole_file(
    raw: &[u8],
    algo: Option<&dyn CompressionAlgorithm>,
    stats: &mut EncodeStats,
) -> Vec<ChunkRecord> {
    if raw.is_empty() {
        return Vec::new();
    }
    match algo {
        Some(algo) => vec![compress_or_store(0, raw, algo, stats)],
        None => vec![store_chunk(0, raw)],
    }
}

/// Builds an archive sequentially, one decision per file.
///
/// A file that cannot be read is skipped with a warning and listed in the
/// summary; the rest of the batch continues. Output is written to a
/// temporary file and renamed over `output` on success.
pub fn compress_files(
    inputs: &[PathBuf],
    output: &Path,
    registry: &AlgorithmRegistry,
    progress: Option<&ProgressCallback>,
    format: FormatVersion,
) -> Result<BuildSummary> {
    let expanded = expand_inputs(inputs);
    let base = common_base_dir(&expanded.roots).unwrap_or_default();
    let empty_dirs = find_empty_dirs(&expanded.directories, &base);
    tracing::info!(files = expanded.files.len(), %format, "compressing sequentially");

    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let temp = NamedTempFile::new_in(parent).map_err(|e| ArchiverError::io(e, parent))?;
    let mut writer = ArchiveWriter::new(BufWriter::new(temp), format)?;

    let mut summary = BuildSummary {
        skipped: expanded.missing.clone(),
        ..BuildSummary::default()
    };

    for path in &expanded.files {
        let original_size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable input");
                summary.skipped.push(path.clone());
                continue;
            }
        };
        let (chunks, stats) = match encode_file(path, registry) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable input");
                summary.skipped.push(path.clone());
                continue;
            }
        };

        let mut file = FileResult::new(archive_relative_path(&base, path), original_size);
        file.chunks = chunks;
        writer.write_file(&file)?;

        let stored = file.stored_size();
        summary.files_written += 1;
        summary.bytes_in += original_size;
        summary.bytes_out += stored;
        summary.chunks += file.chunks.len() as u64;
        summary.store_fallbacks += stats.store_fallbacks;
        summary.compress_calls += stats.compress_calls;
        if let Some(callback) = progress {
            callback(&FileProgress {
                relative_path: &file.relative_path,
                original_size,
                compressed_size: stored,
                files_processed: summary.files_written,
            });
        }
    }

    let buffered = writer.finish(&empty_dirs)?;
    let temp = buffered
        .into_inner()
        .map_err(|e| ArchiverError::io(e.into_error(), output))?;
    temp.persist(output).map_err(|e| ArchiverError::io(e.error, output))?;

    tracing::info!(
        files = summary.files_written,
        bytes_in = summary.bytes_in,
        bytes_out = summary.bytes_out,
        output = %output.display(),
        "archive written"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::decode_archive;
    use crate::codecs::CodecError;
    use rand::RngCore;
    use std::error::Error;
    use tempfile::tempdir;

    #[test]
    fn test_chunk_compression_of_text() -> std::result::Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.txt");
        fs::write(&path, "the quick brown fox jumps over the lazy dog\n".repeat(30_000))?;

        let records = compress_file_chunks(&path, &AlgorithmRegistry::with_defaults())?;
        // 1.3 MB at 512 KiB per chunk.
        assert_eq!(records.len(), 3);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.index, i);
            assert_ne!(record.method, method::STORE);
        }
        Ok(())
    }

    #[test]
    fn test_random_data_is_stored() -> std::result::Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("noise.bin");
        let mut data = vec![0u8; 10 * 1024];
        rand::thread_rng().fill_bytes(&mut data);
        fs::write(&path, &data)?;

        let output = dir.path().join("out.dyn");
        let registry = AlgorithmRegistry::with_defaults();
        let summary = compress_files(&[path], &output, &registry, None, FormatVersion::CURRENT)?;
        assert_eq!(summary.files_written, 1);

        let archive = decode_archive(&fs::read(&output)?)?;
        assert_eq!(archive.files[0].chunks.len(), 1);
        assert_eq!(archive.files[0].chunks[0].method, method::STORE);
        assert_eq!(archive.files[0].chunks[0].data, data);
        Ok(())
    }

    /// Inflates every input so no chunk ever pays off.
    struct Inflating;

    impl CompressionAlgorithm for Inflating {
        fn name(&self) -> &str {
            method::BZIP2
        }

        fn compress(&self, input: &[u8]) -> std::result::Result<Vec<u8>, CodecError> {
            Ok([input, &b"padding"[..]].concat())
        }

        fn decompress(&self, input: &[u8]) -> std::result::Result<Vec<u8>, CodecError> {
            Ok(input[..input.len().saturating_sub(7)].to_vec())
        }
    }

    #[test]
    fn test_chunk_fallbacks_are_counted() -> std::result::Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.txt");
        fs::write(&path, "the quick brown fox jumps over the lazy dog\n".repeat(30_000))?;

        let mut registry = AlgorithmRegistry::with_defaults();
        registry.register(std::sync::Arc::new(Inflating));
        let mut stats = EncodeStats::default();
        let records = encode_chunks(&path, &registry, &mut stats)?;

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.method == method::STORE));
        assert_eq!(
            stats,
            EncodeStats {
                compress_calls: 3,
                store_fallbacks: 3,
            }
        );
        Ok(())
    }

    #[test]
    fn test_executable_whole_file_stored() -> std::result::Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("tool.EXE");
        fs::write(&path, vec![b'a'; 4096])?;

        let (records, stats) = encode_file(&path, &AlgorithmRegistry::with_defaults())?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method, method::STORE);
        assert_eq!(stats, EncodeStats::default());
        Ok(())
    }

    #[test]
    fn test_progress_called_in_input_order() -> std::result::Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let b = dir.path().join("b.txt");
        let a = dir.path().join("a.txt");
        fs::write(&b, "bbbb".repeat(100))?;
        fs::write(&a, "aaaa".repeat(100))?;

        let seen = std::sync::Mutex::new(Vec::new());
        let callback = |p: &FileProgress<'_>| {
            seen.lock().unwrap().push((p.relative_path.to_string(), p.files_processed));
        };
        let output = dir.path().join("out.dyn");
        let registry = AlgorithmRegistry::with_defaults();
        compress_files(&[b, a], &output, &registry, Some(&callback), FormatVersion::V1)?;

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, vec![("b.txt".to_string(), 1), ("a.txt".to_string(), 2)]);
        Ok(())
    }
}
