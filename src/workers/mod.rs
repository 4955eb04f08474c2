//! # Concurrent Build Pipeline
//!
//! Turns an ordered list of inputs into one archive file.
//!
//! ```text
//! producer ──bounded queue──▶ worker × N ──▶ per-file slots ══barrier══▶ writer
//! ```
//!
//! The producer reads each file (memory-mapping large ones), splits it with
//! the logarithmic sizing policy and enqueues one job per chunk. Workers hash
//! every chunk with BLAKE3; identical content is compressed exactly once per
//! build and every occurrence shares the one cached result. The writer runs
//! on the calling thread only after the producer and every worker have
//! finished, so file and chunk counts are final before the first byte is
//! written.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;

use crossbeam_channel::{bounded, Sender};
use dashmap::DashMap;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::analysis::{analyze, is_image_data};
use crate::archive::{ArchiveWriter, FormatVersion};
use crate::chunker::ChunkSizing;
use crate::codecs::{compress_guarded, method, AlgorithmRegistry};
use crate::common::{
    archive_relative_path, common_base_dir, expand_inputs, find_empty_dirs, ChunkRef,
};
use crate::decision::picker;
use crate::error::{ArchiverError, Result};
use crate::preprocess::{self, PreprocessFlags, PreprocessOptions};
use crate::progress::{BuildSummary, FileProgress, PipelineMetrics, ProgressCallback};

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;

/// Tuning knobs for [`build_archive`]. Every field has a default, so a JSON
/// config file only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker threads; `0` means one per logical CPU.
    pub max_degree_of_parallelism: usize,
    /// Chunk jobs allowed in flight before the producer blocks.
    pub producer_queue_capacity: usize,
    pub enable_rle_preprocessing: bool,
    pub enable_delta_preprocessing: bool,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    /// Files at least this large are memory-mapped instead of read.
    pub memory_map_threshold: u64,
    pub format: FormatVersion,
    /// Try every registered algorithm per chunk and keep the smallest.
    pub exhaustive_search: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_degree_of_parallelism: num_cpus::get(),
            producer_queue_capacity: 1024,
            enable_rle_preprocessing: false,
            enable_delta_preprocessing: false,
            min_chunk_size: 64 * KIB,
            max_chunk_size: 2 * MIB,
            memory_map_threshold: 64 * MIB as u64,
            format: FormatVersion::CURRENT,
            exhaustive_search: false,
        }
    }
}

impl PipelineConfig {
    /// Loads a JSON config. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| ArchiverError::io(e, path))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Repairs values the pipeline cannot run with.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.max_degree_of_parallelism == 0 {
            self.max_degree_of_parallelism = num_cpus::get().max(1);
        }
        if self.producer_queue_capacity == 0 {
            self.producer_queue_capacity = defaults.producer_queue_capacity;
        }
        if self.min_chunk_size == 0 {
            self.min_chunk_size = defaults.min_chunk_size;
        }
        if self.max_chunk_size < self.min_chunk_size {
            self.max_chunk_size = self.min_chunk_size;
        }
        if self.preprocessing().any() && !self.format.has_flags() {
            tracing::warn!(
                format = %self.format,
                "format has no chunk flags, preprocessing disabled"
            );
            self.enable_rle_preprocessing = false;
            self.enable_delta_preprocessing = false;
        }
        self
    }

    pub fn preprocessing(&self) -> PreprocessOptions {
        PreprocessOptions {
            rle: self.enable_rle_preprocessing,
            delta: self.enable_delta_preprocessing,
        }
    }

    pub fn chunk_sizing(&self) -> ChunkSizing {
        ChunkSizing::Logarithmic {
            min: self.min_chunk_size,
            max: self.max_chunk_size,
        }
    }
}

/// Raw bytes of one chunk, either owned or a window into a mapped file.
enum ChunkData {
    Owned(Vec<u8>),
    Mapped { map: Arc<Mmap>, start: usize, end: usize },
}

impl ChunkData {
    fn as_slice(&self) -> &[u8] {
        match self {
            ChunkData::Owned(buf) => buf,
            ChunkData::Mapped { map, start, end } => &map[*start..*end],
        }
    }
}

struct ChunkJob {
    file_index: usize,
    chunk_index: usize,
    path: Arc<Path>,
    is_executable: bool,
    data: ChunkData,
}

/// One file's chunks as workers finish them, plus the number of chunks the
/// producer sent for it.
struct FileSlot {
    relative_path: String,
    original_size: u64,
    chunks: Vec<(usize, Arc<CachedChunk>)>,
    expected_chunks: usize,
}

impl FileSlot {
    fn stored_size(&self) -> u64 {
        self.chunks.iter().map(|(_, c)| c.data.len() as u64).sum()
    }
}

type Slot = Mutex<Option<FileSlot>>;

/// Executable chunks are stored regardless of content, so the same bytes can
/// have two different outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    digest: [u8; 32],
    is_executable: bool,
}

#[derive(Debug)]
struct CachedChunk {
    method: String,
    data: Vec<u8>,
    flags: PreprocessFlags,
}

impl CachedChunk {
    fn stored(raw: &[u8]) -> Self {
        Self {
            method: method::STORE.to_string(),
            data: raw.to_vec(),
            flags: PreprocessFlags::NONE,
        }
    }
}

type ChunkCache = DashMap<CacheKey, Arc<OnceLock<Arc<CachedChunk>>>>;

/// Everything a worker reads or appends to.
struct WorkerContext<'a> {
    registry: &'a AlgorithmRegistry,
    config: &'a PipelineConfig,
    preprocessing: PreprocessOptions,
    cache: &'a ChunkCache,
    metrics: &'a PipelineMetrics,
    slots: &'a [Slot],
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builds an archive at `output` from `inputs`.
///
/// Directory inputs are expanded recursively; inputs that cannot be read are
/// skipped and listed in the summary. `progress` is called once per file, in
/// input order, after the file is written. The archive is assembled in a
/// temporary file next to `output` and only moved into place on success.
pub fn build_archive(
    inputs: &[PathBuf],
    output: &Path,
    registry: &AlgorithmRegistry,
    progress: Option<&ProgressCallback>,
    config: &PipelineConfig,
) -> Result<BuildSummary> {
    let config = config.clone().normalized();
    let expanded = expand_inputs(inputs);
    let base = common_base_dir(&expanded.roots).unwrap_or_default();
    let empty_dirs = find_empty_dirs(&expanded.directories, &base);
    let num_workers = config.max_degree_of_parallelism;

    tracing::info!(
        files = expanded.files.len(),
        workers = num_workers,
        format = %config.format,
        "building archive"
    );

    let slots: Vec<Slot> = expanded.files.iter().map(|_| Mutex::new(None)).collect();
    let cache = ChunkCache::new();
    let metrics = PipelineMetrics::new();
    let ctx = WorkerContext {
        registry,
        config: &config,
        preprocessing: config.preprocessing(),
        cache: &cache,
        metrics: &metrics,
        slots: &slots,
    };

    let scope_result = thread::scope(|s| {
        let (job_sender, job_receiver) = bounded::<ChunkJob>(config.producer_queue_capacity);

        // --- Worker Threads ---
        let workers: Vec<_> = (0..num_workers)
            .map(|_| {
                let job_receiver = job_receiver.clone();
                let ctx = &ctx;
                s.spawn(move || {
                    for job in job_receiver {
                        process_job(job, ctx);
                    }
                })
            })
            .collect();
        drop(job_receiver);

        // --- Producer Thread ---
        let files = &expanded.files;
        let base = base.as_path();
        let slots = &slots;
        let config = &config;
        let producer = s.spawn(move || produce(files, base, slots, job_sender, config));

        let skipped = producer
            .join()
            .map_err(|_| ArchiverError::Other("The producer thread panicked".into()))?;
        for worker in workers {
            worker
                .join()
                .map_err(|_| ArchiverError::Other("A worker thread panicked".into()))?;
        }
        Ok::<_, ArchiverError>(skipped)
    });

    let mut skipped = expanded.missing;
    skipped.extend(scope_result?);
    // The slots now hold the only references to compressed chunks.
    drop(cache);

    // --- Writer (calling thread, after the barrier) ---
    let (files_written, bytes_out) =
        write_archive(output, config.format, slots, &empty_dirs, progress)?;

    let summary = BuildSummary {
        files_written,
        bytes_in: metrics.bytes_in(),
        bytes_out,
        chunks: metrics.chunks(),
        dedup_hits: metrics.dedup_hits(),
        store_fallbacks: metrics.store_fallbacks(),
        compress_calls: metrics.compress_calls(),
        skipped,
    };
    tracing::info!(
        files = summary.files_written,
        chunks = summary.chunks,
        dedup_hits = summary.dedup_hits,
        bytes_in = summary.bytes_in,
        bytes_out = summary.bytes_out,
        output = %output.display(),
        "archive written"
    );
    Ok(summary)
}

/// Enqueues every file's chunks in order. Returns the files that could not be read.
fn produce(
    files: &[PathBuf],
    base: &Path,
    slots: &[Slot],
    jobs: Sender<ChunkJob>,
    config: &PipelineConfig,
) -> Vec<PathBuf> {
    let mut skipped = Vec::new();
    for (file_index, path) in files.iter().enumerate() {
        match enqueue_file(file_index, path, base, slots, &jobs, config) {
            Ok(true) => {}
            // Every worker is gone; nothing left to feed.
            Ok(false) => break,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable input");
                *lock(&slots[file_index]) = None;
                skipped.push(path.clone());
            }
        }
    }
    skipped
}

/// Splits one file into jobs. `Ok(false)` when the queue has been closed.
fn enqueue_file(
    file_index: usize,
    path: &Path,
    base: &Path,
    slots: &[Slot],
    jobs: &Sender<ChunkJob>,
    config: &PipelineConfig,
) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let relative_path = archive_relative_path(base, path);
    *lock(&slots[file_index]) = Some(FileSlot {
        relative_path,
        original_size: size,
        chunks: Vec::new(),
        expected_chunks: 0,
    });

    let chunk_size = config.chunk_sizing().chunk_size(size);
    let is_executable = picker::is_executable_path(path);
    let shared_path: Arc<Path> = Arc::from(path);
    let mut chunk_index = 0usize;
    let mut bytes_read = 0u64;
    let mut send = |data: ChunkData| {
        bytes_read += data.as_slice().len() as u64;
        let job = ChunkJob {
            file_index,
            chunk_index,
            path: Arc::clone(&shared_path),
            is_executable,
            data,
        };
        chunk_index += 1;
        jobs.send(job).is_ok()
    };

    if size > 0 && size >= config.memory_map_threshold {
        // SAFETY: the map is read-only; inputs are assumed not to be truncated mid-build.
        let map = Arc::new(unsafe { Mmap::map(&file)? });
        let len = map.len();
        let step = if is_image_data(&map) { len } else { chunk_size.max(1) };
        let mut start = 0;
        while start < len {
            let end = (start + step).min(len);
            let data = ChunkData::Mapped {
                map: Arc::clone(&map),
                start,
                end,
            };
            if !send(data) {
                return Ok(false);
            }
            start = end;
        }
    } else {
        let mut buf = read_up_to(&mut file, chunk_size)?;
        if is_image_data(&buf) {
            file.read_to_end(&mut buf)?;
        }
        while !buf.is_empty() {
            if !send(ChunkData::Owned(buf)) {
                return Ok(false);
            }
            buf = read_up_to(&mut file, chunk_size)?;
        }
    }

    drop(send);
    if let Some(slot) = lock(&slots[file_index]).as_mut() {
        slot.expected_chunks = chunk_index;
        slot.original_size = bytes_read;
    }
    tracing::debug!(path = %path.display(), chunks = chunk_index, chunk_size, "file enqueued");
    Ok(true)
}

fn read_up_to(file: &mut File, limit: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(limit);
    file.by_ref().take(limit as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

fn process_job(job: ChunkJob, ctx: &WorkerContext<'_>) {
    let raw = job.data.as_slice();
    ctx.metrics.record_chunk(raw.len());

    let key = CacheKey {
        digest: *blake3::hash(raw).as_bytes(),
        is_executable: job.is_executable,
    };
    // Clone the cell out so the shard lock is released before compressing.
    let cell = Arc::clone(ctx.cache.entry(key).or_default().value());
    let mut computed = false;
    let cached = cell.get_or_init(|| {
        computed = true;
        Arc::new(compress_chunk(raw, &job.path, job.is_executable, ctx))
    });
    if !computed {
        ctx.metrics.record_dedup_hit();
        tracing::trace!(path = %job.path.display(), chunk = job.chunk_index, "dedup hit");
    }

    if let Some(slot) = lock(&ctx.slots[job.file_index]).as_mut() {
        slot.chunks.push((job.chunk_index, Arc::clone(cached)));
    }
}

/// Picks, preprocesses and compresses one chunk, storing it whenever the
/// result would not be smaller than the raw bytes.
fn compress_chunk(
    raw: &[u8],
    path: &Path,
    is_executable: bool,
    ctx: &WorkerContext<'_>,
) -> CachedChunk {
    if is_executable {
        return CachedChunk::stored(raw);
    }

    if ctx.config.exhaustive_search {
        ctx.metrics.record_compress_call();
        let (method, data) = ctx.registry.compress_smallest(raw);
        if method == method::STORE {
            ctx.metrics.record_store_fallback();
        }
        return CachedChunk {
            method,
            data,
            flags: PreprocessFlags::NONE,
        };
    }

    let profile = analyze(raw);
    let algo = picker::select_best(&profile, path, ctx.registry);
    if algo.name() == method::STORE {
        return CachedChunk::stored(raw);
    }

    let (input, flags): (Cow<'_, [u8]>, PreprocessFlags) =
        if ctx.preprocessing.any() && algo.name() != method::LOSSLESS_IMAGE {
            let (data, flags) = preprocess::apply(raw, ctx.preprocessing);
            (Cow::Owned(data), flags)
        } else {
            (Cow::Borrowed(raw), PreprocessFlags::NONE)
        };

    ctx.metrics.record_compress_call();
    match compress_guarded(algo.as_ref(), &input) {
        Some(data) if data.len() < raw.len() => {
            tracing::trace!(
                method = algo.name(),
                raw = raw.len(),
                stored = data.len(),
                "chunk compressed"
            );
            CachedChunk {
                method: algo.name().to_string(),
                data,
                flags,
            }
        }
        _ => {
            ctx.metrics.record_store_fallback();
            tracing::debug!(
                method = algo.name(),
                path = %path.display(),
                "no savings, storing chunk"
            );
            CachedChunk::stored(raw)
        }
    }
}

/// Serializes every readable file in input order into a temp file, then
/// moves it over `output`. Returns files written and stored payload bytes.
fn write_archive(
    output: &Path,
    format: FormatVersion,
    slots: Vec<Slot>,
    empty_dirs: &BTreeSet<String>,
    progress: Option<&ProgressCallback>,
) -> Result<(usize, u64)> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let temp = NamedTempFile::new_in(parent).map_err(|e| ArchiverError::io(e, parent))?;
    let mut writer = ArchiveWriter::new(BufWriter::new(temp), format)?;

    let mut files_written = 0usize;
    let mut bytes_out = 0u64;
    for slot in slots {
        let Some(mut file) = slot.into_inner().unwrap_or_else(PoisonError::into_inner) else {
            continue;
        };
        if file.chunks.len() != file.expected_chunks {
            return Err(ArchiverError::Other(
                format!(
                    "'{}' finished with {} of {} chunks",
                    file.relative_path,
                    file.chunks.len(),
                    file.expected_chunks
                )
                .into(),
            ));
        }
        file.chunks.sort_by_key(|(index, _)| *index);
        let chunks = file.chunks.iter().map(|(index, cached)| ChunkRef {
            index: *index,
            method: &cached.method,
            flags: cached.flags,
            data: &cached.data,
        });
        writer.write_chunks(&file.relative_path, chunks)?;

        files_written += 1;
        let stored = file.stored_size();
        bytes_out += stored;
        if let Some(callback) = progress {
            callback(&FileProgress {
                relative_path: &file.relative_path,
                original_size: file.original_size,
                compressed_size: stored,
                files_processed: files_written,
            });
        }
    }

    let buffered = writer.finish(empty_dirs)?;
    let temp = buffered
        .into_inner()
        .map_err(|e| ArchiverError::io(e.into_error(), output))?;
    temp.persist(output).map_err(|e| ArchiverError::io(e.error, output))?;
    Ok((files_written, bytes_out))
}
