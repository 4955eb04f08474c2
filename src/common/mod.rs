//! Common types and path helpers shared by the encoders and the extractor.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{ArchiverError, Result};
use crate::preprocess::PreprocessFlags;

/// One compressed chunk as stored in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub index: usize,
    pub method: String,
    pub data: Vec<u8>,
    pub flags: PreprocessFlags,
}

impl ChunkRecord {
    pub fn view(&self) -> ChunkRef<'_> {
        ChunkRef {
            index: self.index,
            method: &self.method,
            flags: self.flags,
            data: &self.data,
        }
    }
}

/// A chunk borrowed from wherever its bytes live, ready to be written.
#[derive(Debug, Clone, Copy)]
pub struct ChunkRef<'a> {
    pub index: usize,
    pub method: &'a str,
    pub flags: PreprocessFlags,
    pub data: &'a [u8],
}

/// All chunks of one input file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileResult {
    /// Path relative to the archive base, `/`-separated.
    pub relative_path: String,
    pub original_size: u64,
    pub chunks: Vec<ChunkRecord>,
}

impl FileResult {
    pub fn new(relative_path: impl Into<String>, original_size: u64) -> Self {
        Self {
            relative_path: relative_path.into(),
            original_size,
            chunks: Vec::new(),
        }
    }

    /// Workers finish chunks out of order; the writer needs index order.
    pub fn sort_chunks(&mut self) {
        self.chunks.sort_by_key(|c| c.index);
    }

    /// Total stored (post-compression) bytes.
    pub fn stored_size(&self) -> u64 {
        self.chunks.iter().map(|c| c.data.len() as u64).sum()
    }
}

/// Inputs after directory expansion.
#[derive(Debug, Default, Clone)]
pub struct ExpandedInputs {
    /// Absolute file paths in argument order; directory contents sorted by name.
    pub files: Vec<PathBuf>,
    /// Absolute directory inputs, scanned for empty directories.
    pub directories: Vec<PathBuf>,
    /// Absolute form of every input, used to derive the base directory.
    pub roots: Vec<PathBuf>,
    /// Inputs that do not exist or could not be walked.
    pub missing: Vec<PathBuf>,
}

/// Canonical absolute path, or the path joined onto the working directory
/// when canonicalization fails (e.g. the path does not exist).
pub fn absolutize(path: &Path) -> PathBuf {
    match fs::canonicalize(path) {
        Ok(p) => p,
        Err(_) if path.is_absolute() => path.to_path_buf(),
        Err(_) => std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf()),
    }
}

/// Expands directory inputs recursively, keeping argument order.
pub fn expand_inputs(inputs: &[PathBuf]) -> ExpandedInputs {
    let mut expanded = ExpandedInputs::default();
    for input in inputs {
        let abs = absolutize(input);
        if abs.is_file() {
            expanded.files.push(abs.clone());
        } else if abs.is_dir() {
            for entry in WalkDir::new(&abs).sort_by_file_name() {
                match entry {
                    Ok(e) if e.file_type().is_file() => expanded.files.push(e.into_path()),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(
                            input = %abs.display(),
                            error = %e,
                            "skipping unreadable entry"
                        );
                        if let Some(p) = e.path() {
                            expanded.missing.push(p.to_path_buf());
                        }
                    }
                }
            }
            expanded.directories.push(abs.clone());
        } else {
            tracing::warn!(input = %input.display(), "input does not exist");
            expanded.missing.push(input.clone());
            continue;
        }
        expanded.roots.push(abs);
    }
    expanded
}

fn is_separator(c: char) -> bool {
    c == '/' || c == std::path::MAIN_SEPARATOR
}

/// Filesystem root of an absolute path (`/`, or the drive on Windows).
fn root_of(path: &Path) -> PathBuf {
    path.ancestors()
        .last()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(std::path::MAIN_SEPARATOR.to_string()))
}

/// The directory every relative path in an archive is computed against.
///
/// Takes the longest case-insensitive common prefix of the absolute paths,
/// backs off to the last separator before the mismatch, and falls back
/// to the filesystem root when nothing is shared. `None` for no input.
pub fn common_base_dir(paths: &[PathBuf]) -> Option<PathBuf> {
    let first = paths.first()?;
    let first_chars: Vec<char> = first.to_string_lossy().chars().collect();
    let mut len = first_chars.len();

    for other in &paths[1..] {
        let shared = first_chars
            .iter()
            .zip(other.to_string_lossy().chars())
            .take(len)
            .take_while(|(a, b)| a.to_lowercase().eq(b.to_lowercase()))
            .count();
        len = len.min(shared);
    }

    let separator = first_chars[..len].iter().rposition(|&c| is_separator(c));
    match separator {
        Some(sep) if sep > 0 => {
            let prefix: String = first_chars[..sep].iter().collect();
            let prefix = PathBuf::from(prefix);
            // "C:" alone is drive-relative; use the root form instead.
            if prefix.parent().is_none() || prefix.components().count() <= 1 {
                Some(root_of(first))
            } else {
                Some(prefix)
            }
        }
        _ => Some(root_of(first)),
    }
}

/// Replaces backslashes with `/`, drops a leading `./` and collapses `//`.
pub fn normalize_path(path: &str) -> String {
    let s = path.replace('\\', "/");
    let trimmed = s.strip_prefix("./").unwrap_or(&s);
    let mut out = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}

/// `path` relative to `base` as a `/`-separated archive path.
///
/// Falls back to a case-insensitive prefix cut, then to the bare file name.
pub fn archive_relative_path(base: &Path, path: &Path) -> String {
    if let Ok(rel) = path.strip_prefix(base) {
        return normalize_path(&rel.to_string_lossy());
    }
    let base_s = base.to_string_lossy();
    let path_s = path.to_string_lossy();
    let base_len = base_s.chars().count();
    let prefix_matches = base_s
        .chars()
        .zip(path_s.chars())
        .take_while(|(a, b)| a.to_lowercase().eq(b.to_lowercase()))
        .count()
        == base_len
        && path_s.chars().nth(base_len).map_or(false, is_separator);
    if prefix_matches {
        let rest: String = path_s.chars().skip(base_len).collect();
        let rest = normalize_path(&rest);
        let rest = rest.trim_start_matches('/');
        if !rest.is_empty() {
            return rest.to_string();
        }
    }
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| normalize_path(&path_s))
}

/// Directories under (and including) each root that have no entries at all,
/// as archive-relative paths.
pub fn find_empty_dirs(roots: &[PathBuf], base: &Path) -> BTreeSet<String> {
    let mut empty = BTreeSet::new();
    for root in roots {
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_dir() {
                continue;
            }
            let is_empty = fs::read_dir(entry.path())
                .map(|mut rd| rd.next().is_none())
                .unwrap_or(false);
            if !is_empty {
                continue;
            }
            let rel = archive_relative_path(base, entry.path());
            if !rel.is_empty() {
                empty.insert(rel);
            }
        }
    }
    empty
}

/// Maps an archive path onto `root`, rejecting anything that could escape it:
/// absolute paths, drive prefixes and `..` components.
pub fn safe_join(root: &Path, archive_path: &str) -> Result<PathBuf> {
    let normalized = normalize_path(archive_path);
    if normalized.is_empty() || normalized.starts_with('/') {
        return Err(ArchiverError::UnsafePath(archive_path.to_string()));
    }
    let mut out = root.to_path_buf();
    for part in normalized.split('/') {
        match Path::new(part).components().next() {
            _ if part.is_empty() || part == "." => continue,
            Some(Component::Normal(_)) if Path::new(part).components().count() == 1 => {
                out.push(part)
            }
            _ => return Err(ArchiverError::UnsafePath(archive_path.to_string())),
        }
    }
    if out == root {
        return Err(ArchiverError::UnsafePath(archive_path.to_string()));
    }
    Ok(out)
}
