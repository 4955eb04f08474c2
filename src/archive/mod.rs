//! # Archive Container Format
//!
//! A single-pass, self-describing container. All integers are little-endian
//! `i32`; strings are UTF-8 with a 7-bit variable-length byte count.
//!
//! ```text
//! header        v4: "DYNA" 0x04 | v1-v3: one version byte | unversioned: nothing
//! file_count    i32 (patched in place once all files are written)
//! per file      path:str  chunk_count:i32
//!   per chunk   method:str  [flags:u8 (v3+)]  len:i32  data[len]
//! empty dirs    (v2+) count:i32  path:str*
//! ```
//!
//! Archives before v4 have no magic. Their first byte is either a version
//! byte or the low byte of an unversioned file count. A first byte up to
//! [`MAX_VERSION_BYTE`] is always consumed as a version: 1, 2 and 3 are read,
//! the rest are rejected as unsupported. Anything larger starts a file count.
//! The writer refuses unversioned archives whose count would collide.

pub mod binary;

use std::collections::BTreeSet;
use std::fmt;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::{ChunkRecord, ChunkRef, FileResult};
use crate::error::{ArchiverError, Result};
use crate::preprocess::PreprocessFlags;
use binary::{read_len, read_string, read_u8, write_i32, write_len, write_string, write_u8};

/// Magic tag opening every current-format archive.
pub const MAGIC: &[u8; 4] = b"DYNA";

/// Largest leading byte that is read as a version marker.
pub const MAX_VERSION_BYTE: u8 = 10;

/// On-disk layout generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatVersion {
    /// No header at all; the stream starts with the file count.
    Unversioned,
    V1,
    /// Adds the empty-directory table.
    V2,
    /// Adds a preprocessing flags byte per chunk.
    V3,
    /// Magic-tagged header; same body as v3.
    V4,
}

impl FormatVersion {
    pub const CURRENT: FormatVersion = FormatVersion::V4;

    /// The numeric tag written to disk, if any.
    pub fn tag(self) -> Option<u8> {
        match self {
            FormatVersion::Unversioned => None,
            FormatVersion::V1 => Some(1),
            FormatVersion::V2 => Some(2),
            FormatVersion::V3 => Some(3),
            FormatVersion::V4 => Some(4),
        }
    }

    pub fn has_flags(self) -> bool {
        self >= FormatVersion::V3
    }

    pub fn has_empty_dirs(self) -> bool {
        self >= FormatVersion::V2
    }

    /// Byte offset of the file count field.
    pub fn count_offset(self) -> u64 {
        match self {
            FormatVersion::Unversioned => 0,
            FormatVersion::V1 | FormatVersion::V2 | FormatVersion::V3 => 1,
            FormatVersion::V4 => MAGIC.len() as u64 + 1,
        }
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        FormatVersion::CURRENT
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag() {
            Some(tag) => write!(f, "v{tag}"),
            None => f.write_str("unversioned"),
        }
    }
}

impl FromStr for FormatVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unversioned" | "legacy" | "v0" | "0" => Ok(FormatVersion::Unversioned),
            "v1" | "1" => Ok(FormatVersion::V1),
            "v2" | "2" => Ok(FormatVersion::V2),
            "v3" | "3" => Ok(FormatVersion::V3),
            "v4" | "4" | "current" => Ok(FormatVersion::V4),
            other => Err(format!(
                "unknown archive format '{other}' (expected unversioned, v1, v2, v3 or v4)"
            )),
        }
    }
}

/// In-memory model of a whole archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    pub version: FormatVersion,
    pub files: Vec<FileResult>,
    pub empty_directories: BTreeSet<String>,
}

/// Streams files into a container, patching the file count on [`finish`](Self::finish).
pub struct ArchiveWriter<W: Write + Seek> {
    inner: W,
    version: FormatVersion,
    files_written: usize,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    /// Writes the header and a zero file-count placeholder.
    pub fn new(mut inner: W, version: FormatVersion) -> Result<Self> {
        let start = inner.stream_position()?;
        if start != 0 {
            return Err(ArchiverError::Corrupt(format!(
                "archive writer must start at offset 0, not {start}"
            )));
        }
        match version {
            FormatVersion::Unversioned => {}
            FormatVersion::V4 => {
                inner.write_all(MAGIC)?;
                write_u8(&mut inner, 4)?;
            }
            other => {
                if let Some(tag) = other.tag() {
                    write_u8(&mut inner, tag)?;
                }
            }
        }
        write_i32(&mut inner, 0)?;
        Ok(Self {
            inner,
            version,
            files_written: 0,
        })
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    pub fn files_written(&self) -> usize {
        self.files_written
    }

    /// Appends one file. Chunks are written in the order given; callers sort
    /// by index first.
    pub fn write_file(&mut self, file: &FileResult) -> Result<()> {
        self.write_chunks(&file.relative_path, file.chunks.iter().map(ChunkRecord::view))
    }

    /// Appends one file from borrowed chunks, in the order given.
    pub fn write_chunks<'c, I>(&mut self, relative_path: &str, chunks: I) -> Result<()>
    where
        I: ExactSizeIterator<Item = ChunkRef<'c>>,
    {
        write_string(&mut self.inner, relative_path)?;
        write_len(&mut self.inner, chunks.len())?;
        for chunk in chunks {
            self.write_chunk(relative_path, chunk)?;
        }
        self.files_written += 1;
        Ok(())
    }

    fn write_chunk(&mut self, path: &str, chunk: ChunkRef<'_>) -> Result<()> {
        write_string(&mut self.inner, chunk.method)?;
        if self.version.has_flags() {
            write_u8(&mut self.inner, chunk.flags.bits())?;
        } else if !chunk.flags.is_empty() {
            return Err(ArchiverError::Corrupt(format!(
                "chunk {} of '{}' is preprocessed but format {} cannot record flags",
                chunk.index, path, self.version
            )));
        }
        write_len(&mut self.inner, chunk.data.len())?;
        self.inner.write_all(chunk.data)?;
        Ok(())
    }

    /// Writes the empty-directory table (v2+), patches the file count and
    /// returns the underlying writer positioned at the end.
    pub fn finish(mut self, empty_directories: &BTreeSet<String>) -> Result<W> {
        if self.version.has_empty_dirs() {
            write_len(&mut self.inner, empty_directories.len())?;
            for dir in empty_directories {
                write_string(&mut self.inner, dir)?;
            }
        } else if !empty_directories.is_empty() {
            tracing::warn!(
                count = empty_directories.len(),
                format = %self.version,
                "format cannot record empty directories, dropping them"
            );
        }

        if self.version == FormatVersion::Unversioned
            && (self.files_written as u8) <= MAX_VERSION_BYTE
        {
            return Err(ArchiverError::Corrupt(format!(
                "unversioned archive cannot hold {} files: the first byte would read as a version",
                self.files_written
            )));
        }

        let end = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(self.version.count_offset()))?;
        write_len(&mut self.inner, self.files_written)?;
        self.inner.seek(SeekFrom::Start(end))?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Streaming reader over a container of any supported version.
pub struct ArchiveReader<R: Read + Seek> {
    inner: R,
    version: FormatVersion,
    file_count: usize,
    files_read: usize,
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Detects the version and reads the file count.
    pub fn new(mut inner: R) -> Result<Self> {
        let version = detect_version(&mut inner)?;
        let file_count = read_len(&mut inner, "file count")?;
        tracing::debug!(%version, file_count, "opened archive");
        Ok(Self {
            inner,
            version,
            file_count,
            files_read: 0,
        })
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }

    /// Reads the next file, or `None` once all declared files are consumed.
    ///
    /// A structural error leaves the reader in an undefined position; callers
    /// must stop reading after the first `Err`.
    pub fn next_file(&mut self) -> Option<Result<FileResult>> {
        if self.files_read >= self.file_count {
            return None;
        }
        self.files_read += 1;
        Some(self.read_file())
    }

    fn read_file(&mut self) -> Result<FileResult> {
        let relative_path = read_string(&mut self.inner, "file path")?;
        let chunk_count = read_len(&mut self.inner, "chunk count")?;
        let mut file = FileResult::new(relative_path, 0);
        file.chunks.reserve(chunk_count.min(1024));

        for index in 0..chunk_count {
            let method = read_string(&mut self.inner, "method name")?;
            let flags = if self.version.has_flags() {
                PreprocessFlags::from_bits(read_u8(&mut self.inner, "chunk flags")?)
            } else {
                PreprocessFlags::NONE
            };
            let expected = read_len(&mut self.inner, "chunk length")?;
            let mut data = Vec::with_capacity(expected.min(16 * 1024 * 1024));
            (&mut self.inner).take(expected as u64).read_to_end(&mut data)?;
            if data.len() != expected {
                return Err(ArchiverError::ChunkTruncated {
                    path: file.relative_path,
                    chunk: index,
                    expected,
                    actual: data.len(),
                });
            }
            file.chunks.push(ChunkRecord {
                index,
                method,
                data,
                flags,
            });
        }
        Ok(file)
    }

    /// Skips any unread files and reads the empty-directory table.
    pub fn read_empty_dirs(&mut self) -> Result<BTreeSet<String>> {
        while let Some(file) = self.next_file() {
            file?;
        }
        let mut dirs = BTreeSet::new();
        if !self.version.has_empty_dirs() {
            return Ok(dirs);
        }
        let count = read_len(&mut self.inner, "empty directory count")?;
        for _ in 0..count {
            dirs.insert(read_string(&mut self.inner, "empty directory path")?);
        }
        Ok(dirs)
    }
}

fn detect_version<R: Read + Seek>(inner: &mut R) -> Result<FormatVersion> {
    let start = inner.stream_position()?;
    let mut head = [0u8; 5];
    let mut filled = 0;
    while filled < head.len() {
        let n = inner.read(&mut head[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    if filled == 0 {
        return Err(ArchiverError::Corrupt("archive is empty".into()));
    }

    if filled == head.len() && &head[..4] == MAGIC {
        return match head[4] {
            4 => Ok(FormatVersion::V4),
            other => Err(ArchiverError::UnsupportedVersion(other)),
        };
    }

    let version = match head[0] {
        1 => FormatVersion::V1,
        2 => FormatVersion::V2,
        3 => FormatVersion::V3,
        tag if tag <= MAX_VERSION_BYTE => return Err(ArchiverError::UnsupportedVersion(tag)),
        // Too large for a version byte: the stream starts with the count.
        _ => {
            inner.seek(SeekFrom::Start(start))?;
            return Ok(FormatVersion::Unversioned);
        }
    };
    inner.seek(SeekFrom::Start(start + 1))?;
    Ok(version)
}

/// Serializes a whole archive to bytes.
pub fn encode_archive(archive: &Archive) -> Result<Vec<u8>> {
    let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()), archive.version)?;
    for file in &archive.files {
        writer.write_file(file)?;
    }
    Ok(writer.finish(&archive.empty_directories)?.into_inner())
}

/// Parses a whole archive from bytes. Original file sizes are not part of
/// the container, so `original_size` is left at zero.
pub fn decode_archive(bytes: &[u8]) -> Result<Archive> {
    let mut reader = ArchiveReader::new(Cursor::new(bytes))?;
    let mut files = Vec::with_capacity(reader.file_count().min(4096));
    while let Some(file) = reader.next_file() {
        files.push(file?);
    }
    let empty_directories = reader.read_empty_dirs()?;
    let trailing = bytes.len() as u64 - reader.inner.position();
    if trailing != 0 {
        tracing::debug!(trailing, "ignoring trailing bytes after archive");
    }
    Ok(Archive {
        version: reader.version(),
        files,
        empty_directories,
    })
}
