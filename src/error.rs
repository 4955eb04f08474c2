use std::path::PathBuf;

use thiserror::Error;

use crate::codecs::CodecError;

/// The primary error type for all operations in the `dynarch` crate.
#[derive(Debug, Error)]
pub enum ArchiverError {
    /// An I/O error occurred, typically while reading or writing a file.
    /// Includes the path where the error happened (empty when unknown).
    #[error("I/O error on path '{}': {source}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// The archive stream is structurally invalid (bad counts, bad strings, ...).
    #[error("corrupt archive: {0}")]
    Corrupt(String),

    /// The archive carries a format tag this build does not understand.
    #[error("unsupported archive format version {0}")]
    UnsupportedVersion(u8),

    /// A chunk declared more bytes than the archive actually holds.
    #[error("chunk {chunk} of '{path}' is truncated: expected {expected} bytes, found {actual}")]
    ChunkTruncated {
        path: String,
        chunk: usize,
        expected: usize,
        actual: usize,
    },

    /// The archive references a method name with no registered implementation.
    #[error("missing decompressor '{method}' for chunk {chunk} of '{path}'")]
    MissingDecompressor {
        path: String,
        chunk: usize,
        method: String,
    },

    /// A registered decompressor rejected the stored bytes.
    #[error("failed to decompress chunk {chunk} of '{path}' with {method}: {source}")]
    Decompress {
        path: String,
        chunk: usize,
        method: String,
        #[source]
        source: CodecError,
    },

    /// An archive entry would be written outside the extraction directory.
    #[error("refusing to extract unsafe path '{0}'")]
    UnsafePath(String),

    /// A configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A wrapper for any other error that doesn't fit the specific variants.
    #[error("an unexpected error occurred: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl ArchiverError {
    /// Attaches a path to an I/O error.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ArchiverError::Io {
            source,
            path: path.into(),
        }
    }
}

// Generic IO error conversion that doesn't require a path
impl From<std::io::Error> for ArchiverError {
    fn from(err: std::io::Error) -> Self {
        ArchiverError::Io {
            source: err,
            path: PathBuf::new(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ArchiverError>;
