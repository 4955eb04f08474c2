//! # Decision Engine
//!
//! Chooses, per file, whether and how to compress before every byte is read.
//! The policy is an ordered list of checks; the first that applies wins:
//!
//! 1. Known compressed extension or compressed-stream magic -> `Store`.
//! 2. Sample entropy at or above [`ENTROPY_HIGH`] -> `Store`.
//! 3. Raster image extension -> `ImageSpecial` with `LosslessImage`.
//! 4. Best sampled candidate below a 0.99 ratio -> `FullCompress` for small
//!    files, `ChunkCompress` otherwise.
//! 5. An LZMA-family candidate below 0.995 -> same size split.
//! 6. Otherwise `Store`.
//!
//! Any I/O failure along the way degrades to `Store`, so one unreadable file
//! never aborts a batch.
//!
//! The per-chunk [`picker`] and the coarse [`strategy`] selector live in
//! submodules.

pub mod picker;
pub mod strategy;

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::analysis::classifier::{self, extension_of};
use crate::codecs::{method, Algorithm};
use crate::sampling::{choose_best_compressor_by_sample, test_compression_ratio};

/// Sample entropy at or above this is treated as incompressible.
pub const ENTROPY_HIGH: f64 = 7.2;
/// Files up to this size are compressed whole.
pub const SMALL_FILE_BYTES: u64 = 128 * 1024;
/// Size of each start/middle/end sample section.
pub const SAMPLE_SECTION: usize = 32 * 1024;

const REQUIRED_RATIO: f64 = 0.99;
const LZMA_FALLBACK_RATIO: f64 = 0.995;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "tga"];

/// Per-file compression strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionDecision {
    Store,
    FullCompress,
    ChunkCompress,
    ImageSpecial,
    /// Reserved. Treated as [`ChunkCompress`](Self::ChunkCompress).
    BinaryTransform,
}

impl CompressionDecision {
    /// Folds reserved variants onto the ones that are actually implemented.
    pub fn effective(self) -> Self {
        match self {
            CompressionDecision::BinaryTransform => CompressionDecision::ChunkCompress,
            other => other,
        }
    }
}

impl fmt::Display for CompressionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompressionDecision::Store => "store",
            CompressionDecision::FullCompress => "full-compress",
            CompressionDecision::ChunkCompress => "chunk-compress",
            CompressionDecision::ImageSpecial => "image-special",
            CompressionDecision::BinaryTransform => "binary-transform",
        };
        f.write_str(s)
    }
}

/// Outcome of [`decide`].
#[derive(Clone)]
pub struct Decision {
    pub kind: CompressionDecision,
    pub algorithm: Option<Algorithm>,
}

impl Decision {
    fn store() -> Self {
        Self {
            kind: CompressionDecision::Store,
            algorithm: None,
        }
    }

    fn sized(algorithm: Algorithm, file_len: u64) -> Self {
        let kind = if file_len <= SMALL_FILE_BYTES {
            CompressionDecision::FullCompress
        } else {
            CompressionDecision::ChunkCompress
        };
        Self {
            kind,
            algorithm: Some(algorithm),
        }
    }

    pub fn algorithm_name(&self) -> Option<&str> {
        self.algorithm.as_ref().map(|a| a.name())
    }
}

impl fmt::Debug for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decision")
            .field("kind", &self.kind)
            .field("algorithm", &self.algorithm_name())
            .finish()
    }
}

/// Decides how to handle `path` given the available `candidates`.
pub fn decide(path: &Path, candidates: &[Algorithm]) -> Decision {
    match try_decide(path, candidates) {
        Ok(decision) => {
            tracing::debug!(
                path = %path.display(),
                decision = %decision.kind,
                method = decision.algorithm_name().unwrap_or(method::STORE),
                "decided"
            );
            decision
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "decision failed, storing");
            Decision::store()
        }
    }
}

fn try_decide(path: &Path, candidates: &[Algorithm]) -> io::Result<Decision> {
    if classifier::is_probably_already_compressed(path)? {
        return Ok(Decision::store());
    }

    let sample = classifier::sample_file(path, SAMPLE_SECTION)?;
    if classifier::shannon_entropy(&sample) >= ENTROPY_HIGH {
        return Ok(Decision::store());
    }

    let file_len = fs::metadata(path)?.len();

    if extension_of(path).map_or(false, |ext| IMAGE_EXTENSIONS.contains(&ext.as_str())) {
        return Ok(Decision {
            kind: CompressionDecision::ImageSpecial,
            algorithm: candidates
                .iter()
                .find(|c| c.name() == method::LOSSLESS_IMAGE)
                .cloned(),
        });
    }

    if let Some(best) = choose_best_compressor_by_sample(&sample, candidates, REQUIRED_RATIO) {
        return Ok(Decision::sized(best, file_len));
    }

    let lzma = candidates.iter().find(|c| {
        let name = c.name().to_ascii_lowercase();
        name.contains("lzma") || name.contains("xz")
    });
    if let Some(lzma) = lzma {
        if test_compression_ratio(lzma.as_ref(), &sample) < LZMA_FALLBACK_RATIO {
            return Ok(Decision::sized(Arc::clone(lzma), file_len));
        }
    }

    Ok(Decision::store())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::AlgorithmRegistry;
    use rand::RngCore;
    use std::error::Error;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_random_bytes_are_stored() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let mut data = vec![0u8; 10 * 1024];
        rand::thread_rng().fill_bytes(&mut data);
        // Avoid accidental zlib/gzip/jpeg magic.
        data[0] = b'R';
        let path = write(&dir, "random.bin", &data);
        let registry = AlgorithmRegistry::with_defaults();
        let decision = decide(&path, registry.candidates());
        assert_eq!(decision.kind, CompressionDecision::Store);
        assert!(decision.algorithm.is_none());
        Ok(())
    }

    #[test]
    fn test_zero_file_is_compressed_whole() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = write(&dir, "zeros.bin", &vec![0u8; 10 * 1024]);
        let registry = AlgorithmRegistry::with_defaults();
        let decision = decide(&path, registry.candidates());
        assert_eq!(decision.kind, CompressionDecision::FullCompress);
        let algo = decision.algorithm.expect("an algorithm is chosen");
        let out = algo.compress(&vec![0u8; 10 * 1024])?;
        assert!(out.len() < 200, "{} produced {} bytes", algo.name(), out.len());
        Ok(())
    }

    #[test]
    fn test_large_compressible_file_is_chunked() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let text = b"the quick brown fox jumps over the lazy dog\n".repeat(5000);
        let path = write(&dir, "log.txt", &text);
        let registry = AlgorithmRegistry::with_defaults();
        assert_eq!(decide(&path, registry.candidates()).kind, CompressionDecision::ChunkCompress);
        Ok(())
    }

    #[test]
    fn test_compressed_extension_and_missing_file() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = write(&dir, "bundle.zip", &vec![0u8; 4096]);
        let registry = AlgorithmRegistry::with_defaults();
        assert_eq!(decide(&path, registry.candidates()).kind, CompressionDecision::Store);
        let missing = dir.path().join("nope.txt");
        assert_eq!(decide(&missing, registry.candidates()).kind, CompressionDecision::Store);
        Ok(())
    }

    #[test]
    fn test_webp_extension_is_image_special() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = write(&dir, "sprite.webp", &b"aaaaaaaabbbbbbbb".repeat(64));
        let registry = AlgorithmRegistry::with_defaults();
        let decision = decide(&path, registry.candidates());
        assert_eq!(decision.kind, CompressionDecision::ImageSpecial);
        assert_eq!(decision.algorithm_name(), Some(method::LOSSLESS_IMAGE));
        Ok(())
    }

    #[test]
    fn test_decision_is_deterministic() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = write(&dir, "notes.md", &b"# heading\nsome text here\n".repeat(100));
        let registry = AlgorithmRegistry::with_defaults();
        let first = decide(&path, registry.candidates());
        for _ in 0..3 {
            let again = decide(&path, registry.candidates());
            assert_eq!(again.kind, first.kind);
            assert_eq!(again.algorithm_name(), first.algorithm_name());
        }
        Ok(())
    }

    #[test]
    fn test_binary_transform_is_chunked() {
        assert_eq!(
            CompressionDecision::BinaryTransform.effective(),
            CompressionDecision::ChunkCompress
        );
    }
}
