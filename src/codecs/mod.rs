//! # Compression Algorithms
//!
//! Every algorithm `dynarch` can write into an archive sits behind the
//! [`CompressionAlgorithm`] trait. The method name an algorithm reports is
//! written verbatim into each chunk record, so names are part of the on-disk
//! format and must never change.
//!
//! The [`AlgorithmRegistry`] is the capability list handed to the decision
//! engine, the build pipeline and the extractor. Lookup by name is how a
//! reader finds the decompressor for a chunk.

mod general;
pub mod image;

pub use general::{BZip2, Brotli, Deflate, Gzip, Lzma, Store, Zip};
pub use image::{ExternalToolOptimizer, ImageFormat, ImageOptimizer, LosslessImage, NoopOptimizer};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;

/// Stable method names as they appear in the archive.
pub mod method {
    pub const STORE: &str = "STORE";
    pub const GZIP: &str = "Gzip";
    pub const DEFLATE: &str = "Deflate";
    pub const BROTLI: &str = "Brotli";
    pub const ZIP: &str = "Zip";
    pub const BZIP2: &str = "BZip2";
    pub const LZMA: &str = "LZMA";
    pub const LOSSLESS_IMAGE: &str = "LosslessImage";
    /// Older writers named the pass-through algorithm "None".
    pub const LEGACY_NONE: &str = "None";
}

/// Errors raised by a single algorithm.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("codec I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip container error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("invalid encoded data: {0}")]
    Invalid(String),
}

/// A whole-buffer compression algorithm.
///
/// `decompress(compress(x)) == x` must hold for every `x`, including the
/// empty slice. A `compress` error only means "no savings" to callers, who
/// fall back to [`Store`]. A `decompress` error means the archive is corrupt.
pub trait CompressionAlgorithm: Send + Sync {
    /// Unique, stable identifier written into the archive.
    fn name(&self) -> &str;
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError>;
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// Shared handle to an algorithm.
pub type Algorithm = Arc<dyn CompressionAlgorithm>;

/// Runs `algo.compress` and turns both errors and panics into `None`.
///
/// Every hot path goes through here so that one misbehaving codec can never
/// take down a worker thread.
pub fn compress_guarded(algo: &dyn CompressionAlgorithm, input: &[u8]) -> Option<Vec<u8>> {
    match catch_unwind(AssertUnwindSafe(|| algo.compress(input))) {
        Ok(Ok(out)) => Some(out),
        Ok(Err(e)) => {
            tracing::debug!(method = algo.name(), error = %e, "compression failed");
            None
        }
        Err(_) => {
            tracing::warn!(method = algo.name(), "compressor panicked");
            None
        }
    }
}

/// Capability list of all algorithms available to one build or extraction.
#[derive(Clone)]
pub struct AlgorithmRegistry {
    algorithms: Vec<Algorithm>,
}

impl AlgorithmRegistry {
    /// An empty registry. Store is always resolvable through [`get`](Self::get)
    /// even when it was never registered.
    pub fn empty() -> Self {
        Self { algorithms: Vec::new() }
    }

    /// The full default set with a no-op image optimizer.
    pub fn with_defaults() -> Self {
        Self::with_image_optimizer(Arc::new(NoopOptimizer))
    }

    /// The full default set, routing image chunks through `optimizer`.
    ///
    /// Registration order doubles as the candidate order used by the sampling
    /// tester, whose tie-break keeps the first minimum.
    pub fn with_image_optimizer(optimizer: Arc<dyn ImageOptimizer>) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(Lzma::default()));
        registry.register(Arc::new(Brotli::default()));
        registry.register(Arc::new(Gzip));
        registry.register(Arc::new(Deflate));
        registry.register(Arc::new(BZip2));
        registry.register(Arc::new(LosslessImage::new(optimizer)));
        registry.register(Arc::new(Store));
        registry.register(Arc::new(Zip));
        registry
    }

    /// Adds an algorithm, replacing any previous one with the same name in place.
    pub fn register(&mut self, algo: Algorithm) {
        match self.algorithms.iter().position(|a| a.name() == algo.name()) {
            Some(idx) => self.algorithms[idx] = algo,
            None => self.algorithms.push(algo),
        }
    }

    /// Looks up an algorithm by archive method name.
    pub fn get(&self, name: &str) -> Option<Algorithm> {
        if let Some(algo) = self.algorithms.iter().find(|a| a.name() == name) {
            return Some(Arc::clone(algo));
        }
        if name == method::STORE || name == method::LEGACY_NONE {
            return Some(Arc::new(Store));
        }
        None
    }

    /// The registered store algorithm, or a fresh one.
    pub fn store(&self) -> Algorithm {
        self.get(method::STORE).unwrap_or_else(|| Arc::new(Store))
    }

    /// All registered algorithms in registration order.
    pub fn candidates(&self) -> &[Algorithm] {
        &self.algorithms
    }

    pub fn names(&self) -> Vec<&str> {
        self.algorithms.iter().map(|a| a.name()).collect()
    }

    /// Compresses `data` with every candidate and keeps the smallest output.
    ///
    /// Returns `(STORE, data)` when nothing beats the input size.
    pub fn compress_smallest(&self, data: &[u8]) -> (String, Vec<u8>) {
        let mut best: Option<(String, Vec<u8>)> = None;
        for algo in &self.algorithms {
            if algo.name() == method::STORE {
                continue;
            }
            let Some(out) = compress_guarded(algo.as_ref(), data) else {
                continue;
            };
            let better = match &best {
                Some((_, current)) => out.len() < current.len(),
                None => true,
            };
            if better {
                best = Some((algo.name().to_string(), out));
            }
        }
        match best {
            Some((name, out)) if out.len() < data.len() => (name, out),
            _ => (method::STORE.to_string(), data.to_vec()),
        }
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("algorithms", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Exploding;

    impl CompressionAlgorithm for Exploding {
        fn name(&self) -> &str {
            "Exploding"
        }
        fn compress(&self, _input: &[u8]) -> Result<Vec<u8>, CodecError> {
            panic!("boom");
        }
        fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
            Ok(input.to_vec())
        }
    }

    #[test]
    fn test_defaults_register_every_method_once() {
        let registry = AlgorithmRegistry::with_defaults();
        let names = registry.names();
        for expected in [
            method::LZMA,
            method::BROTLI,
            method::GZIP,
            method::DEFLATE,
            method::BZIP2,
            method::LOSSLESS_IMAGE,
            method::STORE,
            method::ZIP,
        ] {
            assert_eq!(names.iter().filter(|n| **n == expected).count(), 1, "{expected}");
        }
    }

    #[test]
    fn test_legacy_store_alias_resolves() {
        let registry = AlgorithmRegistry::empty();
        assert_eq!(registry.get(method::LEGACY_NONE).unwrap().name(), method::STORE);
        assert!(registry.get("Zstd").is_none());
    }

    #[test]
    fn test_register_replaces_by_name() {
        let mut registry = AlgorithmRegistry::with_defaults();
        let before = registry.candidates().len();
        registry.register(Arc::new(Gzip));
        assert_eq!(registry.candidates().len(), before);
    }

    #[test]
    fn test_guarded_compress_swallows_panics() {
        assert!(compress_guarded(&Exploding, b"data").is_none());
    }

    #[test]
    fn test_compress_smallest_falls_back_to_store() {
        let registry = AlgorithmRegistry::with_defaults();
        let (name, out) = registry.compress_smallest(b"x");
        assert_eq!(name, method::STORE);
        assert_eq!(out, b"x");

        let text = b"abcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabc".repeat(20);
        let (name, out) = registry.compress_smallest(&text);
        assert_ne!(name, method::STORE);
        assert!(out.len() < text.len());
        let algo = registry.get(&name).unwrap();
        assert_eq!(algo.decompress(&out).unwrap(), text);
    }
}
