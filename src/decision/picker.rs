//! Deterministic per-chunk algorithm choice. No sampling, so it is cheap
//! enough for the hot path.

use std::path::Path;

use crate::analysis::classifier::extension_of;
use crate::analysis::ChunkProfile;
use crate::codecs::{method, Algorithm, AlgorithmRegistry};

/// Executables, libraries, debug symbols and drivers. Always stored verbatim.
pub const EXECUTABLE_EXTENSIONS: &[&str] =
    &["dll", "exe", "so", "dylib", "pdb", "mdb", "sys", "ocx", "drv"];

/// Entropy above which non-text chunks are stored.
pub const STORE_ENTROPY: f64 = 7.5;

pub fn is_executable_path(path: &Path) -> bool {
    extension_of(path).map_or(false, |ext| EXECUTABLE_EXTENSIONS.contains(&ext.as_str()))
}

/// Method name for a chunk of `path` with the given profile.
pub fn pick_method(profile: &ChunkProfile, path: &Path) -> &'static str {
    if is_executable_path(path) {
        return method::STORE;
    }
    if profile.is_image {
        return method::LOSSLESS_IMAGE;
    }
    if profile.entropy > STORE_ENTROPY && !profile.is_text {
        return method::STORE;
    }
    if profile.is_text && profile.has_repeats {
        return method::BZIP2;
    }
    method::LZMA
}

/// Resolves [`pick_method`] against the registry, falling back to store when
/// the picked method is not registered.
pub fn select_best(profile: &ChunkProfile, path: &Path, registry: &AlgorithmRegistry) -> Algorithm {
    let name = pick_method(profile, path);
    registry.get(name).unwrap_or_else(|| {
        tracing::debug!(method = name, "picked method not registered, storing");
        registry.store()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::codecs::Gzip;
    use std::sync::Arc;

    fn profile(is_image: bool, is_text: bool, has_repeats: bool, entropy: f64) -> ChunkProfile {
        ChunkProfile {
            is_image,
            is_text,
            has_repeats,
            entropy,
        }
    }

    #[test]
    fn test_executables_always_store() {
        let image = profile(true, false, false, 1.0);
        for name in ["a.dll", "B.EXE", "lib.so", "x.dylib", "y.pdb", "d.sys"] {
            assert_eq!(pick_method(&image, Path::new(name)), method::STORE, "{name}");
        }
    }

    #[test]
    fn test_rule_order() {
        let p = Path::new("data.bin");
        assert_eq!(pick_method(&profile(true, false, false, 7.9), p), method::LOSSLESS_IMAGE);
        assert_eq!(pick_method(&profile(false, false, false, 7.9), p), method::STORE);
        assert_eq!(pick_method(&profile(false, true, false, 7.9), p), method::LZMA);
        assert_eq!(pick_method(&profile(false, true, true, 3.0), p), method::BZIP2);
        assert_eq!(pick_method(&profile(false, false, true, 7.5), p), method::LZMA);
    }

    #[test]
    fn test_text_chunk_picks_bzip2() {
        let chunk = b"hello hello hello hello\n".repeat(10);
        assert_eq!(pick_method(&analyze(&chunk), Path::new("a.txt")), method::BZIP2);
    }

    #[test]
    fn test_missing_method_falls_back_to_store() {
        let mut registry = AlgorithmRegistry::empty();
        registry.register(Arc::new(Gzip));
        let algo = select_best(&profile(false, false, false, 2.0), Path::new("f"), &registry);
        assert_eq!(algo.name(), method::STORE);
    }
}
