use dynarch::codecs::{method, AlgorithmRegistry, CodecError, CompressionAlgorithm, Lzma};
use dynarch::extract::{extract_archive, list_archive};
use dynarch::workers::{build_archive, PipelineConfig};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

/// LZMA that counts how often it is asked to compress.
struct CountingLzma {
    inner: Lzma,
    calls: AtomicUsize,
}

impl CompressionAlgorithm for CountingLzma {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.compress(input)
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.inner.decompress(input)
    }
}

const CHUNK: usize = 4096;

/// Four distinct low-entropy binary chunks; the picker sends these to LZMA.
fn distinct_chunks() -> Vec<u8> {
    let mut data = Vec::with_capacity(4 * CHUNK);
    for k in 0..4u8 {
        data.extend((0..CHUNK).map(|i| if i % 64 == 0 { k + 1 } else { 0 }));
    }
    data
}

#[test]
fn test_identical_chunks_compressed_once() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let content = distinct_chunks();
    let a = dir.path().join("a.bin");
    let b = dir.path().join("b.bin");
    let twice = dir.path().join("twice.bin");
    fs::write(&a, &content)?;
    fs::write(&b, &content)?;
    fs::write(&twice, [content.clone(), content].concat())?;

    let counter = Arc::new(CountingLzma {
        inner: Lzma::default(),
        calls: AtomicUsize::new(0),
    });
    let mut registry = AlgorithmRegistry::with_defaults();
    registry.register(counter.clone());
    assert_eq!(registry.get(method::LZMA).map(|a| a.name().to_string()), Some("LZMA".to_string()));

    let config = PipelineConfig {
        max_degree_of_parallelism: 4,
        min_chunk_size: CHUNK,
        max_chunk_size: CHUNK,
        ..PipelineConfig::default()
    };
    let archive = dir.path().join("dedup.dyn");
    let summary = build_archive(&[a, b, twice], &archive, &registry, None, &config)?;

    assert_eq!(summary.chunks, 16);
    assert_eq!(counter.calls.load(Ordering::SeqCst), 4);
    assert_eq!(summary.compress_calls, 4);
    assert_eq!(summary.dedup_hits, 12);

    let listing = list_archive(&archive)?;
    for entry in &listing.entries {
        assert!(entry.methods.iter().all(|m| m == method::LZMA), "{entry:?}");
    }

    let out = tempdir()?;
    let report = extract_archive(&archive, out.path(), &registry)?;
    assert!(report.is_clean());
    assert_eq!(fs::read(out.path().join("twice.bin"))?.len(), 8 * CHUNK);
    Ok(())
}

#[test]
fn test_executable_copy_does_not_share_compressed_chunks(
) -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let content = distinct_chunks();
    let data = dir.path().join("payload.bin");
    let dll = dir.path().join("payload.dll");
    fs::write(&data, &content)?;
    fs::write(&dll, &content)?;

    let config = PipelineConfig {
        min_chunk_size: CHUNK,
        max_chunk_size: CHUNK,
        ..PipelineConfig::default()
    };
    let archive = dir.path().join("out.dyn");
    build_archive(&[dll, data], &archive, &AlgorithmRegistry::with_defaults(), None, &config)?;

    let listing = list_archive(&archive)?;
    let methods = |name: &str| {
        listing
            .entries
            .iter()
            .find(|e| e.relative_path == name)
            .map(|e| e.methods.clone())
            .unwrap()
    };
    assert_eq!(methods("payload.dll").into_iter().collect::<Vec<_>>(), vec![method::STORE]);
    assert_eq!(methods("payload.bin").into_iter().collect::<Vec<_>>(), vec![method::LZMA]);
    Ok(())
}
