use dynarch::analysis::shannon_entropy;
use dynarch::archive::{decode_archive, FormatVersion};
use dynarch::codecs::{method, AlgorithmRegistry, CompressionAlgorithm};
use dynarch::compress::compress_files;
use dynarch::decision::{decide, CompressionDecision};
use dynarch::workers::{build_archive, PipelineConfig};
use rand::RngCore;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_zero_file_compresses_and_random_file_is_stored() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let registry = AlgorithmRegistry::with_defaults();

    let zeros = vec![0u8; 10 * 1024];
    let zero_path = dir.path().join("zeros.bin");
    fs::write(&zero_path, &zeros)?;
    assert_eq!(shannon_entropy(&zeros), 0.0);

    let decision = decide(&zero_path, registry.candidates());
    assert_eq!(decision.kind, CompressionDecision::FullCompress);
    let algo = decision.algorithm.ok_or("expected an algorithm")?;
    let compressed = algo.compress(&zeros)?;
    assert!(compressed.len() * 20 < zeros.len(), "{} -> {}", algo.name(), compressed.len());

    let mut noise = vec![0u8; 10 * 1024];
    rand::thread_rng().fill_bytes(&mut noise);
    let noise_path = dir.path().join("noise.bin");
    fs::write(&noise_path, &noise)?;
    assert!(shannon_entropy(&noise) > 7.9);

    let decision = decide(&noise_path, registry.candidates());
    assert_eq!(decision.kind, CompressionDecision::Store);
    assert!(decision.algorithm.is_none());
    Ok(())
}

#[test]
fn test_decisions_are_repeatable() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("big.log");
    let mut text = String::new();
    for i in 0..20_000 {
        text.push_str(&format!("{i:08} GET /index.html 200\n"));
    }
    fs::write(&path, text)?;

    let registry = AlgorithmRegistry::with_defaults();
    let first = decide(&path, registry.candidates());
    assert_eq!(first.kind, CompressionDecision::ChunkCompress);
    for _ in 0..3 {
        let again = decide(&path, registry.candidates());
        assert_eq!(again.kind, first.kind);
        assert_eq!(again.algorithm_name(), first.algorithm_name());
    }
    Ok(())
}

#[test]
fn test_dll_is_always_stored() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let dll = dir.path().join("Highly.Compressible.DLL");
    fs::write(&dll, "compress me ".repeat(100_000))?;
    let registry = AlgorithmRegistry::with_defaults();

    let pipeline_out = dir.path().join("pipeline.dyn");
    build_archive(&[dll.clone()], &pipeline_out, &registry, None, &PipelineConfig::default())?;
    let simple_out = dir.path().join("simple.dyn");
    compress_files(&[dll], &simple_out, &registry, None, FormatVersion::CURRENT)?;

    for archive in [pipeline_out, simple_out] {
        let decoded = decode_archive(&fs::read(&archive)?)?;
        let chunks = &decoded.files[0].chunks;
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.method == method::STORE));
    }
    Ok(())
}
