use dynarch::archive::binary::{write_i32, write_string};
use dynarch::archive::{decode_archive, encode_archive, Archive, FormatVersion};
use dynarch::codecs::{method, AlgorithmRegistry, CompressionAlgorithm, Gzip};
use dynarch::common::{ChunkRecord, FileResult};
use dynarch::extract::extract_archive;
use dynarch::preprocess::PreprocessFlags;
use dynarch::ArchiverError;
use std::fs;
use tempfile::tempdir;

/// Hand-assembles an archive the way older writers laid it out: optional
/// version byte, count, then per file a single whole-file chunk.
fn legacy_bytes(version: Option<u8>, files: &[(&str, &str, Vec<u8>)]) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(v) = version {
        buf.push(v);
    }
    write_i32(&mut buf, files.len() as i32)?;
    for (path, method, data) in files {
        write_string(&mut buf, path)?;
        write_i32(&mut buf, 1)?;
        write_string(&mut buf, method)?;
        write_i32(&mut buf, data.len() as i32)?;
        buf.extend_from_slice(data);
    }
    Ok(buf)
}

#[test]
fn test_unversioned_whole_file_archive_extracts() -> Result<(), Box<dyn std::error::Error>> {
    let text = b"legacy text ".repeat(200);
    let fillers: Vec<String> = (0..8).map(|i| format!("fill/{i}.txt")).collect();
    let mut files = vec![
        ("a.txt", method::GZIP, Gzip.compress(&text)?),
        ("sub/b.bin", method::STORE, vec![9, 8, 7]),
        ("sub/c.bin", method::LEGACY_NONE, vec![1]),
        ("d.txt", method::STORE, b"d".to_vec()),
    ];
    // More than ten files, so the count's first byte is not a version marker.
    files.extend(
        fillers
            .iter()
            .map(|name| (name.as_str(), method::STORE, name.as_bytes().to_vec())),
    );
    let bytes = legacy_bytes(None, &files)?;

    let archive = decode_archive(&bytes)?;
    assert_eq!(archive.version, FormatVersion::Unversioned);
    assert_eq!(archive.files.len(), 12);

    let dir = tempdir()?;
    let path = dir.path().join("old.arc");
    fs::write(&path, &bytes)?;
    let out = dir.path().join("out");
    let report = extract_archive(&path, &out, &AlgorithmRegistry::with_defaults())?;
    assert!(report.is_clean());
    assert_eq!(fs::read(out.join("a.txt"))?, text);
    assert_eq!(fs::read(out.join("sub/b.bin"))?, vec![9, 8, 7]);
    assert_eq!(fs::read(out.join("sub/c.bin"))?, vec![1]);
    assert_eq!(fs::read(out.join("fill/7.txt"))?, b"fill/7.txt");
    Ok(())
}

#[test]
fn test_small_unversioned_counts_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let files = vec![("a.txt", method::STORE, b"a".to_vec()); 4];
    let bytes = legacy_bytes(None, &files)?;
    assert!(matches!(decode_archive(&bytes), Err(ArchiverError::UnsupportedVersion(4))));
    Ok(())
}

#[test]
fn test_version_one_has_no_directory_table() -> Result<(), Box<dyn std::error::Error>> {
    let bytes = legacy_bytes(Some(1), &[("only.txt", method::STORE, b"x".to_vec())])?;
    let archive = decode_archive(&bytes)?;
    assert_eq!(archive.version, FormatVersion::V1);
    assert!(archive.empty_directories.is_empty());
    assert_eq!(archive.files[0].chunks[0].data, b"x");
    Ok(())
}

#[test]
fn test_version_two_reads_empty_directories() -> Result<(), Box<dyn std::error::Error>> {
    let mut bytes = legacy_bytes(Some(2), &[("f.txt", method::STORE, b"f".to_vec())])?;
    write_i32(&mut bytes, 2)?;
    write_string(&mut bytes, "logs")?;
    write_string(&mut bytes, "cache/tmp")?;

    let dir = tempdir()?;
    let path = dir.path().join("v2.arc");
    fs::write(&path, &bytes)?;
    let out = dir.path().join("out");
    let report = extract_archive(&path, &out, &AlgorithmRegistry::with_defaults())?;
    assert_eq!(report.empty_dirs_created, 2);
    assert!(out.join("logs").is_dir());
    assert!(out.join("cache/tmp").is_dir());
    Ok(())
}

#[test]
fn test_truncated_chunk_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    // v3 chunk records carry a flags byte.
    let mut bytes = vec![3u8];
    write_i32(&mut bytes, 1)?;
    write_string(&mut bytes, "big.bin")?;
    write_i32(&mut bytes, 1)?;
    write_string(&mut bytes, method::STORE)?;
    bytes.push(0);
    write_i32(&mut bytes, 1000)?;
    bytes.extend(vec![0xAB; 990]);

    match decode_archive(&bytes) {
        Err(ArchiverError::ChunkTruncated {
            path,
            chunk,
            expected,
            actual,
        }) => {
            assert_eq!(path, "big.bin");
            assert_eq!(chunk, 0);
            assert_eq!(expected, 1000);
            assert_eq!(actual, 990);
        }
        other => panic!("expected a truncation error, got {other:?}"),
    }

    let dir = tempdir()?;
    let path = dir.path().join("cut.arc");
    fs::write(&path, &bytes)?;
    let registry = AlgorithmRegistry::with_defaults();
    let err = extract_archive(&path, &dir.path().join("out"), &registry).unwrap_err();
    assert!(matches!(err, ArchiverError::ChunkTruncated { .. }));
    assert!(!dir.path().join("out/big.bin").exists());
    Ok(())
}

#[test]
fn test_missing_decompressor_fails_only_that_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut unknown = FileResult::new("mystery.bin", 3);
    unknown.chunks.push(ChunkRecord {
        index: 0,
        method: "Zstd".to_string(),
        data: vec![1, 2, 3],
        flags: PreprocessFlags::NONE,
    });
    let mut fine = FileResult::new("fine.txt", 2);
    fine.chunks.push(ChunkRecord {
        index: 0,
        method: method::STORE.to_string(),
        data: b"ok".to_vec(),
        flags: PreprocessFlags::NONE,
    });
    let bytes = encode_archive(&Archive {
        version: FormatVersion::V4,
        files: vec![unknown, fine],
        empty_directories: Default::default(),
    })?;

    let dir = tempdir()?;
    let path = dir.path().join("a.dyn");
    fs::write(&path, bytes)?;
    let out = dir.path().join("out");
    let report = extract_archive(&path, &out, &AlgorithmRegistry::with_defaults())?;

    assert_eq!(report.extracted, 1);
    assert_eq!(report.failures.len(), 1);
    match &report.failures[0].error {
        ArchiverError::MissingDecompressor { path, chunk, method } => {
            assert_eq!(path, "mystery.bin");
            assert_eq!(*chunk, 0);
            assert_eq!(method, "Zstd");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!out.join("mystery.bin").exists());
    assert_eq!(fs::read(out.join("fine.txt"))?, b"ok");
    Ok(())
}

#[test]
fn test_corrupt_compressed_chunk_fails_only_that_file() -> Result<(), Box<dyn std::error::Error>> {
    let bytes = legacy_bytes(
        Some(1),
        &[
            ("bad.txt", method::LZMA, b"definitely not xz".to_vec()),
            ("good.txt", method::STORE, b"good".to_vec()),
        ],
    )?;
    let dir = tempdir()?;
    let path = dir.path().join("v1.arc");
    fs::write(&path, bytes)?;
    let registry = AlgorithmRegistry::with_defaults();
    let report = extract_archive(&path, &dir.path().join("out"), &registry)?;
    assert_eq!(report.extracted, 1);
    assert!(matches!(report.failures[0].error, ArchiverError::Decompress { .. }));
    Ok(())
}
