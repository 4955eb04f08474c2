//! # dynarch Core Library
//!
//! An adaptive, multi-algorithm file archiver. Instead of one codec for the
//! whole archive, `dynarch` decides per file and per chunk which algorithm
//! (if any) is worth running, deduplicates identical chunks by content hash
//! and writes everything into a single versioned container.
//!
//! ## Key Modules
//!
//! - [`workers`]: The concurrent build pipeline and its
//!   [`PipelineConfig`](workers::PipelineConfig).
//! - [`compress`]: The sequential encoders.
//! - [`extract`]: Extraction and listing.
//! - [`archive`]: The container format, readable in every historical version.
//! - [`codecs`]: The compression algorithms and their registry.
//! - [`decision`]: Per-file decisions, the per-chunk picker and strategy hints.
//! - [`analysis`], [`sampling`], [`preprocess`], [`chunker`]: the building blocks.
//!
//! ## Examples
//!
//! ```no_run
//! use std::path::{Path, PathBuf};
//! use dynarch::codecs::AlgorithmRegistry;
//! use dynarch::workers::{build_archive, PipelineConfig};
//!
//! let registry = AlgorithmRegistry::with_defaults();
//! let summary = build_archive(
//!     &[PathBuf::from("assets")],
//!     Path::new("assets.dyn"),
//!     &registry,
//!     None,
//!     &PipelineConfig::default(),
//! )?;
//! println!("{} files, {} chunks deduplicated", summary.files_written, summary.dedup_hits);
//! # Ok::<(), dynarch::ArchiverError>(())
//! ```

pub mod analysis;
pub mod archive;
pub mod chunker;
pub mod cli;
pub mod cli_runner;
pub mod codecs;
pub mod common;
pub mod compress;
pub mod decision;
pub mod error;
pub mod extract;
pub mod preprocess;
pub mod progress;
pub mod sampling;
pub mod workers;

pub use error::ArchiverError;
