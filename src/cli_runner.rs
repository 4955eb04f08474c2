//! Executes a parsed [`Commands`] value. Shared by the `dynarch` binary and
//! the integration tests that drive the library the way the CLI does.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::analysis::classifier;
use crate::cli::{self, Commands};
use crate::codecs::{method, AlgorithmRegistry, ExternalToolOptimizer};
use crate::common::expand_inputs;
use crate::decision::{self, strategy, SAMPLE_SECTION};
use crate::progress::{BuildSummary, FileProgress, ProgressCallback};
use crate::{compress, extract, workers};

/// Public entry for running CLI logic.
pub fn run_cli_app() -> Result<(), Box<dyn std::error::Error>> {
    let command = cli::run()?;
    run_command(&command)
}

pub fn run_command(command: &Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Create {
            inputs,
            output,
            simple,
            image_tools,
            progress,
            ..
        } => {
            let config = cli::pipeline_config(command)?;
            let registry = match image_tools {
                Some(dir) => {
                    let optimizer = Arc::new(ExternalToolOptimizer::new(dir));
                    AlgorithmRegistry::with_image_optimizer(optimizer)
                }
                None => AlgorithmRegistry::with_defaults(),
            };

            let start = Instant::now();
            let callback = create_cli_progress_callback("create");
            let progress_cb: Option<&ProgressCallback> = if *progress {
                Some(&callback)
            } else {
                None
            };

            let summary = if *simple {
                compress::compress_files(inputs, output, &registry, progress_cb, config.format)?
            } else {
                workers::build_archive(inputs, output, &registry, progress_cb, &config)?
            };
            print_summary(&summary, output, start.elapsed().as_secs_f64());
        }
        Commands::Extract { archive, output } => {
            let out_dir = match output {
                Some(dir) => dir.clone(),
                None => std::env::current_dir()?,
            };
            let report =
                extract::extract_archive(archive, &out_dir, &AlgorithmRegistry::with_defaults())?;
            println!(
                "Extracted {} files ({} bytes) and {} empty directories to {}",
                report.extracted,
                report.bytes_written,
                report.empty_dirs_created,
                out_dir.display()
            );
            if !report.is_clean() {
                for failure in &report.failures {
                    eprintln!("  failed: {}: {}", failure.relative_path, failure.error);
                }
                return Err(
                    format!("{} entries could not be extracted", report.failures.len()).into(),
                );
            }
        }
        Commands::List { archive } => {
            let listing = extract::list_archive(archive)?;
            println!("Archive {} ({} files):", listing.version, listing.entries.len());
            for entry in &listing.entries {
                let methods: Vec<&str> = entry.methods.iter().map(String::as_str).collect();
                println!(
                    "- {} ({} chunks, {} bytes stored, {})",
                    entry.relative_path,
                    entry.chunks,
                    entry.stored_size,
                    methods.join("+")
                );
            }
            for dir in &listing.empty_directories {
                println!("- {dir}/ (empty)");
            }
        }
        Commands::Analyze { paths } => analyze(paths),
    }

    Ok(())
}

fn analyze(paths: &[PathBuf]) {
    let registry = AlgorithmRegistry::with_defaults();
    for path in paths {
        if path.is_dir() {
            println!("{}/: folder strategy {}", path.display(), strategy::decide_for_folder(path));
        }
    }

    let expanded = expand_inputs(paths);
    for file in &expanded.files {
        let decision = decision::decide(file, registry.candidates());
        let entropy = match classifier::sample_file(file, SAMPLE_SECTION) {
            Ok(sample) => format!("{:.2}", classifier::shannon_entropy(&sample)),
            Err(e) => {
                tracing::warn!(path = %file.display(), error = %e, "could not sample file");
                "n/a".to_string()
            }
        };
        println!(
            "{}: {} via {} (entropy {}, strategy {})",
            display_path(file),
            decision.kind,
            decision.algorithm_name().unwrap_or(method::STORE),
            entropy,
            strategy::decide_for_file(file)
        );
    }
    for missing in &expanded.missing {
        eprintln!("{}: not found", missing.display());
    }
}

fn display_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

fn print_summary(summary: &BuildSummary, output: &Path, seconds: f64) {
    let mb = summary.bytes_in as f64 / (1024.0 * 1024.0);
    let speed = if seconds > 0.0 { mb / seconds } else { 0.0 };
    println!(
        "Wrote {} files to {} | {} -> {} bytes ({:.1}%) | {} chunks, {} deduplicated | {:.1} MB/s",
        summary.files_written,
        output.display(),
        summary.bytes_in,
        summary.bytes_out,
        summary.ratio() * 100.0,
        summary.chunks,
        summary.dedup_hits,
        speed
    );
    for skipped in &summary.skipped {
        eprintln!("  skipped: {}", skipped.display());
    }
}

// --- utils for CLI progress -------------------------------------------------

fn create_cli_progress_callback(
    operation: &str,
) -> impl Fn(&FileProgress<'_>) + Send + Sync + 'static {
    let operation = operation.to_uppercase();
    move |p: &FileProgress<'_>| {
        // Print to stderr to avoid interfering with stdout
        let mut stderr = io::stderr().lock();
        writeln!(
            stderr,
            "[{}] {:>5} | {} ({} -> {} bytes)",
            operation, p.files_processed, p.relative_path, p.original_size, p.compressed_size
        )
        .ok();
    }
}
