use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::archive::FormatVersion;
use crate::error::Result;
use crate::workers::PipelineConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Create a new archive from specified files and directories.
    #[command(alias = "c")]
    Create {
        /// One or more input files or directories to add to the archive.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// The path for the output archive file (e.g., backup.dyn).
        #[arg(short, long)]
        output: PathBuf,

        /// Use the sequential encoder (one decision per file) instead of the parallel pipeline.
        #[arg(long)]
        simple: bool,

        /// Number of worker threads. [0 = one per CPU core]
        #[arg(long)]
        threads: Option<usize>,

        /// JSON file with pipeline settings. Command-line flags override it.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Try run-length preprocessing on compressible chunks.
        #[arg(long)]
        rle: bool,

        /// Try delta preprocessing on compressible chunks.
        #[arg(long)]
        delta: bool,

        /// Archive format to write (unversioned, v1, v2, v3, v4).
        #[arg(long)]
        format: Option<FormatVersion>,

        /// Directory holding optipng, jpegtran, cwebp and gifsicle for lossless image optimization.
        #[arg(long)]
        image_tools: Option<PathBuf>,

        /// Compress every chunk with every algorithm and keep the smallest output. Slow.
        #[arg(long)]
        exhaustive: bool,

        /// Print one line per file as it is written.
        #[arg(long)]
        progress: bool,
    },

    /// Extract files from an archive.
    #[command(alias = "x")]
    Extract {
        /// The archive file to extract.
        #[arg(required = true)]
        archive: PathBuf,

        /// The directory where files will be extracted. Defaults to the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the contents of an archive without extracting it.
    #[command(alias = "l")]
    List {
        /// The archive file to list contents of.
        #[arg(required = true)]
        archive: PathBuf,
    },

    /// Show how files would be compressed, without writing anything.
    #[command(alias = "a")]
    Analyze {
        /// Files or directories to analyze.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

/// Pipeline settings for a `create` command: the config file (or defaults)
/// with command-line overrides applied on top.
pub fn pipeline_config(command: &Commands) -> Result<PipelineConfig> {
    let Commands::Create {
        threads,
        config,
        rle,
        delta,
        format,
        exhaustive,
        ..
    } = command
    else {
        return Ok(PipelineConfig::default());
    };

    let mut settings = match config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(threads) = threads {
        settings.max_degree_of_parallelism = *threads;
    }
    if let Some(format) = format {
        settings.format = *format;
    }
    settings.enable_rle_preprocessing |= *rle;
    settings.enable_delta_preprocessing |= *delta;
    settings.exhaustive_search |= *exhaustive;
    Ok(settings.normalized())
}

/// Parses command-line arguments using `clap` and returns the command to execute.
pub fn run() -> std::result::Result<Commands, Box<dyn std::error::Error>> {
    let args = Args::parse();
    Ok(args.command)
}
