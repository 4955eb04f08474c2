//! # Lossless Image Re-encoding
//!
//! `LosslessImage` never decodes pixels itself. It sniffs the container
//! format and hands the whole buffer to an [`ImageOptimizer`], which may
//! return a smaller but logically identical image. Because nothing is lost,
//! decompression is the identity function.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::{method, CodecError, CompressionAlgorithm};

/// Image container formats the optimizer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    WebP,
    Gif,
}

impl ImageFormat {
    /// Sniffs the format from leading magic bytes.
    pub fn detect(data: &[u8]) -> Option<Self> {
        const PNG: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        if data.len() > 8 && data[..8] == PNG {
            return Some(ImageFormat::Png);
        }
        if data.len() > 2 && data[0] == 0xFF && data[1] == 0xD8 {
            return Some(ImageFormat::Jpeg);
        }
        if data.len() > 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return Some(ImageFormat::WebP);
        }
        if data.len() >= 6 && (&data[..6] == b"GIF87a" || &data[..6] == b"GIF89a") {
            return Some(ImageFormat::Gif);
        }
        None
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::WebP => "webp",
            ImageFormat::Gif => "gif",
        }
    }
}

/// Narrow capability for lossless image re-encoding.
///
/// Implementations must return either a smaller lossless encoding of the same
/// image or `data` unchanged. They must not fail.
pub trait ImageOptimizer: Send + Sync {
    fn optimize(&self, data: &[u8], format: ImageFormat) -> Vec<u8>;
}

/// Returns every image unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOptimizer;

impl ImageOptimizer for NoopOptimizer {
    fn optimize(&self, data: &[u8], _format: ImageFormat) -> Vec<u8> {
        data.to_vec()
    }
}

/// Runs per-format command line optimizers found in one tools directory.
///
/// Every invocation goes through temporary files and is bounded by
/// `timeout`. Any problem (missing tool, non-zero exit, empty or larger
/// output, timeout) yields the original bytes.
#[derive(Debug, Clone)]
pub struct ExternalToolOptimizer {
    tools_dir: PathBuf,
    timeout: Duration,
}

impl ExternalToolOptimizer {
    pub fn new(tools_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools_dir: tools_dir.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Tool binary name and argument template for a format. Only lossless
    /// modes are used; `{in}` and `{out}` are substituted per run.
    fn tool_for(format: ImageFormat) -> (&'static str, &'static [&'static str]) {
        match format {
            ImageFormat::Png => ("optipng", &["-o2", "-out", "{out}", "{in}"]),
            ImageFormat::Jpeg => (
                "jpegtran",
                &["-copy", "all", "-optimize", "-outfile", "{out}", "{in}"],
            ),
            ImageFormat::WebP => ("cwebp", &["-lossless", "-mt", "{in}", "-o", "{out}"]),
            ImageFormat::Gif => ("gifsicle", &["--optimize=3", "-o", "{out}", "{in}"]),
        }
    }

    fn tool_path(&self, name: &str) -> PathBuf {
        self.tools_dir
            .join(format!("{}{}", name, std::env::consts::EXE_SUFFIX))
    }

    fn run(
        &self,
        tool: &Path,
        args: &[&str],
        data: &[u8],
        format: ImageFormat,
    ) -> std::io::Result<Option<Vec<u8>>> {
        let workdir = tempfile::tempdir()?;
        let input = workdir.path().join(format!("in.{}", format.extension()));
        let output = workdir.path().join(format!("out.{}", format.extension()));
        std::fs::write(&input, data)?;

        let args: Vec<String> = args
            .iter()
            .map(|a| match *a {
                "{in}" => input.to_string_lossy().into_owned(),
                "{out}" => output.to_string_lossy().into_owned(),
                other => other.to_string(),
            })
            .collect();

        let mut child = Command::new(tool)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(tool = %tool.display(), "image optimizer timed out");
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(20));
        };

        if !status.success() {
            tracing::debug!(tool = %tool.display(), ?status, "image optimizer failed");
            return Ok(None);
        }
        match std::fs::read(&output) {
            Ok(bytes) if !bytes.is_empty() => Ok(Some(bytes)),
            _ => {
                tracing::debug!(tool = %tool.display(), "image optimizer produced no output");
                Ok(None)
            }
        }
    }
}

impl ImageOptimizer for ExternalToolOptimizer {
    fn optimize(&self, data: &[u8], format: ImageFormat) -> Vec<u8> {
        let (name, args) = Self::tool_for(format);
        let tool = self.tool_path(name);
        if !tool.is_file() {
            tracing::debug!(tool = %tool.display(), "image optimizer not found");
            return data.to_vec();
        }
        match self.run(&tool, args, data, format) {
            Ok(Some(optimized)) if optimized.len() < data.len() => optimized,
            Ok(Some(_)) => {
                tracing::debug!(tool = name, "optimizer output not smaller, keeping original");
                data.to_vec()
            }
            Ok(None) => data.to_vec(),
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "image optimizer I/O error");
                data.to_vec()
            }
        }
    }
}

/// The `LosslessImage` algorithm.
#[derive(Clone)]
pub struct LosslessImage {
    optimizer: Arc<dyn ImageOptimizer>,
}

impl LosslessImage {
    pub fn new(optimizer: Arc<dyn ImageOptimizer>) -> Self {
        Self { optimizer }
    }
}

impl Default for LosslessImage {
    fn default() -> Self {
        Self::new(Arc::new(NoopOptimizer))
    }
}

impl CompressionAlgorithm for LosslessImage {
    fn name(&self) -> &str {
        method::LOSSLESS_IMAGE
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(match ImageFormat::detect(input) {
            Some(format) => self.optimizer.optimize(input, format),
            None => input.to_vec(),
        })
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(input.to_vec())
    }
}
