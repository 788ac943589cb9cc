//! Stage adapters for external tools.
//!
//! Adapters receive a scene and required paths, perform the external work
//! (HTTP download, ARD toolchain, datacube ingestion CLI) and report a
//! single outcome. They never hold a handle to the catalogue row; the
//! pipeline driver writes the outcome back.

mod ard;
mod datacube;
mod download;
mod visual;

pub use ard::{ArdConverter, ArdToolConfig, CommandArdConverter};
pub use datacube::{CommandDatacubeLoader, DatacubeConfig, DatacubeLoader};
pub use download::{HttpDownloader, SceneDownloader};
pub use visual::{
    CommandQuicklook, CommandTilecache, QuicklookGenerator, TilecacheGenerator, VisualToolConfig,
    ZoomRange,
};

use std::path::{Path, PathBuf};
use std::process::Output;

use tokio::process::Command;
use tracing::debug;

/// How a stage attempt failed.
///
/// Transient failures leave the scene row unchanged so a later invocation
/// retries the same PID. Permanent failures mark the scene invalid and
/// exclude it from all future pending lists.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Retryable failure (network blip, temporary disk issue).
    #[error("transient stage failure: {0}")]
    Transient(anyhow::Error),
    /// Terminal failure for this scene (e.g. cloud cover over threshold).
    #[error("permanent scene failure: {0}")]
    Permanent(String),
}

impl StageError {
    pub fn transient(e: impl Into<anyhow::Error>) -> Self {
        Self::Transient(e.into())
    }
}

/// Expand `{placeholder}` markers in a command argument.
pub(crate) fn expand_arg(arg: &str, replacements: &[(&str, &str)]) -> String {
    let mut out = arg.to_string();
    for (key, value) in replacements {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Run a configured external command, expanding placeholders in its args.
///
/// `invalid_exit_code`, when matched, converts the failure into a permanent
/// one. External toolchains use a dedicated exit code to signal "this scene
/// can never be processed" (e.g. excessive cloud cover after correction).
pub(crate) async fn run_tool(
    program: &Path,
    args: &[String],
    replacements: &[(&str, &str)],
    env_threads: Option<usize>,
    invalid_exit_code: Option<i32>,
) -> Result<Output, StageError> {
    let mut cmd = Command::new(program);
    for arg in args {
        cmd.arg(expand_arg(arg, replacements));
    }
    if let Some(threads) = env_threads {
        // Downstream native libraries read this to size their thread pools.
        cmd.env("EOA_NUM_THREADS", threads.to_string());
        cmd.env("OMP_NUM_THREADS", threads.to_string());
    }
    debug!(program = %program.display(), "invoking external tool");

    let output = cmd.output().await.map_err(StageError::transient)?;
    if output.status.success() {
        return Ok(output);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let code = output.status.code();
    if invalid_exit_code.is_some() && code == invalid_exit_code {
        return Err(StageError::Permanent(format!(
            "{} reported the scene as unprocessable: {}",
            program.display(),
            stderr.trim()
        )));
    }
    Err(StageError::Transient(anyhow::anyhow!(
        "{} exited with {:?}: {}",
        program.display(),
        code,
        stderr.trim()
    )))
}

/// Resolve a configured tool path, falling back to a PATH lookup.
pub(crate) fn resolve_tool(configured: &Path) -> Result<PathBuf, StageError> {
    if configured.is_absolute() {
        return Ok(configured.to_path_buf());
    }
    which::which(configured).map_err(|e| {
        StageError::Transient(anyhow::anyhow!(
            "cannot locate tool {}: {e}",
            configured.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_arg() {
        let expanded = expand_arg(
            "--input={download} --out={ard}/product",
            &[("download", "/data/dl/s1.zip"), ("ard", "/data/ard")],
        );
        assert_eq!(expanded, "--input=/data/dl/s1.zip --out=/data/ard/product");
    }

    #[test]
    fn test_expand_arg_unknown_placeholder_left_alone() {
        assert_eq!(expand_arg("{unknown}", &[("known", "x")]), "{unknown}");
    }
}
