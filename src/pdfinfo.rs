//! Runs the external `pdfinfo` tool and parses its report.
//!
//! Parsing is tolerant and never fails (see
//! [`blobproc_core::pdfinfo::parse_info`]). Only problems running the tool
//! surface as errors, and each has its own variant so callers can tell a
//! missing input apart from a broken tool.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use blobproc_core::pdfinfo::{parse_info, Info};

/// Executable looked up on `PATH`.
pub const PDFINFO_BIN: &str = "pdfinfo";

#[derive(Debug, thiserror::Error)]
pub enum PdfInfoError {
    #[error("file not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    ToolFailed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Run `pdfinfo <path>` and parse its output.
pub async fn run_pdfinfo(path: &Path) -> Result<Info, PdfInfoError> {
    run_tool(PDFINFO_BIN, path).await
}

/// Run `program <path>` and parse its stdout as a `pdfinfo` report.
pub async fn run_tool(program: &str, path: &Path) -> Result<Info, PdfInfoError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(PdfInfoError::MissingFile(path.to_path_buf())),
    }

    let output = Command::new(program)
        .arg(path)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| PdfInfoError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(PdfInfoError::ToolFailed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    debug!(path = %path.display(), bytes = output.stdout.len(), "parsing pdfinfo report");
    Ok(parse_info(&String::from_utf8_lossy(&output.stdout)))
}
