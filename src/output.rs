//! Writing generated files to disk.
//!
//! Every file goes through a temporary file in its destination directory and
//! is renamed into place, so readers never observe a half-written artifact.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::RenderError;
use crate::partition::PartitionSummary;
use crate::render::{ArtifactKind, JobArtifacts};

/// Name of the JSON report written next to the artifacts.
pub const REPORT_FILE: &str = "generation.json";

/// Atomically write `contents` to `path`, creating parent directories.
pub fn write_atomic(path: &Path, contents: &[u8], executable: bool) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".htc-forge-")
        .tempfile_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    set_mode(tmp.as_file(), if executable { 0o755 } else { 0o644 })?;

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// Temp files are created owner-only; published files get regular modes.
#[cfg(unix)]
fn set_mode(file: &std::fs::File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &std::fs::File, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// One written artifact in a [`GenerationReport`].
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactRecord {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
}

/// Summary of one generation run, written as `generation.json`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub generated_at: DateTime<Utc>,
    pub image: String,
    pub artifacts: Vec<ArtifactRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_archive: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition: Option<PartitionSummary>,
}

impl GenerationReport {
    pub fn new(image: impl Into<String>, artifacts: Vec<ArtifactRecord>) -> Self {
        Self {
            generated_at: Utc::now(),
            image: image.into(),
            artifacts,
            input_archive: None,
            partition: None,
        }
    }

    pub fn with_partition(mut self, summary: PartitionSummary) -> Self {
        self.partition = Some(summary);
        self
    }

    pub fn with_input_archive(mut self, path: PathBuf) -> Self {
        self.input_archive = Some(path);
        self
    }

    /// Write the report as pretty JSON into `dir`.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, RenderError> {
        let path = dir.join(REPORT_FILE);
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(&path, &json, false)?;
        debug!(path = %path.display(), "Wrote generation report");
        Ok(path)
    }
}

/// Write all three artifacts into `dir`. The executable script is made
/// executable on Unix.
pub fn write_artifacts(
    dir: &Path,
    artifacts: &JobArtifacts,
) -> Result<Vec<ArtifactRecord>, RenderError> {
    let mut records = Vec::new();
    for artifact in artifacts.iter() {
        let path = dir.join(&artifact.file_name);
        write_atomic(
            &path,
            artifact.contents().as_bytes(),
            artifact.kind.is_executable(),
        )?;
        records.push(ArtifactRecord {
            kind: artifact.kind,
            path,
            sha256: artifact.sha256(),
        });
    }

    info!(
        dir = %dir.display(),
        artifacts = records.len(),
        "Wrote submission artifacts"
    );
    Ok(records)
}
