//! Input bundling: pack subset files into the archive the job unpacks.
//!
//! Entries are stored at the archive root in manifest order, so `tar -xzf` in
//! the job's scratch directory places them next to the transferred manifest.

use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use tar::Builder as TarBuilder;
use tracing::{debug, info};

use crate::error::BundleError;
use crate::output::write_atomic;
use crate::partition::Manifest;

/// Outcome of a bundling run.
#[derive(Debug, Clone, Serialize)]
pub struct BundleSummary {
    pub archive: PathBuf,
    pub files: usize,
    pub bytes: usize,
}

/// Pack every file listed in `manifest` from `source_dir` into a gzip
/// compressed tarball at `archive_path`.
pub fn bundle_directory(
    source_dir: &Path,
    manifest: &Manifest,
    archive_path: &Path,
) -> Result<BundleSummary, BundleError> {
    let mut tar = TarBuilder::new(GzEncoder::new(Vec::new(), Compression::default()));

    for entry in manifest.entries() {
        let path = source_dir.join(entry);
        if !path.is_file() {
            return Err(BundleError::MissingSubset(path.display().to_string()));
        }
        tar.append_path_with_name(&path, entry)?;
        debug!(file = %entry, "Added subset to input archive");
    }

    let bytes = tar.into_inner()?.finish()?;
    write_atomic(archive_path, &bytes, false)?;

    info!(
        archive = %archive_path.display(),
        files = manifest.len(),
        bytes = bytes.len(),
        "Wrote input archive"
    );

    Ok(BundleSummary {
        archive: archive_path.to_path_buf(),
        files: manifest.len(),
        bytes: bytes.len(),
    })
}

/// Read the manifest at `manifest_path` and bundle the files it lists.
pub fn bundle_from_manifest(
    source_dir: &Path,
    manifest_path: &Path,
    archive_path: &Path,
) -> Result<BundleSummary, BundleError> {
    let manifest = Manifest::read(manifest_path)?;
    bundle_directory(source_dir, &manifest, archive_path)
}
