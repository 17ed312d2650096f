//! Release archive extraction.
//!
//! Zip is tried first; a gzip tarball is the fallback. Every entry path is
//! checked to stay inside the destination before anything is written.

mod entry;
mod tar_gz;
mod zip_ops;

use std::path::Path;

use crate::error::{AppError, Result};

pub(crate) use tar_gz::extract_tar_gz;
pub(crate) use zip_ops::extract_zip;

/// Extract `archive_path` into `dest_dir`, then delete the archive.
///
/// Failure to delete the archive is logged, not returned.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    if let Err(zip_err) = extract_zip(archive_path, dest_dir) {
        log::warn!(
            "Zip extraction of {:?} failed ({}), trying tar.gz",
            archive_path,
            zip_err
        );
        if let Err(tar_err) = extract_tar_gz(archive_path, dest_dir) {
            return Err(AppError::extraction(&zip_err, &tar_err));
        }
    }

    if let Err(e) = std::fs::remove_file(archive_path) {
        log::warn!("Failed to remove archive {:?}: {}", archive_path, e);
    }
    Ok(())
}
