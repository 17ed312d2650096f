use std::fs;
use std::path::Path;

use flate2::read::GzDecoder;
use tar::EntryType;

use crate::error::{AppError, Result};

use super::entry::{prepare_dest, target_path, write_entry, EntryKind};

fn tar_err(archive_path: &Path, e: std::io::Error) -> AppError {
    AppError::io(format!("failed to read tarball {archive_path:?}: {e}"))
}

/// Unpack a gzip-compressed tarball into `dest_dir`, keeping its internal layout.
///
/// Links, devices and other special entries are skipped.
pub(crate) fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = fs::File::open(archive_path)
        .map_err(|e| AppError::io(format!("failed to open {archive_path:?}: {e}")))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let root = prepare_dest(dest_dir)?;

    for entry in archive.entries().map_err(|e| tar_err(archive_path, e))? {
        let mut entry = entry.map_err(|e| tar_err(archive_path, e))?;
        let name = entry
            .path()
            .map_err(|e| tar_err(archive_path, e))?
            .to_string_lossy()
            .into_owned();
        let target = target_path(&root, &name)?;

        let header = entry.header();
        let kind = match header.entry_type() {
            EntryType::Directory => EntryKind::Dir,
            EntryType::Regular | EntryType::Continuous => EntryKind::File {
                size: header.size().map_err(|e| tar_err(archive_path, e))?,
                mode: header.mode().ok(),
            },
            other => {
                log::warn!("Skipping {:?} entry {:?} in {:?}", other, name, archive_path);
                continue;
            }
        };
        write_entry(&root, &target, kind, &mut entry)?;
    }

    Ok(())
}
