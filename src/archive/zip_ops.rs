use std::fs;
use std::path::Path;

use crate::error::{AppError, Result};

use super::entry::{prepare_dest, target_path, write_entry, EntryKind};

/// Unpack a zip archive into `dest_dir`, keeping its internal layout.
pub(crate) fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = fs::File::open(archive_path)
        .map_err(|e| AppError::io(format!("failed to open {archive_path:?}: {e}")))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let root = prepare_dest(dest_dir)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        let target = target_path(&root, &name)?;

        let kind = if entry.is_symlink() {
            log::warn!("Skipping link {:?} in {:?}", name, archive_path);
            continue;
        } else if entry.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File {
                size: entry.size(),
                mode: entry.unix_mode(),
            }
        };
        write_entry(&root, &target, kind, &mut entry)?;
    }

    log::debug!("Unpacked {} zip entries into {:?}", archive.len(), root);
    Ok(())
}
