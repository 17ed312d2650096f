//! Placing a single archive entry on disk.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

/// What an archive entry turns into once written.
pub(super) enum EntryKind {
    Dir,
    File { size: u64, mode: Option<u32> },
}

/// Split a raw entry name into path segments under the destination.
///
/// Both `/` and `\` separate segments. Empty and `.` segments are dropped.
/// Names that are absolute, carry a drive letter, climb with `..` or are
/// empty after cleanup yield `None`.
pub(super) fn entry_relative_path(raw: &str) -> Option<PathBuf> {
    if raw.starts_with(['/', '\\']) {
        return None;
    }
    let mut chars = raw.chars();
    if let (Some(drive), Some(':')) = (chars.next(), chars.next()) {
        if drive.is_ascii_alphabetic() {
            return None;
        }
    }

    let mut relative = PathBuf::new();
    for segment in raw.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return None,
            part => relative.push(part),
        }
    }
    (!relative.as_os_str().is_empty()).then_some(relative)
}

/// Destination of `raw` inside `dest_root`, or an error if it cannot stay there.
///
/// `dest_root` must already be canonical.
pub(super) fn target_path(dest_root: &Path, raw: &str) -> Result<PathBuf> {
    let relative = entry_relative_path(raw)
        .ok_or_else(|| AppError::io(format!("unsafe archive entry {raw:?}")))?;
    Ok(dest_root.join(relative))
}

/// Fail if an already-existing ancestor of `target` resolves outside `dest_root`.
///
/// Entry names are checked lexically by [`target_path`]; this catches
/// directories that were swapped for links pointing elsewhere.
fn ensure_contained(dest_root: &Path, target: &Path) -> Result<()> {
    let mut ancestor = target.parent();
    while let Some(dir) = ancestor {
        match dir.canonicalize() {
            Ok(real) if real.starts_with(dest_root) => return Ok(()),
            Ok(real) => {
                return Err(AppError::io(format!(
                    "archive entry {target:?} resolves outside destination via {real:?}"
                )))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => ancestor = dir.parent(),
            Err(e) => return Err(AppError::io(format!("failed to resolve {dir:?}: {e}"))),
        }
    }
    Err(AppError::io(format!("archive entry {target:?} has no anchor")))
}

/// Create `target` as a directory or stream `reader` into it as a file.
pub(super) fn write_entry(
    dest_root: &Path,
    target: &Path,
    kind: EntryKind,
    reader: &mut impl Read,
) -> Result<()> {
    ensure_contained(dest_root, target)?;

    let (size, mode) = match kind {
        EntryKind::Dir => {
            fs::create_dir_all(target)
                .map_err(|e| AppError::io(format!("failed to create {target:?}: {e}")))?;
            return Ok(());
        }
        EntryKind::File { size, mode } => (size, mode),
    };

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io(format!("failed to create {parent:?}: {e}")))?;
    }
    let mut out = fs::File::create(target)
        .map_err(|e| AppError::io(format!("failed to create {target:?}: {e}")))?;
    let copied = io::copy(reader, &mut out)
        .map_err(|e| AppError::io(format!("failed to write {target:?}: {e}")))?;
    if copied != size {
        return Err(AppError::io(format!(
            "truncated archive entry {target:?}: {copied} of {size} bytes"
        )));
    }

    // Modes that would leave the owner unable to read are ignored.
    match mode.filter(|m| m & 0o400 != 0) {
        Some(mode) => apply_mode(target, mode),
        None => Ok(()),
    }
}

#[cfg(unix)]
fn apply_mode(target: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt as _;

    fs::set_permissions(target, fs::Permissions::from_mode(mode & 0o7777))
        .map_err(|e| AppError::io(format!("failed to set mode on {target:?}: {e}")))
}

#[cfg(not(unix))]
fn apply_mode(_target: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Canonical form of `dest`, creating it first.
pub(super) fn prepare_dest(dest: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dest).map_err(|e| AppError::io(format!("failed to create {dest:?}: {e}")))?;
    dest.canonicalize()
        .map_err(|e| AppError::io(format!("failed to resolve {dest:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_nested_names() {
        assert_eq!(
            entry_relative_path("cms-5.0/public/index.php"),
            Some(PathBuf::from("cms-5.0").join("public").join("index.php"))
        );
        assert_eq!(
            entry_relative_path("a\\b/./c/"),
            Some(PathBuf::from("a").join("b").join("c"))
        );
    }

    #[test]
    fn rejects_escaping_names() {
        for raw in ["", "/etc/passwd", "\\share", "../x", "a/../../x", "C:/Windows", "./"] {
            assert_eq!(entry_relative_path(raw), None, "{raw:?}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn refuses_to_write_through_outside_link() {
        let outside = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let root = prepare_dest(dest.path()).unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("linked")).unwrap();

        let target = target_path(&root, "linked/payload.php").unwrap();
        let err = write_entry(
            &root,
            &target,
            EntryKind::File { size: 1, mode: None },
            &mut &b"x"[..],
        )
        .unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
        assert!(!outside.path().join("payload.php").exists());
    }
}
