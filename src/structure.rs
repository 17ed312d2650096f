//! Reconciles an extracted release tree with the expected directory layout.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Where the application's public entry point lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructureKind {
    /// Entry point at the instance root.
    Flat,
    /// Entry point under `public/`.
    NestedPublic,
}

impl StructureKind {
    /// Document root relative to the instance directory ("" for the root itself).
    pub fn docroot(&self) -> &'static str {
        match self {
            Self::Flat => "",
            Self::NestedPublic => "public",
        }
    }

    pub fn from_docroot(docroot: &str) -> Self {
        match docroot.trim_matches('/') {
            "public" => Self::NestedPublic,
            _ => Self::Flat,
        }
    }

    pub fn entry_point_path(&self, instance_dir: &Path, entry_point: &str) -> PathBuf {
        let docroot = self.docroot();
        if docroot.is_empty() {
            instance_dir.join(entry_point)
        } else {
            instance_dir.join(docroot).join(entry_point)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::NestedPublic => "nested-public",
        }
    }
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StructureKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "flat" => Ok(Self::Flat),
            "nested-public" => Ok(Self::NestedPublic),
            other => Err(AppError::config(format!("unknown layout {other:?}"))),
        }
    }
}

/// Result of a normalization pass that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeOutcome {
    /// Entry point was already where the layout expects it.
    InPlace,
    /// Payload was lifted out of the named subdirectory.
    Lifted { from: String },
    /// Entry point is missing and no payload folder matched; tree left untouched.
    Warning { message: String },
}

/// Normalizes extracted trees against a fixed entry point and payload prefixes.
pub struct StructureNormalizer {
    entry_point: String,
    payload_prefixes: Vec<String>,
}

impl StructureNormalizer {
    pub fn new(entry_point: impl Into<String>, payload_prefixes: Vec<String>) -> Self {
        Self {
            entry_point: entry_point.into(),
            payload_prefixes,
        }
    }

    pub fn normalize(&self, instance_dir: &Path, layout: StructureKind) -> Result<NormalizeOutcome> {
        let expected = layout.entry_point_path(instance_dir, &self.entry_point);
        if expected.is_file() {
            return Ok(NormalizeOutcome::InPlace);
        }

        let Some(payload_dir) = self.find_payload_dir(instance_dir)? else {
            let message = format!(
                "{} not found at {:?} and no payload folder matches {:?}",
                self.entry_point, expected, self.payload_prefixes
            );
            log::warn!("{}", message);
            return Ok(NormalizeOutcome::Warning { message });
        };

        let from = payload_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        lift_children(instance_dir, &payload_dir)?;
        log::info!("Lifted payload folder {:?} into {:?}", from, instance_dir);

        if !expected.is_file() {
            log::warn!(
                "{} still missing at {:?} after lifting {:?}",
                self.entry_point,
                expected,
                from
            );
        }
        Ok(NormalizeOutcome::Lifted { from })
    }

    fn find_payload_dir(&self, instance_dir: &Path) -> Result<Option<PathBuf>> {
        let mut candidates = Vec::new();
        for entry in fs::read_dir(instance_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if self
                .payload_prefixes
                .iter()
                .any(|prefix| !prefix.is_empty() && name.starts_with(prefix.as_str()))
            {
                candidates.push(entry.path());
            }
        }
        candidates.sort();
        Ok(candidates.into_iter().next())
    }
}

/// Move every child of `payload_dir` into `instance_dir` and remove the emptied folder.
fn lift_children(instance_dir: &Path, payload_dir: &Path) -> Result<()> {
    // Step aside first so a child sharing the folder's own name can land.
    let staging = instance_dir.join(format!(".normalize-{}", uuid::Uuid::new_v4()));
    fs::rename(payload_dir, &staging)
        .map_err(|e| AppError::io(format!("Failed to stage {payload_dir:?}: {e}")))?;

    for entry in fs::read_dir(&staging)? {
        let entry = entry?;
        let target = instance_dir.join(entry.file_name());
        if target.exists() {
            return Err(AppError::io(format!(
                "Cannot lift {:?}: {:?} already exists",
                entry.path(),
                target
            )));
        }
        fs::rename(entry.path(), &target)
            .map_err(|e| AppError::io(format!("Failed to move {:?}: {e}", entry.path())))?;
    }

    fs::remove_dir(&staging)
        .map_err(|e| AppError::io(format!("Failed to remove {staging:?}: {e}")))
}
