//! Centralized path utilities for the launcher.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

/// Directory the external tool keeps its per-project files in.
pub const TOOL_DIR: &str = ".ddev";

/// Descriptor file name inside [`TOOL_DIR`].
pub const DESCRIPTOR_FILE: &str = "config.yaml";

/// Environment file at the instance root.
pub const ENV_FILE: &str = ".devsite.env";

/// Get the root data directory for the launcher (~/.devsite_launcher).
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".devsite_launcher")
}

pub fn default_instances_root() -> PathBuf {
    default_data_dir().join("instances")
}

/// Resolved locations for everything under the instances root.
///
/// Built once at startup; the root is never re-read afterwards.
#[derive(Debug, Clone)]
pub struct InstancePaths {
    root: PathBuf,
}

impl InstancePaths {
    /// Create the root if needed and pin it to an absolute path.
    pub fn resolve(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .map_err(|e| AppError::io(format!("Failed to create instances root {root:?}: {e}")))?;
        let root = root
            .canonicalize()
            .map_err(|e| AppError::io(format!("Failed to resolve instances root {root:?}: {e}")))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn instance_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.root.join(format!(".{name}.lock"))
    }
}

pub fn descriptor_path(instance_dir: &Path) -> PathBuf {
    instance_dir.join(TOOL_DIR).join(DESCRIPTOR_FILE)
}
