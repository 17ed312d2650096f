//! Start/stop/restart/delete and database transfer for existing instances.
//!
//! Every state change is delegated to the tool; status is only read back
//! afterwards with one reconciliation pass.

use std::path::Path;
use std::sync::Arc;

use super::registry::InstanceRegistry;
use super::types::Instance;
use crate::error::{AppError, Result};
use crate::paths::descriptor_path;
use crate::process::ToolRunner;
use crate::validation::validate_instance_name;

#[derive(Clone)]
pub struct InstanceLifecycle {
    registry: InstanceRegistry,
    tool: Arc<dyn ToolRunner>,
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_string()).collect()
}

impl InstanceLifecycle {
    pub fn new(registry: InstanceRegistry, tool: Arc<dyn ToolRunner>) -> Self {
        Self { registry, tool }
    }

    async fn run_for(&self, name: &str, command: Vec<String>) -> Result<Instance> {
        let dir = self.registry.existing_instance_dir(name).await?;
        self.tool
            .run(&command, &dir)
            .await
            .map_err(|e| e.with_instance(name))?;
        self.registry.get(name).await
    }

    pub async fn start(&self, name: &str) -> Result<Instance> {
        log::info!("Starting instance {}", name);
        self.run_for(name, args(&["start"])).await
    }

    pub async fn stop(&self, name: &str) -> Result<Instance> {
        log::info!("Stopping instance {}", name);
        self.run_for(name, args(&["stop"])).await
    }

    pub async fn restart(&self, name: &str) -> Result<Instance> {
        log::info!("Restarting instance {}", name);
        self.run_for(name, args(&["restart"])).await
    }

    /// Import a database dump into the instance.
    ///
    /// Relative paths are taken from the caller's working directory, not
    /// the instance directory the tool runs in.
    pub async fn import_db(&self, name: &str, file: &Path) -> Result<()> {
        self.transfer_db(name, "import-db", file).await
    }

    /// Export the instance database to `file`.
    pub async fn export_db(&self, name: &str, file: &Path) -> Result<()> {
        self.transfer_db(name, "export-db", file).await
    }

    async fn transfer_db(&self, name: &str, subcommand: &str, file: &Path) -> Result<()> {
        let dir = self.registry.existing_instance_dir(name).await?;
        let file = std::path::absolute(file)
            .map_err(|e| AppError::io(format!("Failed to resolve {file:?}: {e}")))?;
        let command = vec![subcommand.to_string(), format!("--file={}", file.display())];
        self.tool
            .run(&command, &dir)
            .await
            .map(|_| ())
            .map_err(|e| e.with_instance(name))
    }

    /// Version report of the tool itself.
    pub async fn tool_version(&self) -> Result<String> {
        let output = self
            .tool
            .run(&args(&["version"]), self.registry.paths().root())
            .await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Deregister the instance from the tool and remove its directory.
    ///
    /// Both halves always run. If exactly one fails the result is
    /// `PartialDeleteFailure`; if both fail nothing was deleted and the
    /// deregistration error is returned with the disk error attached. A
    /// directory without a descriptor was never registered, so only the disk
    /// half applies. An instance still being created is left alone.
    pub async fn delete(&self, name: &str) -> Result<()> {
        validate_instance_name(name)?;
        let dir = self.registry.paths().instance_dir(name);
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(AppError::not_found(name));
        }
        if self.registry.is_creating(name).await {
            log::warn!("Refusing to delete {} while it is being created", name);
            return Err(AppError::busy(name));
        }

        log::info!("Deleting instance {}", name);

        let deregister_error = if tokio::fs::try_exists(descriptor_path(&dir))
            .await
            .unwrap_or(false)
        {
            self.tool
                .run(&args(&["delete", "--omit-snapshot", "--yes"]), &dir)
                .await
                .err()
        } else {
            log::info!("Instance {} has no descriptor, skipping deregistration", name);
            None
        };
        if let Some(e) = &deregister_error {
            log::warn!("Deregistration of {} failed: {}", name, e);
        }

        let disk_error = tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|e| AppError::io(format!("Failed to remove {dir:?}: {e}")))
            .err();
        if let Some(e) = &disk_error {
            log::error!("Removing directory of {} failed: {}", name, e);
        }

        delete_outcome(name, deregister_error, disk_error)
    }
}

fn delete_outcome(
    name: &str,
    deregister: Option<AppError>,
    disk: Option<AppError>,
) -> Result<()> {
    match (deregister, disk) {
        (None, None) => Ok(()),
        (Some(deregister), Some(disk)) => Err(deregister
            .with_instance(name)
            .with_context("disk", disk.to_string())),
        (deregister, disk) => Err(AppError::partial_delete(
            name,
            deregister.as_ref(),
            disk.as_ref(),
        )),
    }
}
