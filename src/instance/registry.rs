//! Instance enumeration and status reconciliation.

use std::ffi::OsStr;
use std::fs::{File, FileType};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use futures_util::stream::{self, StreamExt as _};

use super::run_blocking;
use super::status::{map_status, parse_describe, ToolReport};
use super::types::{Instance, InstanceStatus};
use crate::descriptor::{parse_descriptor, RuntimeDescriptor};
use crate::error::{AppError, Result};
use crate::paths::{descriptor_path, InstancePaths};
use crate::process::ToolRunner;
use crate::validation::validate_instance_name;

/// Reads instances from disk and asks the tool how each one is doing.
#[derive(Clone)]
pub struct InstanceRegistry {
    paths: InstancePaths,
    tool: Arc<dyn ToolRunner>,
    workers: usize,
}

impl InstanceRegistry {
    pub fn new(paths: InstancePaths, tool: Arc<dyn ToolRunner>, workers: usize) -> Self {
        Self {
            paths,
            tool,
            workers: workers.max(1),
        }
    }

    pub fn paths(&self) -> &InstancePaths {
        &self.paths
    }

    /// All instances under the root, sorted by name.
    ///
    /// Directories without a descriptor are not instances and are skipped.
    /// A failed status query shows up as `Error` on that instance only.
    pub async fn list(&self) -> Result<Vec<Instance>> {
        let mut candidates = Vec::new();
        let mut entries = tokio::fs::read_dir(self.paths.root()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = candidate_name(&entry.file_name(), entry.file_type().await) else {
                continue;
            };
            let dir = entry.path();
            if !tokio::fs::try_exists(descriptor_path(&dir))
                .await
                .unwrap_or(false)
            {
                log::debug!("Skipping {:?}: no descriptor", dir);
                continue;
            }
            candidates.push((name, dir));
        }

        let mut instances: Vec<Instance> = stream::iter(candidates)
            .map(|(name, dir)| async move {
                match load_descriptor(&dir).await {
                    Ok(descriptor) => Some(self.reconcile(dir, descriptor).await),
                    Err(e) => {
                        log::warn!("Skipping instance {}: unreadable descriptor: {}", name, e);
                        None
                    }
                }
            })
            .buffer_unordered(self.workers)
            .filter_map(|instance| async move { instance })
            .collect()
            .await;

        instances.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(instances)
    }

    /// Look up one instance and reconcile its status.
    pub async fn get(&self, name: &str) -> Result<Instance> {
        let dir = self.existing_instance_dir(name).await?;
        let descriptor = load_descriptor(&dir)
            .await
            .map_err(|e| e.with_instance(name))?;
        Ok(self.reconcile(dir, descriptor).await)
    }

    pub async fn status(&self, name: &str) -> Result<InstanceStatus> {
        Ok(self.get(name).await?.status)
    }

    /// Directory of a known instance, or `NotFound`.
    pub(crate) async fn existing_instance_dir(&self, name: &str) -> Result<PathBuf> {
        validate_instance_name(name)?;
        let dir = self.paths.instance_dir(name);
        if !tokio::fs::try_exists(descriptor_path(&dir))
            .await
            .unwrap_or(false)
        {
            return Err(AppError::not_found(name));
        }
        Ok(dir)
    }

    async fn query(&self, name: &str, dir: &Path) -> Option<ToolReport> {
        let args = vec!["describe".to_string(), "--json".to_string()];
        match self.tool.run(&args, dir).await {
            Ok(output) => {
                let report = parse_describe(&output.stdout);
                if report.is_none() {
                    log::warn!("Unparsable status report for instance {}", name);
                }
                report
            }
            Err(e) => {
                log::warn!("Status query failed for instance {}: {}", name, e);
                None
            }
        }
    }

    async fn reconcile(&self, dir: PathBuf, descriptor: RuntimeDescriptor) -> Instance {
        let report = self.query(&descriptor.name, &dir).await;
        let created_at = created_at(&dir).await;
        let mut instance = build_instance(dir, descriptor, report, created_at);
        if self.is_creating(&instance.name).await {
            instance.status = InstanceStatus::Creating;
        }
        instance
    }

    /// Whether a creation run still holds `name`'s lock file.
    pub(crate) async fn is_creating(&self, name: &str) -> bool {
        let lock_path = self.paths.lock_path(name);
        run_blocking(move || Ok(creation_in_progress(&lock_path)))
            .await
            .unwrap_or(false)
    }
}

fn creation_in_progress(lock_path: &Path) -> bool {
    match File::open(lock_path) {
        Ok(file) => FileExt::try_lock_shared(&file).is_err(),
        Err(_) => false,
    }
}

/// Name of a root entry that may hold an instance.
///
/// Only directories with a valid instance name qualify. An entry whose type
/// cannot be read is skipped so one bad entry does not sink the listing.
fn candidate_name(file_name: &OsStr, file_type: io::Result<FileType>) -> Option<String> {
    let name = file_name.to_str()?;
    match file_type {
        Ok(kind) if kind.is_dir() => {}
        Ok(_) => return None,
        Err(e) => {
            log::warn!("Skipping {:?}: cannot read entry type: {}", name, e);
            return None;
        }
    }
    validate_instance_name(name).ok()?;
    Some(name.to_string())
}

async fn load_descriptor(dir: &Path) -> Result<RuntimeDescriptor> {
    let dir = dir.to_path_buf();
    run_blocking(move || parse_descriptor(&dir)).await
}

async fn created_at(dir: &Path) -> Option<String> {
    let meta = tokio::fs::metadata(descriptor_path(dir)).await.ok()?;
    let modified = meta.modified().ok()?;
    Some(chrono::DateTime::<chrono::Utc>::from(modified).to_rfc3339())
}

fn build_instance(
    dir: PathBuf,
    descriptor: RuntimeDescriptor,
    report: Option<ToolReport>,
    created_at: Option<String>,
) -> Instance {
    let (status, tool_status, urls) = match report {
        Some(report) => (map_status(&report.status), Some(report.status), report.urls),
        None => (InstanceStatus::Error, None, Vec::new()),
    };
    let docroot = match descriptor.docroot() {
        "" => dir.clone(),
        sub => dir.join(sub),
    };

    Instance {
        name: descriptor.name,
        path: dir,
        php_version: descriptor.php_version,
        database: descriptor.database,
        structure: descriptor.structure,
        docroot,
        http_port: descriptor.http_port,
        https_port: descriptor.https_port,
        urls,
        status,
        tool_status,
        created_at,
    }
}
