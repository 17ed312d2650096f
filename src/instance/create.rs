//! Instance creation pipeline.
//!
//! Steps run strictly in [`CreationStep`] order. A failing step ends the run
//! in `Failed { at }` and its error is returned with `step` and `instance`
//! attached. Partially created directories are left on disk for inspection;
//! callers clean up with an explicit delete. A failed tool start is not
//! retried.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::registry::InstanceRegistry;
use super::run_blocking;
use super::types::{CreationProgress, CreationRequest, CreationState, CreationStep, Instance};
use crate::archive::extract_archive;
use crate::config::LauncherConfig;
use crate::descriptor::{
    generate, generate_env, generate_rewrite_rules, write_document, write_document_if_absent,
    RuntimeDescriptor,
};
use crate::download::ArchiveSource;
use crate::error::{AppError, Result};
use crate::process::{PortAllocator, PortReservation, ToolRunner};
use crate::structure::{NormalizeOutcome, StructureNormalizer};
use crate::validation::validate_instance_name;

const PROGRESS_CAPACITY: usize = 64;

/// Exclusive per-name lock file, released and removed on drop.
struct NameLock {
    _file: File,
    path: PathBuf,
}

impl NameLock {
    fn acquire(path: PathBuf, name: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| AppError::io(format!("Failed to open lock {path:?}: {e}")))?;
        if FileExt::try_lock_exclusive(&file).is_err() {
            log::warn!("Instance {} is already being created elsewhere", name);
            return Err(AppError::already_exists(name));
        }
        Ok(Self { _file: file, path })
    }
}

impl Drop for NameLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Failed to remove lock file {:?}: {}", self.path, e);
        }
    }
}

/// Mutable state carried from one step to the next.
struct CreationRun {
    dir: PathBuf,
    archive_url: String,
    descriptor: RuntimeDescriptor,
    archive_path: Option<PathBuf>,
    /// Held from scaffolding until reconciliation.
    lock: Option<NameLock>,
    ports: Vec<PortReservation>,
    normalized: Option<NormalizeOutcome>,
    instance: Option<Instance>,
}

/// Turns a [`CreationRequest`] into a running instance.
#[derive(Clone)]
pub struct CreationPipeline {
    config: Arc<LauncherConfig>,
    registry: InstanceRegistry,
    tool: Arc<dyn ToolRunner>,
    source: Arc<dyn ArchiveSource>,
    ports: PortAllocator,
    normalizer: Arc<StructureNormalizer>,
    progress: broadcast::Sender<CreationProgress>,
}

impl CreationPipeline {
    pub fn new(
        config: Arc<LauncherConfig>,
        registry: InstanceRegistry,
        tool: Arc<dyn ToolRunner>,
        source: Arc<dyn ArchiveSource>,
        ports: PortAllocator,
    ) -> Self {
        let normalizer = Arc::new(StructureNormalizer::new(
            config.entry_point.clone(),
            config.payload_prefixes.clone(),
        ));
        let (progress, _) = broadcast::channel(PROGRESS_CAPACITY);
        Self {
            config,
            registry,
            tool,
            source,
            ports,
            normalizer,
            progress,
        }
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<CreationProgress> {
        self.progress.subscribe()
    }

    fn emit(&self, instance: &str, state: CreationState, message: impl Into<String>) {
        let _ = self.progress.send(CreationProgress {
            instance: instance.to_string(),
            state,
            message: message.into(),
        });
    }

    /// Create an instance.
    ///
    /// Cancellation is honoured between steps only; a step already running,
    /// including a tool invocation, is allowed to finish.
    pub async fn create(
        &self,
        request: &CreationRequest,
        cancel: &CancellationToken,
    ) -> Result<Instance> {
        let name = request.name.as_str();
        validate_instance_name(name)?;
        let archive_url = self
            .resolve_archive_url(request)
            .await
            .map_err(|e| e.with_instance(name))?;

        let mut run = CreationRun {
            dir: self.registry.paths().instance_dir(name),
            archive_url,
            descriptor: RuntimeDescriptor {
                name: name.to_string(),
                php_version: request.php_version.clone(),
                structure: request.structure,
                database: request.database.clone(),
                http_port: None,
                https_port: None,
                additional_hostnames: request.additional_hostnames.clone(),
            },
            archive_path: None,
            lock: None,
            ports: Vec::new(),
            normalized: None,
            instance: None,
        };

        log::info!(
            "Creating instance {} (php {}, {} {}, {})",
            name,
            request.php_version,
            request.database.engine,
            request.database.version,
            request.structure
        );

        let mut step = CreationStep::FIRST;
        loop {
            if cancel.is_cancelled() {
                log::warn!("Creation of {} cancelled before {}", name, step);
                self.emit(name, CreationState::Failed { at: step }, "cancelled");
                return Err(AppError::cancelled()
                    .with_instance(name)
                    .at_step(step.as_str()));
            }

            self.emit(name, CreationState::Running { step }, step.as_str());
            if let Err(e) = self.execute(step, &mut run).await {
                let e = e.with_instance(name).at_step(step.as_str());
                log::error!("Creation of {} failed at {}: {}", name, step, e);
                self.emit(name, CreationState::Failed { at: step }, e.to_string());
                return Err(e);
            }

            match step.next() {
                Some(next) => step = next,
                None => break,
            }
        }

        let instance = run
            .instance
            .take()
            .ok_or_else(|| AppError::other("reconciliation produced no instance"))?;
        let ports: Vec<u16> = run.ports.iter().map(PortReservation::port).collect();
        log::info!(
            "Instance {} created ({}, ports {:?}, layout {:?})",
            name,
            instance.status,
            ports,
            run.normalized
        );
        self.emit(name, CreationState::Done, instance.status.to_string());
        Ok(instance)
    }

    /// Work out the archive URL before anything touches disk.
    async fn resolve_archive_url(&self, request: &CreationRequest) -> Result<String> {
        let release = request
            .release
            .clone()
            .unwrap_or_else(|| self.config.default_release.clone());
        // Template errors are reported ahead of release lookup failures.
        self.config.archive_url(&release)?;
        if !LauncherConfig::is_latest(&release) {
            return self.config.archive_url(&release);
        }

        let repo = self.config.release_repo.trim();
        if repo.is_empty() {
            return Err(AppError::config(
                "release \"latest\" needs release_repo; pass an explicit release instead",
            ));
        }
        let tag = self.source.latest_release(repo).await?;
        self.config.archive_url(&tag)
    }

    async fn execute(&self, step: CreationStep, run: &mut CreationRun) -> Result<()> {
        match step {
            CreationStep::Scaffolding => self.scaffold(run).await,
            CreationStep::Fetching => self.fetch(run).await,
            CreationStep::Extracting => self.extract(run).await,
            CreationStep::Normalizing => self.normalize(run).await,
            CreationStep::ConfigWriting => self.write_config(run).await,
            CreationStep::PortAllocating => self.allocate_ports(run).await,
            CreationStep::ToolStarting => self.start_tool(run).await,
            CreationStep::Reconciling => self.reconcile(run).await,
        }
    }

    async fn scaffold(&self, run: &mut CreationRun) -> Result<()> {
        let name = run.descriptor.name.clone();
        let lock_path = self.registry.paths().lock_path(&name);
        let dir = run.dir.clone();

        let lock = run_blocking(move || {
            if dir.exists() {
                return Err(AppError::already_exists(&name));
            }
            let lock = NameLock::acquire(lock_path, &name)?;
            if dir.exists() {
                return Err(AppError::already_exists(&name));
            }
            fs::create_dir_all(&dir)
                .map_err(|e| AppError::io(format!("Failed to create {dir:?}: {e}")))?;
            Ok(lock)
        })
        .await?;

        run.lock = Some(lock);
        Ok(())
    }

    async fn fetch(&self, run: &mut CreationRun) -> Result<()> {
        let archive_path = run
            .dir
            .join(format!(".download-{}.archive", uuid::Uuid::new_v4()));
        self.source.fetch(&run.archive_url, &archive_path).await?;
        run.archive_path = Some(archive_path);
        Ok(())
    }

    async fn extract(&self, run: &mut CreationRun) -> Result<()> {
        let archive_path = run
            .archive_path
            .take()
            .ok_or_else(|| AppError::other("no archive was fetched"))?;
        let dir = run.dir.clone();
        run_blocking(move || extract_archive(&archive_path, &dir)).await
    }

    async fn normalize(&self, run: &mut CreationRun) -> Result<()> {
        let normalizer = Arc::clone(&self.normalizer);
        let dir = run.dir.clone();
        let layout = run.descriptor.structure;
        let outcome = run_blocking(move || normalizer.normalize(&dir, layout)).await?;
        if let NormalizeOutcome::Warning { message } = &outcome {
            self.emit(
                &run.descriptor.name,
                CreationState::Running {
                    step: CreationStep::Normalizing,
                },
                message.clone(),
            );
        }
        run.normalized = Some(outcome);
        Ok(())
    }

    async fn write_config(&self, run: &CreationRun) -> Result<()> {
        let descriptor = run.descriptor.clone();
        let dir = run.dir.clone();
        let entry_point = self.config.entry_point.clone();
        run_blocking(move || {
            write_documents(&dir, &descriptor)?;
            if let Some(path) =
                write_document_if_absent(&dir, &generate_rewrite_rules(&descriptor, &entry_point))?
            {
                log::debug!("Wrote rewrite rules to {:?}", path);
            }
            Ok(())
        })
        .await
    }

    async fn allocate_ports(&self, run: &mut CreationRun) -> Result<()> {
        let ports = self.ports.clone();
        let preferred = (
            self.config.preferred_http_port,
            self.config.preferred_https_port,
        );
        let (http, https) =
            run_blocking(move || Ok((ports.reserve(preferred.0)?, ports.reserve(preferred.1)?)))
                .await?;
        log::info!(
            "Instance {} ports: http {}, https {}",
            run.descriptor.name,
            http.port(),
            https.port()
        );

        run.descriptor.http_port = Some(http.port());
        run.descriptor.https_port = Some(https.port());
        run.ports.push(http);
        run.ports.push(https);

        let descriptor = run.descriptor.clone();
        let dir = run.dir.clone();
        run_blocking(move || write_documents(&dir, &descriptor)).await
    }

    async fn start_tool(&self, run: &CreationRun) -> Result<()> {
        self.tool
            .run(&["start".to_string()], &run.dir)
            .await
            .map(|_| ())
    }

    async fn reconcile(&self, run: &mut CreationRun) -> Result<()> {
        // Readers report `Creating` while the lock is held.
        drop(run.lock.take());
        let instance = self.registry.get(&run.descriptor.name).await?;
        run.instance = Some(instance);
        Ok(())
    }
}

/// Write the descriptor and env file for `descriptor` into `dir`.
fn write_documents(dir: &Path, descriptor: &RuntimeDescriptor) -> Result<()> {
    write_document(dir, &generate(descriptor)?)?;
    write_document(dir, &generate_env(descriptor))?;
    Ok(())
}
