//! Lifecycle manager for local, containerized CMS development sites.
//!
//! Each instance is a directory under a configured root holding the
//! application code and a descriptor for the external container tool.
//! The tool does the containers; this crate scaffolds, configures and asks
//! it for status.

mod archive;
mod config;
mod descriptor;
mod download;
mod error;
mod instance;
mod paths;
mod process;
mod structure;
mod validation;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub use archive::extract_archive;
pub use config::{
    default_config_path, load_config, save_config, DatabaseConfig, LauncherConfig, LATEST_RELEASE,
};
pub use descriptor::{
    generate, generate_env, generate_rewrite_rules, parse_descriptor, ConfigDocument,
    RuntimeDescriptor,
};
pub use download::{ArchiveSource, HttpArchiveFetcher};
pub use error::{AppError, ErrorKind, Result};
pub use instance::{
    map_status, parse_describe, CreationPipeline, CreationProgress, CreationRequest,
    CreationState, CreationStep, Instance, InstanceLifecycle, InstanceRegistry, InstanceStatus,
    ToolReport,
};
pub use paths::InstancePaths;
pub use process::{
    find_available_port, redact_args, redact_output, CommandExecutor, CommandOutput, PortAllocator,
    PortReservation, ToolRunner,
};
pub use structure::{NormalizeOutcome, StructureKind, StructureNormalizer};
pub use validation::validate_instance_name;

/// Entry point wiring every component from one [`LauncherConfig`].
#[derive(Clone)]
pub struct Launcher {
    config: Arc<LauncherConfig>,
    registry: InstanceRegistry,
    pipeline: CreationPipeline,
    lifecycle: InstanceLifecycle,
}

impl Launcher {
    /// Build a launcher that shells out to the configured tool and downloads over HTTPS.
    pub fn new(config: LauncherConfig) -> Result<Self> {
        let tool: Arc<dyn ToolRunner> = Arc::new(CommandExecutor::new(
            config.tool_binary.clone(),
            config.max_output_bytes,
        ));
        let source: Arc<dyn ArchiveSource> = Arc::new(HttpArchiveFetcher::new(
            Duration::from_secs(config.http_timeout_secs),
        )?);
        Self::with_collaborators(config, tool, source)
    }

    /// Build a launcher around caller-supplied tool and archive collaborators.
    pub fn with_collaborators(
        config: LauncherConfig,
        tool: Arc<dyn ToolRunner>,
        source: Arc<dyn ArchiveSource>,
    ) -> Result<Self> {
        let paths = InstancePaths::resolve(&config.instances_root)?;
        let config = Arc::new(config);
        let registry = InstanceRegistry::new(paths, Arc::clone(&tool), config.status_workers);
        let pipeline = CreationPipeline::new(
            Arc::clone(&config),
            registry.clone(),
            Arc::clone(&tool),
            source,
            PortAllocator::new(config.port_scan_limit),
        );
        let lifecycle = InstanceLifecycle::new(registry.clone(), tool);

        Ok(Self {
            config,
            registry,
            pipeline,
            lifecycle,
        })
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn paths(&self) -> &InstancePaths {
        self.registry.paths()
    }

    /// A creation request for `name` filled with the configured defaults.
    pub fn request(&self, name: &str, structure: StructureKind) -> CreationRequest {
        CreationRequest {
            name: name.to_string(),
            php_version: self.config.default_php_version.clone(),
            database: self.config.default_database.clone(),
            structure,
            release: None,
            additional_hostnames: Vec::new(),
        }
    }

    /// Create an instance. See [`CreationPipeline::create`] for failure behaviour.
    pub async fn create(
        &self,
        request: &CreationRequest,
        cancel: &CancellationToken,
    ) -> Result<Instance> {
        self.pipeline.create(request, cancel).await
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<CreationProgress> {
        self.pipeline.subscribe_progress()
    }

    pub async fn list(&self) -> Result<Vec<Instance>> {
        self.registry.list().await
    }

    pub async fn get(&self, name: &str) -> Result<Instance> {
        self.registry.get(name).await
    }

    pub async fn status(&self, name: &str) -> Result<InstanceStatus> {
        self.registry.status(name).await
    }

    pub async fn start(&self, name: &str) -> Result<Instance> {
        self.lifecycle.start(name).await
    }

    pub async fn stop(&self, name: &str) -> Result<Instance> {
        self.lifecycle.stop(name).await
    }

    pub async fn restart(&self, name: &str) -> Result<Instance> {
        self.lifecycle.restart(name).await
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.lifecycle.delete(name).await
    }

    pub async fn import_db(&self, name: &str, file: &Path) -> Result<()> {
        self.lifecycle.import_db(name, file).await
    }

    pub async fn export_db(&self, name: &str, file: &Path) -> Result<()> {
        self.lifecycle.export_db(name, file).await
    }

    pub async fn tool_version(&self) -> Result<String> {
        self.lifecycle.tool_version().await
    }
}
