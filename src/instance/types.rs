//! Instance-related type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::DatabaseConfig;
use crate::structure::StructureKind;

/// Coarse instance status. Never stored; recomputed from the tool on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Creation pipeline still running.
    Creating,
    Running,
    Stopped,
    Error,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Creating => "creating",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// A managed development site as seen by one reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub path: PathBuf,
    pub php_version: String,
    pub database: DatabaseConfig,
    pub structure: StructureKind,
    pub docroot: PathBuf,
    pub http_port: Option<u16>,
    pub https_port: Option<u16>,
    /// URLs in the order the tool reported them.
    pub urls: Vec<String>,
    pub status: InstanceStatus,
    /// Raw status string from the tool, when it answered.
    pub tool_status: Option<String>,
    pub created_at: Option<String>,
}

impl Instance {
    /// First HTTPS URL if any, otherwise the first URL.
    pub fn primary_url(&self) -> Option<&str> {
        self.urls
            .iter()
            .find(|url| url.starts_with("https://"))
            .or_else(|| self.urls.first())
            .map(String::as_str)
    }
}

/// Parameters for creating a new instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreationRequest {
    pub name: String,
    pub php_version: String,
    pub database: DatabaseConfig,
    pub structure: StructureKind,
    /// Release to download; the configured default when `None`.
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub additional_hostnames: Vec<String>,
}

/// Creation pipeline states, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationStep {
    Scaffolding,
    Fetching,
    Extracting,
    Normalizing,
    ConfigWriting,
    PortAllocating,
    ToolStarting,
    Reconciling,
}

impl CreationStep {
    pub const FIRST: Self = Self::Scaffolding;

    /// The step that follows this one, or `None` after the last.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Scaffolding => Some(Self::Fetching),
            Self::Fetching => Some(Self::Extracting),
            Self::Extracting => Some(Self::Normalizing),
            Self::Normalizing => Some(Self::ConfigWriting),
            Self::ConfigWriting => Some(Self::PortAllocating),
            Self::PortAllocating => Some(Self::ToolStarting),
            Self::ToolStarting => Some(Self::Reconciling),
            Self::Reconciling => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scaffolding => "scaffolding",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Normalizing => "normalizing",
            Self::ConfigWriting => "config_writing",
            Self::PortAllocating => "port_allocating",
            Self::ToolStarting => "tool_starting",
            Self::Reconciling => "reconciling",
        }
    }
}

impl fmt::Display for CreationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a creation run stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CreationState {
    Running { step: CreationStep },
    Done,
    Failed { at: CreationStep },
}

/// Creation progress event payload.
#[derive(Debug, Clone, Serialize)]
pub struct CreationProgress {
    pub instance: String,
    pub state: CreationState,
    pub message: String,
}
