use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::paths::{default_data_dir, default_instances_root};

/// Launcher settings. Loaded once at startup and handed to every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    #[serde(default = "default_instances_root")]
    pub instances_root: PathBuf,
    #[serde(default = "default_tool_binary")]
    pub tool_binary: String,
    /// Release archive URL; `{version}` is replaced with the release tag.
    #[serde(default = "default_archive_url_template")]
    pub archive_url_template: String,
    /// GitHub `owner/name` whose newest stable release `latest` resolves to.
    #[serde(default = "default_release_repo")]
    pub release_repo: String,
    #[serde(default = "default_release")]
    pub default_release: String,
    /// Directory name prefixes a release archive may nest its payload under.
    #[serde(default = "default_payload_prefixes")]
    pub payload_prefixes: Vec<String>,
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
    #[serde(default = "default_php_version")]
    pub default_php_version: String,
    #[serde(default)]
    pub default_database: DatabaseConfig,
    #[serde(default = "default_http_port")]
    pub preferred_http_port: u16,
    #[serde(default = "default_https_port")]
    pub preferred_https_port: u16,
    #[serde(default = "default_port_scan_limit")]
    pub port_scan_limit: u32,
    #[serde(default = "default_status_workers")]
    pub status_workers: usize,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub engine: String,
    pub version: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: "mariadb".to_string(),
            version: "11.4".to_string(),
        }
    }
}

fn default_tool_binary() -> String {
    "ddev".to_string()
}

/// Release name resolved to the newest stable tag of `release_repo`.
pub const LATEST_RELEASE: &str = "latest";

fn default_archive_url_template() -> String {
    "https://github.com/statamic/statamic/archive/refs/tags/{version}.zip".to_string()
}

fn default_release_repo() -> String {
    "statamic/statamic".to_string()
}

fn default_release() -> String {
    LATEST_RELEASE.to_string()
}

fn default_payload_prefixes() -> Vec<String> {
    vec![
        "statamic-".to_string(),
        "cms-".to_string(),
        "release-".to_string(),
    ]
}

fn default_entry_point() -> String {
    "index.php".to_string()
}

fn default_php_version() -> String {
    "8.3".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_https_port() -> u16 {
    8443
}

fn default_port_scan_limit() -> u32 {
    1000
}

fn default_status_workers() -> usize {
    4
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

fn default_http_timeout_secs() -> u64 {
    300
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            instances_root: default_instances_root(),
            tool_binary: default_tool_binary(),
            archive_url_template: default_archive_url_template(),
            release_repo: default_release_repo(),
            default_release: default_release(),
            payload_prefixes: default_payload_prefixes(),
            entry_point: default_entry_point(),
            default_php_version: default_php_version(),
            default_database: DatabaseConfig::default(),
            preferred_http_port: default_http_port(),
            preferred_https_port: default_https_port(),
            port_scan_limit: default_port_scan_limit(),
            status_workers: default_status_workers(),
            max_output_bytes: default_max_output_bytes(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl LauncherConfig {
    /// Config rooted at `instances_root`, everything else default.
    pub fn with_root(instances_root: impl Into<PathBuf>) -> Self {
        Self {
            instances_root: instances_root.into(),
            ..Self::default()
        }
    }

    pub fn archive_url(&self, release: &str) -> Result<String> {
        if self.archive_url_template.trim().is_empty() {
            return Err(AppError::config("archive_url_template is not configured"));
        }
        if release.trim().is_empty() {
            return Err(AppError::config("release must not be empty"));
        }
        Ok(self.archive_url_template.replace("{version}", release))
    }

    /// Whether `release` names the newest stable release rather than a tag.
    pub fn is_latest(release: &str) -> bool {
        release.trim().eq_ignore_ascii_case(LATEST_RELEASE)
    }
}

/// Path of the config file used when none is given on the command line.
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

/// Load the config at `path`, writing a default file first if it does not exist.
pub fn load_config(path: &Path) -> Result<LauncherConfig> {
    if !path.exists() {
        let config = LauncherConfig::default();
        save_config(path, &config)?;
        return Ok(config);
    }
    let content = fs::read_to_string(path).map_err(|e| AppError::config(e.to_string()))?;
    toml::from_str(&content).map_err(|e| AppError::config(e.to_string()))
}

pub fn save_config(path: &Path, config: &LauncherConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AppError::io(e.to_string()))?;
    }
    let content = toml::to_string_pretty(config).map_err(|e| AppError::config(e.to_string()))?;
    fs::write(path, content).map_err(|e| AppError::config(e.to_string()))
}
