#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use devsite_launcher::{
    AppError, ArchiveSource, CommandOutput, Launcher, LauncherConfig, Result, ToolRunner,
};
use tempfile::TempDir;

pub const ARCHIVE_URL: &str = "https://releases.test/cms-{version}.zip";
/// Tag every `FakeSource` reports as the newest stable release.
pub const LATEST_TAG: &str = "6.2.0";

/// In-memory stand-in for the container tool.
///
/// Keyed by instance directory name. `start`/`restart` mark an instance
/// running, `stop` marks it stopped and `describe` reports the current state.
#[derive(Default)]
pub struct FakeTool {
    states: Mutex<HashMap<String, &'static str>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
    start_delay: Mutex<Option<Duration>>,
}

impl FakeTool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_state(&self, name: &str, state: &'static str) {
        self.states.lock().unwrap().insert(name.to_string(), state);
    }

    /// Every invocation inside `name`'s directory fails from now on.
    pub fn fail_for(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    /// `start`/`restart` sleep this long before reporting success.
    pub fn delay_start(&self, delay: Duration) {
        *self.start_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands_for(&self, name: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(dir, _)| dir == name)
            .map(|(_, args)| args.join(" "))
            .collect()
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl ToolRunner for FakeTool {
    async fn run(&self, args: &[String], working_dir: &Path) -> Result<CommandOutput> {
        let name = dir_name(working_dir);
        self.calls
            .lock()
            .unwrap()
            .push((name.clone(), args.to_vec()));

        if self.failing.lock().unwrap().contains(&name) {
            return Err(AppError::command_failed(
                &format!("ddev {}", args.join(" ")),
                Some(1),
                "container runtime unavailable",
            ));
        }

        let stdout = match args.first().map(String::as_str) {
            Some("start" | "restart") => {
                let delay = *self.start_delay.lock().unwrap();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                self.set_state(&name, "running");
                String::new()
            }
            Some("stop") => {
                self.set_state(&name, "stopped");
                String::new()
            }
            Some("describe") => {
                let state = self
                    .states
                    .lock()
                    .unwrap()
                    .get(&name)
                    .copied()
                    .unwrap_or("stopped");
                format!(
                    "{{\"level\":\"info\",\"msg\":\"describing\"}}\n{}\n",
                    serde_json::json!({
                        "level": "info",
                        "raw": {
                            "status": state,
                            "httpsurl": format!("https://{name}.ddev.site"),
                            "httpurl": format!("http://{name}.ddev.site"),
                        }
                    })
                )
            }
            Some("version") => "ddev version v1.24.1\n".to_string(),
            _ => String::new(),
        };
        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
        })
    }
}

/// Serves a zip whose entries are given as (path, contents), or a fixed HTTP status.
pub struct FakeSource {
    entries: Vec<(String, String)>,
    status: Option<u16>,
    fetched: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn zip(entries: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            entries: entries
                .iter()
                .map(|(p, c)| ((*p).to_string(), (*c).to_string()))
                .collect(),
            status: None,
            fetched: Mutex::new(Vec::new()),
        })
    }

    pub fn status(status: u16) -> Arc<Self> {
        Arc::new(Self {
            entries: Vec::new(),
            status: Some(status),
            fetched: Mutex::new(Vec::new()),
        })
    }

    /// A release with its payload nested in a `cms-6.1/` folder.
    pub fn nested_release() -> Arc<Self> {
        Self::zip(&[
            ("cms-6.1/public/index.php", "<?php echo 'hello';"),
            ("cms-6.1/composer.json", "{}"),
        ])
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArchiveSource for FakeSource {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        self.fetched.lock().unwrap().push(url.to_string());
        if let Some(status) = self.status {
            return Err(AppError::download_status(url, status));
        }

        let file = File::create(dest)?;
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (path, contents) in &self.entries {
            writer.start_file(path.as_str(), options)?;
            writer.write_all(contents.as_bytes())?;
        }
        writer.finish()?;
        Ok(())
    }

    async fn latest_release(&self, _repo: &str) -> Result<String> {
        Ok(LATEST_TAG.to_string())
    }
}

pub struct Harness {
    pub launcher: Launcher,
    pub tool: Arc<FakeTool>,
    pub source: Arc<FakeSource>,
    pub root: PathBuf,
    _dir: TempDir,
}

pub fn harness(source: Arc<FakeSource>) -> Harness {
    harness_with(source, |_| {})
}

/// Like [`harness`], with a chance to adjust the config before wiring.
pub fn harness_with(source: Arc<FakeSource>, adjust: impl FnOnce(&mut LauncherConfig)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = LauncherConfig::with_root(dir.path().join("instances"));
    config.archive_url_template = ARCHIVE_URL.to_string();
    config.preferred_http_port = 38080;
    config.preferred_https_port = 38443;
    adjust(&mut config);

    let tool = FakeTool::new();
    let launcher = Launcher::with_collaborators(
        config,
        Arc::clone(&tool) as Arc<dyn ToolRunner>,
        Arc::clone(&source) as Arc<dyn ArchiveSource>,
    )
    .unwrap();
    let root = launcher.paths().root().to_path_buf();

    Harness {
        launcher,
        tool,
        source,
        root,
        _dir: dir,
    }
}

/// Lay down a registered instance by hand, as a previous run would have.
pub fn write_instance(root: &Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(dir.join(".ddev")).unwrap();
    std::fs::write(
        dir.join(".ddev").join("config.yaml"),
        format!(
            "name: {name}\ntype: php\ndocroot: public\nphp_version: '8.2'\n\
             webserver_type: apache-fpm\ndatabase:\n  type: mariadb\n  version: '10.11'\n"
        ),
    )
    .unwrap();
    dir
}
