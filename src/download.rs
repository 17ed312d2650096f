use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt as _;
use reqwest::Client;
use serde::Deserialize;
use tokio::io::AsyncWriteExt as _;

use crate::error::{AppError, Result};

const USER_AGENT: &str = "devsite-launcher";
const GITHUB_API: &str = "https://api.github.com";

/// Somewhere release archives can be fetched from.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Fetch `url` into `dest`, creating parent directories as needed.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()>;

    /// Tag of the newest stable release published for `repo` (`owner/name`).
    async fn latest_release(&self, repo: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    draft: bool,
}

/// Streams release archives over HTTPS and looks releases up on GitHub.
pub struct HttpArchiveFetcher {
    client: Client,
    api_base: String,
}

impl HttpArchiveFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            api_base: GITHUB_API.to_string(),
        }
    }

    /// Use another GitHub-compatible API root, e.g. a mirror.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl ArchiveSource for HttpArchiveFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        download_file(&self.client, url, dest).await
    }

    async fn latest_release(&self, repo: &str) -> Result<String> {
        let url = format!("{}/repos/{}/releases?per_page=30", self.api_base, repo);
        let resp = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await
            .map_err(|e| AppError::download(&url, e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AppError::download_status(&url, resp.status().as_u16()));
        }

        let releases: Vec<GitHubRelease> = resp
            .json()
            .await
            .map_err(|e| AppError::download(&url, format!("Failed to parse releases: {e}")))?;
        let tag = releases
            .into_iter()
            .find(|r| !r.prerelease && !r.draft)
            .map(|r| r.tag_name)
            .ok_or_else(|| AppError::download(&url, format!("no stable release for {repo}")))?;
        log::info!("Latest release of {} is {}", repo, tag);
        Ok(tag)
    }
}

pub async fn download_file(client: &Client, url: &str, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::io(e.to_string()))?;
    }

    log::info!("Downloading {} -> {:?}", url, dest);

    let resp = client
        .get(url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|e| AppError::download(url, e.to_string()))?;

    if !resp.status().is_success() {
        return Err(AppError::download_status(url, resp.status().as_u16()));
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| AppError::io(e.to_string()))?;

    let mut stream = resp.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| AppError::download(url, e.to_string()))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| AppError::io(e.to_string()))?;
    }
    file.flush().await.map_err(|e| AppError::io(e.to_string()))?;

    Ok(())
}
