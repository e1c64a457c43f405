//! HTTP fetch + local price-file storage for the TCG price tracker.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use sha2::{Digest, Sha256};
use tcgp_core::GroupCatalog;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "tcgp-storage";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A price file that landed on disk in full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub byte_size: u64,
    pub content_hash: String,
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    async fn get_ok(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }
        Ok(resp)
    }

    pub async fn fetch_group_catalog(&self, url: &str) -> Result<GroupCatalog, FetchError> {
        let span = info_span!("fetch_groups", url);
        async {
            let resp = self.get_ok(url).await?;
            let catalog: GroupCatalog = resp.json().await?;
            info!(groups = catalog.results.len(), "fetched group catalog");
            Ok(catalog)
        }
        .instrument(span)
        .await
    }

    /// Stream `url` into `dest` through a temp file in the same directory.
    ///
    /// `dest` only appears once the whole body has been written and flushed.
    pub async fn download_to(&self, url: &str, dest: &Path) -> Result<DownloadedFile, FetchError> {
        let span = info_span!("download_csv", url, dest = %dest.display());
        async {
            let parent = dest
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let temp_path = parent.join(format!(".{}.part", Uuid::new_v4()));

            match self.stream_into(url, &temp_path).await {
                Ok((byte_size, content_hash)) => {
                    if let Err(err) = fs::rename(&temp_path, dest).await {
                        discard_temp(&temp_path).await;
                        return Err(FetchError::io(dest, err));
                    }
                    info!(bytes = byte_size, "csv saved");
                    Ok(DownloadedFile {
                        path: dest.to_path_buf(),
                        byte_size,
                        content_hash,
                    })
                }
                Err(err) => {
                    discard_temp(&temp_path).await;
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn stream_into(&self, url: &str, temp_path: &Path) -> Result<(u64, String), FetchError> {
        let mut resp = self.get_ok(url).await?;

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(temp_path)
            .await
            .map_err(|e| FetchError::io(temp_path, e))?;

        let mut hasher = Sha256::new();
        let mut byte_size = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            hasher.update(&chunk);
            byte_size += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::io(temp_path, e))?;
        }
        file.flush().await.map_err(|e| FetchError::io(temp_path, e))?;

        Ok((byte_size, hex::encode(hasher.finalize())))
    }
}

async fn discard_temp(path: &Path) {
    if fs::try_exists(path).await.unwrap_or(false) {
        let _ = fs::remove_file(path).await;
    }
}

/// Directory holding downloaded per-group price files.
#[derive(Debug, Clone)]
pub struct PriceFileStore {
    root: PathBuf,
}

impl PriceFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    pub async fn ensure_root(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating directory {}", self.root.display()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub removed: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Delete each path that still exists. Never stops at the first failure.
pub async fn remove_files(paths: &[PathBuf]) -> RemovalReport {
    let mut report = RemovalReport::default();
    for path in paths {
        match fs::try_exists(path).await {
            Ok(true) => match fs::remove_file(path).await {
                Ok(()) => report.removed.push(path.clone()),
                Err(err) => {
                    error!(path = %path.display(), %err, "failed to delete file");
                    report.failed.push(path.clone());
                }
            },
            Ok(false) => {
                warn!(path = %path.display(), "file not found");
                report.missing.push(path.clone());
            }
            Err(err) => {
                error!(path = %path.display(), %err, "failed to stat file");
                report.failed.push(path.clone());
            }
        }
    }
    report
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
