//! Download-then-merge pipeline orchestration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tcgp_core::{
    groups_url, merged_file_name, price_file_name, prices_csv_url, Group, GroupCatalog,
    AUTO_GROUPS, DEFAULT_API_BASE, DEFAULT_CATEGORY_ID,
};
use tcgp_merge::{merge_csv_files, MergeInputs, MergeStats};
use tcgp_storage::{
    remove_files, DownloadedFile, FetchError, HttpClientConfig, HttpFetcher, PriceFileStore,
};
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "tcgp-sync";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_base: String,
    pub category_id: u32,
    pub data_dir: PathBuf,
    pub results_dir: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub auto_groups: Vec<u32>,
    pub keep_downloads: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            category_id: DEFAULT_CATEGORY_ID,
            data_dir: PathBuf::from("./data"),
            results_dir: PathBuf::from("./results"),
            user_agent: "tcgp-bot/0.1".to_string(),
            http_timeout_secs: 20,
            auto_groups: AUTO_GROUPS.to_vec(),
            keep_downloads: false,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: std::env::var("TCGP_API_BASE").unwrap_or(defaults.api_base),
            category_id: std::env::var("TCGP_CATEGORY_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.category_id),
            data_dir: std::env::var("TCGP_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            results_dir: std::env::var("TCGP_RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.results_dir),
            user_agent: std::env::var("TCGP_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: std::env::var("TCGP_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            auto_groups: std::env::var("TCGP_AUTO_GROUPS")
                .ok()
                .map(|v| parse_group_ids(&v))
                .filter(|ids| !ids.is_empty())
                .unwrap_or(defaults.auto_groups),
            keep_downloads: std::env::var("TCGP_KEEP_DOWNLOADS")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(defaults.keep_downloads),
        }
    }
}

/// Parses a comma separated id list, skipping entries that are not numbers.
pub fn parse_group_ids(raw: &str) -> Vec<u32> {
    raw.split(',')
        .filter_map(|part| {
            let part = part.trim();
            match part.parse() {
                Ok(id) => Some(id),
                Err(_) if part.is_empty() => None,
                Err(_) => {
                    warn!(value = part, "ignoring non-numeric group id");
                    None
                }
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSelection {
    All,
    Auto,
    Only(Vec<u32>),
}

/// Resolve a selection against the catalog, keeping the requested order.
pub fn select_groups(
    catalog: &GroupCatalog,
    selection: &GroupSelection,
    auto_groups: &[u32],
) -> Vec<Group> {
    let wanted = match selection {
        GroupSelection::All => return catalog.results.clone(),
        GroupSelection::Auto => auto_groups,
        GroupSelection::Only(ids) => ids.as_slice(),
    };

    wanted
        .iter()
        .filter_map(|id| {
            let found = catalog.find(*id).cloned();
            if found.is_none() {
                warn!(group_id = id, "group id not found in catalog");
            }
            found
        })
        .collect()
}

/// Where groups come from and how their price files reach disk.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_groups(&self) -> Result<GroupCatalog, FetchError>;

    async fn download_group(&self, group: &Group, dest: &Path) -> Result<DownloadedFile, FetchError>;
}

pub struct TcgCsvSource {
    http: HttpFetcher,
    api_base: String,
    category_id: u32,
}

impl TcgCsvSource {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
        })?;
        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            category_id: config.category_id,
        })
    }
}

#[async_trait]
impl CatalogSource for TcgCsvSource {
    async fn fetch_groups(&self) -> Result<GroupCatalog, FetchError> {
        self.http
            .fetch_group_catalog(&groups_url(&self.api_base, self.category_id))
            .await
    }

    async fn download_group(&self, group: &Group, dest: &Path) -> Result<DownloadedFile, FetchError> {
        let url = prices_csv_url(&self.api_base, self.category_id, group.group_id);
        self.http.download_to(&url, dest).await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupFailure {
    pub group_id: u32,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeSummary {
    pub path: PathBuf,
    pub files: usize,
    pub input_rows: usize,
    pub output_rows: usize,
    pub columns: usize,
}

impl MergeSummary {
    fn new(path: PathBuf, stats: MergeStats) -> Self {
        Self {
            path,
            files: stats.files,
            input_rows: stats.input_rows,
            output_rows: stats.output_rows,
            columns: stats.columns,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub selected_groups: usize,
    pub downloaded: Vec<PathBuf>,
    pub failures: Vec<GroupFailure>,
    pub merged: Option<MergeSummary>,
    pub removed_sources: usize,
}

pub struct SyncPipeline {
    config: SyncConfig,
    store: PriceFileStore,
    source: Box<dyn CatalogSource>,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let source = TcgCsvSource::new(&config)?;
        Ok(Self::with_source(config, Box::new(source)))
    }

    pub fn with_source(config: SyncConfig, source: Box<dyn CatalogSource>) -> Self {
        let store = PriceFileStore::new(config.data_dir.clone());
        Self {
            config,
            store,
            source,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn fetch_groups(&self) -> Result<GroupCatalog> {
        self.source.fetch_groups().await.context("fetching group catalog")
    }

    pub async fn run_once(&self, selection: &GroupSelection) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        self.ensure_dirs().await?;

        let catalog = self.fetch_groups().await?;
        let groups = select_groups(&catalog, selection, &self.config.auto_groups);
        if groups.is_empty() {
            warn!(%run_id, "no groups to process");
        }

        let today = Local::now().date_naive();
        let mut downloaded = Vec::new();
        let mut failures = Vec::new();
        for group in &groups {
            let dest = self.store.path_for(&price_file_name(group, today));
            match self.source.download_group(group, &dest).await {
                Ok(file) => {
                    info!(group_id = group.group_id, path = %file.path.display(), "downloaded group prices");
                    downloaded.push(file.path);
                }
                Err(err) => {
                    warn!(group_id = group.group_id, %err, "failed to download group");
                    failures.push(GroupFailure {
                        group_id: group.group_id,
                        message: err.to_string(),
                    });
                }
            }
        }

        let mut merged = None;
        let mut removed_sources = 0;
        if downloaded.is_empty() {
            warn!(%run_id, "no csv files to merge");
        } else {
            let output = self
                .config
                .results_dir
                .join(merged_file_name(&Local::now()));
            let stats = merge_blocking(downloaded.clone(), output.clone()).await?;
            merged = Some(MergeSummary::new(output, stats));

            if self.config.keep_downloads {
                info!(files = downloaded.len(), "keeping downloaded source files");
            } else {
                removed_sources = remove_files(&downloaded).await.removed.len();
            }
        }

        Ok(SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            selected_groups: groups.len(),
            downloaded,
            failures,
            merged,
            removed_sources,
        })
    }

    /// Download a single group's price file without merging.
    pub async fn download_one(&self, group_id: u32) -> Result<DownloadedFile> {
        self.store.ensure_root().await?;
        let catalog = self.fetch_groups().await?;
        let Some(group) = catalog.find(group_id) else {
            bail!("group {group_id} not found in catalog");
        };
        self.download_group(group).await
    }

    pub async fn download_group(&self, group: &Group) -> Result<DownloadedFile> {
        self.store.ensure_root().await?;
        let dest = self
            .store
            .path_for(&price_file_name(group, Local::now().date_naive()));
        self.source
            .download_group(group, &dest)
            .await
            .with_context(|| format!("downloading group {}", group.display_label()))
    }

    async fn ensure_dirs(&self) -> Result<()> {
        self.store.ensure_root().await?;
        tokio::fs::create_dir_all(&self.config.results_dir)
            .await
            .with_context(|| format!("creating {}", self.config.results_dir.display()))
    }
}

/// Run the merge on the blocking pool.
pub async fn merge_blocking(inputs: Vec<PathBuf>, output: PathBuf) -> Result<MergeStats> {
    let inputs = MergeInputs::new(inputs)?;
    let stats = tokio::task::spawn_blocking(move || merge_csv_files(&inputs, &output))
        .await
        .context("merge task panicked")??;
    Ok(stats)
}

pub async fn run_sync_once_from_env(selection: &GroupSelection) -> Result<SyncRunSummary> {
    let pipeline = SyncPipeline::new(SyncConfig::from_env())?;
    pipeline.run_once(selection).await
}
