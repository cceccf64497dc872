use crate::error::FleetError;
use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_STALE_AFTER_DAYS: u64 = 30;
pub const MAX_DEFAULT_CONCURRENCY: usize = 8;

/// Branch patterns guarded from local updates unless overridden.
pub const DEFAULT_PROTECTED_BRANCHES: &[&str] = &[
    "main",
    "master",
    "develop",
    "release/*",
    "release-*",
    "hotfix/*",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FleetConfig {
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Worker count; `None` picks `min(8, available parallelism)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// `None` uses [`DEFAULT_PROTECTED_BRANCHES`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected_branches: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_branch: Option<String>,
    #[serde(default)]
    pub local_update: LocalUpdateConfig,
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalUpdateConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_update_branches")]
    pub branches: Vec<String>,
    #[serde(default)]
    pub autostash: bool,
    #[serde(default)]
    pub push_when_ahead: bool,
}

impl Default for LocalUpdateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            branches: default_update_branches(),
            autostash: false,
            push_when_ahead: false,
        }
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            exclude: Vec::new(),
            follow_symlinks: false,
            concurrency: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            protected_branches: None,
            main_branch: None,
            local_update: LocalUpdateConfig::default(),
            stale_after_days: DEFAULT_STALE_AFTER_DAYS,
            inventory_path: None,
        }
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_stale_after_days() -> u64 {
    DEFAULT_STALE_AFTER_DAYS
}

fn default_update_branches() -> Vec<String> {
    vec!["*".to_string()]
}

impl FleetConfig {
    /// Missing file yields defaults; an unreadable or malformed file is fatal.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path).map_err(|err| FleetError::Config {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let config = serde_json::from_str(&data).map_err(|err| FleetError::Config {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create config directory")?;
        }
        let data = serde_json::to_string_pretty(self).context("serialize config")?;
        fs::write(path, data).context("write config")?;
        Ok(())
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
            .filter(|workers| *workers > 0)
            .unwrap_or_else(default_concurrency)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_days.saturating_mul(86_400))
    }

    /// Configured patterns plus the main-branch override.
    pub fn protected_patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = match &self.protected_branches {
            Some(patterns) => patterns.clone(),
            None => DEFAULT_PROTECTED_BRANCHES
                .iter()
                .map(|pattern| pattern.to_string())
                .collect(),
        };
        if let Some(main) = &self.main_branch
            && !patterns.contains(main)
        {
            patterns.push(main.clone());
        }
        patterns
    }

    pub fn inventory_path(&self) -> anyhow::Result<PathBuf> {
        match &self.inventory_path {
            Some(path) => Ok(path.clone()),
            None => default_inventory_path(),
        }
    }
}

pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_CONCURRENCY)
}

fn project_dirs() -> anyhow::Result<ProjectDirs> {
    ProjectDirs::from("dev", "fleet", "fleet").context("resolve project dirs")
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.json"))
}

pub fn default_inventory_path() -> anyhow::Result<PathBuf> {
    Ok(project_dirs()?.data_dir().join("inventory.json"))
}

pub fn default_audit_dir() -> anyhow::Result<PathBuf> {
    Ok(project_dirs()?.data_local_dir().join("audit"))
}
