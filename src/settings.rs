//! Engine configuration
//!
//! A [`Settings`] value is constructed explicitly (from a YAML file or in
//! code) and passed into the resolver and orchestrator; there is no ambient
//! global configuration. It carries the repository list, the target and
//! download cache directories, and the download/elevation tunables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::download::{Repository, RepositoryCategory};
use crate::error::{Result, config_not_found, config_parse_failed};

fn default_pool_size() -> usize {
    4
}

fn default_attempt_timeout_secs() -> u64 {
    30
}

fn default_auth_retry_limit() -> usize {
    1
}

fn default_helper_command() -> Vec<String> {
    vec!["sudo".to_string(), "instack-helper".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Installation target directory; all engine state is scoped to it
    pub target_dir: PathBuf,

    /// Download cache; defaults to `<target>/.instack/cache`
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Known repositories, in priority order. Archives are fetched from
    /// the first enabled repository; later entries are not consulted as
    /// fallbacks.
    #[serde(default)]
    pub repositories: Vec<Repository>,

    /// Concurrent download worker bound
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Per-fetch-attempt timeout in seconds
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// How many times an authentication challenge is retried with the
    /// supplied credentials before failing permanently
    #[serde(default = "default_auth_retry_limit")]
    pub auth_retry_limit: usize,

    /// Command used to spawn the privileged helper process
    #[serde(default = "default_helper_command")]
    pub helper_command: Vec<String>,
}

impl Settings {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            cache_dir: None,
            repositories: Vec::new(),
            pool_size: default_pool_size(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            auth_retry_limit: default_auth_retry_limit(),
            helper_command: default_helper_command(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(config_not_found(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| config_parse_failed(path.display().to_string(), e.to_string()))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| config_parse_failed(path.display().to_string(), e.to_string()))
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.target_dir.join(".instack").join("cache"))
    }

    pub fn attempt_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.attempt_timeout_secs)
    }

    /// Enabled repositories, in configuration order; the first one is the
    /// fetch source for every archive
    pub fn enabled_repositories(&self) -> impl Iterator<Item = &Repository> {
        self.repositories.iter().filter(|r| r.enabled)
    }

    pub fn add_repository(&mut self, repository: Repository) {
        self.repositories.push(repository);
    }

    pub fn remove_repository(&mut self, url: &str) {
        self.repositories.retain(|r| r.url != url);
    }

    pub fn set_repository_enabled(&mut self, url: &str, enabled: bool) {
        for repository in &mut self.repositories {
            if repository.url == url {
                repository.enabled = enabled;
            }
        }
    }

    /// Drop repositories added for this run only
    pub fn clear_temporary_repositories(&mut self) {
        self.repositories
            .retain(|r| r.category != RepositoryCategory::Temporary);
    }
}
