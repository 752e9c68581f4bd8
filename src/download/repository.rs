//! Remote repository descriptions
//!
//! A repository is a base URL plus optional credentials. Categories mirror
//! how a repository entered the configuration: shipped as a default, added
//! for one run only, or configured by the user.

use serde::{Deserialize, Serialize};

/// Credentials for a repository or proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authenticator {
    pub username: String,
    pub password: String,
}

impl Authenticator {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// How a repository entered the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryCategory {
    Default,
    Temporary,
    UserDefined,
}

/// A source of component archives reachable over the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_category")]
    pub category: RepositoryCategory,
    #[serde(default)]
    pub authenticator: Option<Authenticator>,
}

fn default_enabled() -> bool {
    true
}

fn default_category() -> RepositoryCategory {
    RepositoryCategory::UserDefined
}

impl Repository {
    pub fn new(url: impl Into<String>, category: RepositoryCategory) -> Self {
        Self {
            url: url.into(),
            enabled: true,
            category,
            authenticator: None,
        }
    }

    pub fn with_authenticator(mut self, authenticator: Authenticator) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Resolve an archive name against the repository base URL
    pub fn archive_url(&self, name: &str) -> String {
        // Absolute archive references bypass the repository base.
        if name.starts_with("http://") || name.starts_with("https://") {
            return name.to_string();
        }
        format!("{}/{}", self.url.trim_end_matches('/'), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_url_joins_relative_names() {
        let repo = Repository::new("https://repo.example/packages/", RepositoryCategory::Default);
        assert_eq!(
            repo.archive_url("core-1.0.zip"),
            "https://repo.example/packages/core-1.0.zip"
        );
    }

    #[test]
    fn test_archive_url_passes_absolute_through() {
        let repo = Repository::new("https://repo.example", RepositoryCategory::Default);
        assert_eq!(
            repo.archive_url("https://mirror.example/core.zip"),
            "https://mirror.example/core.zip"
        );
    }

    #[test]
    fn test_repository_deserialization_defaults() {
        let repo: Repository =
            serde_yaml::from_str("url: https://repo.example\n").unwrap();
        assert!(repo.enabled);
        assert_eq!(repo.category, RepositoryCategory::UserDefined);
        assert!(repo.authenticator.is_none());
    }
}
