//! cli::manifest
//!
//! Desired-state manifest read by `gitprovider apply`.
//!
//! # Format
//!
//! ```toml
//! [[repository]]
//! organization = "PRJ"
//! name = "billing"
//! description = "Billing service"
//! default_branch = "main"
//! visibility = "private"
//!
//! [[deploy_key]]
//! repository = "PRJ/billing"
//! label = "ci"
//! key = "ssh-ed25519 AAAA... ci@build"
//! read_only = true
//!
//! [[team_access]]
//! repository = "PRJ/billing"
//! team = "developers"
//! permission = "write"
//!
//! [[pull_request]]
//! repository = "PRJ/billing"
//! title = "Release 2.0"
//! source_branch = "release/2.0"
//! target_branch = "main"
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use super::args::parse_repository_ref;
use crate::permission::PermissionLevel;
use crate::resource::{
    DeployKeySpec, PullRequestSpec, RepositoryRef, RepositorySpec, TeamAccessSpec, Visibility,
};

/// Errors from reading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse manifest: {0}")]
    Parse(String),

    #[error("invalid manifest entry: {0}")]
    InvalidEntry(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryEntry {
    pub organization: String,
    pub name: String,
    pub description: Option<String>,
    pub default_branch: Option<String>,
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployKeyEntry {
    pub repository: String,
    pub label: String,
    pub key: String,
    #[serde(default = "default_read_only")]
    pub read_only: bool,
}

fn default_read_only() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TeamAccessEntry {
    pub repository: String,
    pub team: String,
    pub permission: PermissionLevel,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PullRequestEntry {
    pub repository: String,
    pub title: String,
    pub description: Option<String>,
    pub source_branch: String,
    pub target_branch: String,
}

/// Parsed manifest, as written.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    #[serde(rename = "repository")]
    pub repositories: Vec<RepositoryEntry>,
    #[serde(rename = "deploy_key")]
    pub deploy_keys: Vec<DeployKeyEntry>,
    pub team_access: Vec<TeamAccessEntry>,
    #[serde(rename = "pull_request")]
    pub pull_requests: Vec<PullRequestEntry>,
}

/// One resolved entry, ready to reconcile.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestEntry {
    Repository {
        organization: String,
        spec: RepositorySpec,
    },
    DeployKey {
        repository: RepositoryRef,
        spec: DeployKeySpec,
    },
    TeamAccess {
        repository: RepositoryRef,
        spec: TeamAccessSpec,
    },
    PullRequest {
        repository: RepositoryRef,
        spec: PullRequestSpec,
    },
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestEntry::Repository { organization, spec } => {
                write!(f, "repository {}/{}", organization, spec.name)
            }
            ManifestEntry::DeployKey { repository, spec } => {
                write!(f, "deploy key '{}' on {}", spec.label, repository)
            }
            ManifestEntry::TeamAccess { repository, spec } => {
                write!(f, "team '{}' on {}", spec.team, repository)
            }
            ManifestEntry::PullRequest { repository, spec } => write!(
                f,
                "pull request {} -> {} on {}",
                spec.source_branch, spec.target_branch, repository
            ),
        }
    }
}

impl Manifest {
    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let contents = fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ManifestError> {
        toml::from_str(contents).map_err(|e| ManifestError::Parse(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
            && self.deploy_keys.is_empty()
            && self.team_access.is_empty()
            && self.pull_requests.is_empty()
    }

    /// Entries in apply order: repositories first, so later entries can
    /// refer to repositories the same manifest creates.
    ///
    /// # Errors
    ///
    /// `InvalidEntry` for a malformed `ORG/SLUG` repository reference.
    pub fn entries(&self) -> Result<Vec<ManifestEntry>, ManifestError> {
        let mut entries = Vec::new();

        for repo in &self.repositories {
            let mut spec = RepositorySpec::new(&repo.name);
            spec.description = repo.description.clone();
            spec.default_branch = repo.default_branch.clone();
            spec.visibility = repo.visibility;
            entries.push(ManifestEntry::Repository {
                organization: repo.organization.clone(),
                spec,
            });
        }
        for key in &self.deploy_keys {
            entries.push(ManifestEntry::DeployKey {
                repository: repository_ref(&key.repository)?,
                spec: DeployKeySpec::new(&key.label, &key.key, key.read_only),
            });
        }
        for access in &self.team_access {
            entries.push(ManifestEntry::TeamAccess {
                repository: repository_ref(&access.repository)?,
                spec: TeamAccessSpec::new(&access.team, access.permission),
            });
        }
        for pr in &self.pull_requests {
            let mut spec = PullRequestSpec::new(&pr.title, &pr.source_branch, &pr.target_branch);
            spec.description = pr.description.clone();
            entries.push(ManifestEntry::PullRequest {
                repository: repository_ref(&pr.repository)?,
                spec,
            });
        }

        Ok(entries)
    }
}

fn repository_ref(s: &str) -> Result<RepositoryRef, ManifestError> {
    parse_repository_ref(s).map_err(ManifestError::InvalidEntry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FULL: &str = r#"
        [[repository]]
        organization = "PRJ"
        name = "billing"
        visibility = "private"

        [[deploy_key]]
        repository = "PRJ/billing"
        label = "ci"
        key = "ssh-ed25519 AAAA ci@build"

        [[team_access]]
        repository = "PRJ/billing"
        team = "developers"
        permission = "write"

        [[pull_request]]
        repository = "PRJ/billing"
        title = "Release"
        source_branch = "release"
        target_branch = "main"
    "#;

    #[test]
    fn parses_every_section_in_apply_order() {
        let manifest = Manifest::parse(FULL).unwrap();
        let entries = manifest.entries().unwrap();
        assert_eq!(entries.len(), 4);
        assert!(matches!(entries[0], ManifestEntry::Repository { .. }));
        assert!(matches!(entries[3], ManifestEntry::PullRequest { .. }));
        assert_eq!(entries[1].to_string(), "deploy key 'ci' on PRJ/billing");
    }

    #[test]
    fn deploy_keys_default_to_read_only() {
        let manifest = Manifest::parse(FULL).unwrap();
        assert!(manifest.deploy_keys[0].read_only);
    }

    #[test]
    fn unknown_permission_is_a_parse_error() {
        let err = Manifest::parse(
            r#"
            [[team_access]]
            repository = "PRJ/billing"
            team = "devs"
            permission = "owner"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::Parse(_)));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = Manifest::parse(
            r#"
            [[repository]]
            organization = "PRJ"
            name = "billing"
            archived = true
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("archived"));
    }

    #[test]
    fn malformed_repository_reference() {
        let manifest = Manifest::parse(
            r#"
            [[deploy_key]]
            repository = "billing"
            label = "ci"
            key = "ssh-ed25519 AAAA"
            "#,
        )
        .unwrap();
        assert!(matches!(
            manifest.entries(),
            Err(ManifestError::InvalidEntry(_))
        ));
    }

    #[test]
    fn empty_manifest() {
        assert!(Manifest::parse("").unwrap().is_empty());
    }

    #[test]
    fn load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = Manifest::load(&temp.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ManifestError::Read { .. }));
    }
}
