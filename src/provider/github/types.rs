//! provider::github::types
//!
//! GitHub REST v3 payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{FieldValidator, ProviderError};
use crate::permission::{PermissionLevel, PermissionMapper, PermissionScope, ScopedGrant};
use crate::provider::types::{
    non_empty, Branch, Commit, DeployKey, Organization, PullRequest, PullRequestState, Repository,
};
use crate::resource::Visibility;
use crate::transport::Session;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubOrganization {
    #[serde(default)]
    pub login: String,
    pub id: Option<u64>,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Base permission members get on every repository; only visible to
    /// owners
    pub default_repository_permission: Option<String>,
}

impl GitHubOrganization {
    pub fn into_organization(self, session: Session) -> Result<Organization, ProviderError> {
        FieldValidator::new()
            .require_non_empty("login", &self.login)
            .finish()?;
        Ok(Organization {
            name: non_empty(self.name).unwrap_or_else(|| self.login.clone()),
            key: self.login,
            description: non_empty(self.description),
            id: self.id,
            session,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubOwner {
    #[serde(default)]
    pub login: String,
}

/// Raw form of a repository.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubRepository {
    pub id: Option<u64>,
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub private: bool,
    pub visibility: Option<String>,
    pub default_branch: Option<String>,
    #[serde(default)]
    pub owner: GitHubOwner,
    pub clone_url: Option<String>,
    pub ssh_url: Option<String>,
    /// Present when fetched through a team's repository endpoint
    pub permissions: Option<BTreeMap<String, bool>>,
    #[serde(skip)]
    pub session: Session,
    /// Fields changed by `apply_spec`, sent as the PATCH body
    #[serde(skip)]
    pub patch: Map<String, Value>,
}

impl GitHubRepository {
    pub fn validate(&self) -> Result<(), ProviderError> {
        FieldValidator::new()
            .require_non_empty("name", &self.name)
            .require_non_empty("owner.login", &self.owner.login)
            .finish()
    }

    pub fn visibility(&self) -> Visibility {
        match self.visibility.as_deref() {
            Some("internal") => Visibility::Internal,
            Some("public") => Visibility::Public,
            Some("private") => Visibility::Private,
            _ if self.private => Visibility::Private,
            _ => Visibility::Public,
        }
    }

    /// Highest level granted by the `permissions` map.
    pub fn granted_level(
        &self,
        mapper: &PermissionMapper,
    ) -> Result<Option<PermissionLevel>, ProviderError> {
        let Some(permissions) = &self.permissions else {
            return Ok(None);
        };
        mapper.effective_level(
            permissions
                .iter()
                .filter(|(_, granted)| **granted)
                .map(|(name, _)| ScopedGrant::new(PermissionScope::Repository, name)),
        )
    }

    pub fn into_repository(self) -> Result<Repository, ProviderError> {
        self.validate()?;
        Ok(Repository {
            visibility: self.visibility(),
            organization: self.owner.login,
            slug: self.name.clone(),
            name: self.name,
            description: non_empty(self.description),
            default_branch: self.default_branch,
            clone_urls: self.clone_url.into_iter().chain(self.ssh_url).collect(),
            id: self.id,
            session: self.session,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubCommitRef {
    #[serde(default)]
    pub sha: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubBranch {
    #[serde(default)]
    pub name: String,
    pub commit: Option<GitHubCommitRef>,
}

impl GitHubBranch {
    pub fn into_branch(
        self,
        default_branch: Option<&str>,
        session: Session,
    ) -> Result<Branch, ProviderError> {
        FieldValidator::new()
            .require_non_empty("name", &self.name)
            .finish()?;
        Ok(Branch {
            is_default: default_branch == Some(self.name.as_str()),
            name: self.name,
            latest_commit: self.commit.map(|c| c.sha),
            session,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubSignature {
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubCommitDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author: GitHubSignature,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubCommit {
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub commit: GitHubCommitDetail,
}

impl GitHubCommit {
    pub fn into_commit(self, session: Session) -> Result<Commit, ProviderError> {
        FieldValidator::new()
            .require_non_empty("sha", &self.sha)
            .finish()?;
        let author = self.commit.author;
        Ok(Commit {
            id: self.sha,
            message: self.commit.message,
            author_name: author.name,
            author_email: author.email,
            timestamp: author.date,
            session,
        })
    }
}

/// Raw form of a deploy key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubDeployKey {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_read_only")]
    pub read_only: bool,
    #[serde(skip)]
    pub session: Session,
}

fn default_read_only() -> bool {
    true
}

impl GitHubDeployKey {
    pub fn validate(&self) -> Result<(), ProviderError> {
        FieldValidator::new()
            .require_non_empty("key", &self.key)
            .require_non_empty("title", &self.title)
            .finish()
    }

    pub fn to_deploy_key(&self) -> DeployKey {
        DeployKey {
            id: self.id,
            label: self.title.clone(),
            key: self.key.clone(),
            read_only: self.read_only,
            session: self.session.clone(),
        }
    }
}

/// A team as listed under a repository.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubTeam {
    #[serde(default)]
    pub slug: String,
    pub name: Option<String>,
    #[serde(default)]
    pub permission: String,
}

/// Raw form of a team's access: the team grant and the organization base
/// permission.
#[derive(Debug, Clone, PartialEq)]
pub struct GitHubTeamGrant {
    pub team: String,
    pub repository: Option<PermissionLevel>,
    pub organization: Option<PermissionLevel>,
    pub session: Session,
}

impl GitHubTeamGrant {
    pub fn effective(&self) -> Option<PermissionLevel> {
        self.repository.max(self.organization)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubPullRef {
    #[serde(default, rename = "ref")]
    pub ref_name: String,
    pub label: Option<String>,
}

/// Raw form of a pull request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubPullRequest {
    #[serde(default)]
    pub number: u64,
    #[serde(default)]
    pub title: String,
    pub body: Option<String>,
    #[serde(default)]
    pub state: String,
    pub merged_at: Option<String>,
    #[serde(default)]
    pub head: GitHubPullRef,
    #[serde(default)]
    pub base: GitHubPullRef,
    pub html_url: Option<String>,
    #[serde(skip)]
    pub session: Session,
    /// Fields changed by `apply_spec`, sent as the PATCH body
    #[serde(skip)]
    pub patch: Map<String, Value>,
}

impl GitHubPullRequest {
    pub fn validate(&self) -> Result<(), ProviderError> {
        FieldValidator::new()
            .require_non_empty("title", &self.title)
            .require_non_empty("head.ref", &self.head.ref_name)
            .require_non_empty("base.ref", &self.base.ref_name)
            .finish()
    }

    pub fn state(&self) -> PullRequestState {
        match self.state.as_str() {
            "open" => PullRequestState::Open,
            _ if self.merged_at.is_some() => PullRequestState::Merged,
            _ => PullRequestState::Declined,
        }
    }

    pub fn to_pull_request(&self) -> PullRequest {
        PullRequest {
            id: self.number,
            version: None,
            title: self.title.clone(),
            description: non_empty(self.body.clone()),
            source_branch: self.head.ref_name.clone(),
            target_branch: self.base.ref_name.clone(),
            state: self.state(),
            url: self.html_url.clone(),
            session: self.session.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn repository_visibility() {
        let mut repo = GitHubRepository {
            private: true,
            ..Default::default()
        };
        assert_eq!(repo.visibility(), Visibility::Private);
        repo.visibility = Some("internal".into());
        assert_eq!(repo.visibility(), Visibility::Internal);
        repo.visibility = None;
        repo.private = false;
        assert_eq!(repo.visibility(), Visibility::Public);
    }

    #[test]
    fn repository_converts_with_clone_urls() {
        let json = r#"{"id": 1, "name": "svc", "private": false, "default_branch": "main",
                       "owner": {"login": "acme"},
                       "clone_url": "https://github.com/acme/svc.git",
                       "ssh_url": "git@github.com:acme/svc.git"}"#;
        let repo = serde_json::from_str::<GitHubRepository>(json)
            .unwrap()
            .into_repository()
            .unwrap();
        assert_eq!(repo.reference().to_string(), "acme/svc");
        assert_eq!(repo.clone_urls.len(), 2);
        assert_eq!(repo.default_branch.as_deref(), Some("main"));
    }

    #[test]
    fn repository_without_owner_is_invalid() {
        let raw: GitHubRepository = serde_json::from_str(r#"{"name": "svc"}"#).unwrap();
        assert_eq!(raw.validate().unwrap_err().kind(), ErrorKind::InvalidServerData);
    }

    #[test]
    fn permissions_map_folds_to_highest() {
        let json = r#"{"name": "svc", "owner": {"login": "acme"},
                       "permissions": {"admin": false, "maintain": false, "push": true,
                                       "triage": true, "pull": true}}"#;
        let raw: GitHubRepository = serde_json::from_str(json).unwrap();
        let level = raw.granted_level(&PermissionMapper::github()).unwrap();
        assert_eq!(level, Some(PermissionLevel::Write));
    }

    #[test]
    fn unknown_permission_key_is_an_error() {
        let json = r#"{"name": "svc", "owner": {"login": "acme"}, "permissions": {"owner": true}}"#;
        let raw: GitHubRepository = serde_json::from_str(json).unwrap();
        let err = raw.granted_level(&PermissionMapper::github()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPermissionLevel);
    }

    #[test]
    fn pull_request_state() {
        let mut pr = GitHubPullRequest {
            state: "open".into(),
            ..Default::default()
        };
        assert_eq!(pr.state(), PullRequestState::Open);
        pr.state = "closed".into();
        assert_eq!(pr.state(), PullRequestState::Declined);
        pr.merged_at = Some("2024-01-01T00:00:00Z".into());
        assert_eq!(pr.state(), PullRequestState::Merged);
    }

    #[test]
    fn commit_converts() {
        let json = r#"{"sha": "abc123", "commit": {"message": "Fix\n\nbody",
                       "author": {"name": "Dev", "email": "dev@x", "date": "2024-03-01T10:00:00Z"}}}"#;
        let commit = serde_json::from_str::<GitHubCommit>(json)
            .unwrap()
            .into_commit(Session::default())
            .unwrap();
        assert_eq!(commit.summary(), "Fix");
        assert!(commit.timestamp.is_some());
    }

    #[test]
    fn branch_marks_default() {
        let branch = GitHubBranch {
            name: "main".into(),
            commit: Some(GitHubCommitRef { sha: "abc".into() }),
        };
        let branch = branch.into_branch(Some("main"), Session::default()).unwrap();
        assert!(branch.is_default);
        assert_eq!(branch.latest_commit.as_deref(), Some("abc"));
    }
}
