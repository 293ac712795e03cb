//! provider::types
//!
//! Provider-neutral domain objects returned by [`GitProvider`](super::GitProvider).
//!
//! Every object carries the [`Session`] of the response it came from.

use chrono::{DateTime, Utc};

use crate::permission::PermissionLevel;
use crate::resource::{
    DeployKeySpec, PullRequestSpec, RepositoryRef, RepositorySpec, TeamAccessSpec, Visibility,
};
use crate::transport::Session;

/// An organization (GitHub) or project (Bitbucket Server).
#[derive(Debug, Clone, PartialEq)]
pub struct Organization {
    /// Login or project key
    pub key: String,
    /// Display name
    pub name: String,
    pub description: Option<String>,
    /// Server-assigned id
    pub id: Option<u64>,
    pub session: Session,
}

/// A repository.
#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    pub organization: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub default_branch: Option<String>,
    pub visibility: Visibility,
    /// Clone URLs (HTTP first when both exist)
    pub clone_urls: Vec<String>,
    /// Server-assigned id
    pub id: Option<u64>,
    pub session: Session,
}

impl Repository {
    pub fn reference(&self) -> RepositoryRef {
        RepositoryRef::new(self.organization.clone(), self.slug.clone())
    }

    pub fn spec(&self) -> RepositorySpec {
        RepositorySpec {
            name: self.name.clone(),
            description: self.description.clone(),
            default_branch: self.default_branch.clone(),
            visibility: Some(self.visibility),
        }
    }
}

/// A branch and its head commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub name: String,
    pub latest_commit: Option<String>,
    pub is_default: bool,
    pub session: Session,
}

/// A commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub id: String,
    pub message: String,
    pub author_name: String,
    pub author_email: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub session: Session,
}

impl Commit {
    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }

    /// Abbreviated id.
    pub fn short_id(&self) -> &str {
        self.id.get(..12).unwrap_or(&self.id)
    }
}

/// A repository deploy key.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployKey {
    /// Server-assigned id
    pub id: u64,
    pub label: String,
    pub key: String,
    pub read_only: bool,
    pub session: Session,
}

impl DeployKey {
    pub fn spec(&self) -> DeployKeySpec {
        DeployKeySpec::new(self.label.clone(), self.key.clone(), self.read_only)
    }
}

/// A team's effective permission on a repository.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamAccess {
    pub team: String,
    /// Effective level across repository and organization grants
    pub permission: PermissionLevel,
    pub session: Session,
}

impl TeamAccess {
    pub fn spec(&self) -> TeamAccessSpec {
        TeamAccessSpec::new(self.team.clone(), self.permission)
    }
}

/// Pull request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullRequestState {
    Open,
    Merged,
    Declined,
}

impl PullRequestState {
    /// Parse a provider state string. Unknown states read as declined.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "OPEN" => PullRequestState::Open,
            "MERGED" => PullRequestState::Merged,
            _ => PullRequestState::Declined,
        }
    }
}

impl std::fmt::Display for PullRequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PullRequestState::Open => write!(f, "open"),
            PullRequestState::Merged => write!(f, "merged"),
            PullRequestState::Declined => write!(f, "declined"),
        }
    }
}

/// A pull request.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequest {
    /// Id or number
    pub id: u64,
    /// Optimistic-locking version, where the provider has one
    pub version: Option<u64>,
    pub title: String,
    pub description: Option<String>,
    pub source_branch: String,
    pub target_branch: String,
    pub state: PullRequestState,
    pub url: Option<String>,
    pub session: Session,
}

impl PullRequest {
    pub fn spec(&self) -> PullRequestSpec {
        PullRequestSpec {
            title: self.title.clone(),
            description: self.description.clone(),
            source_branch: self.source_branch.clone(),
            target_branch: self.target_branch.clone(),
        }
    }
}

/// Treat an empty string as absent.
pub(crate) fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}
