//! provider::stash::types
//!
//! Bitbucket Server REST payloads.
//!
//! Required fields deserialize to empty defaults and are then checked by
//! `validate`, so a response missing several of them yields one
//! `InvalidServerData` listing every gap instead of a decode error naming the
//! first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FieldValidator, ProviderError};
use crate::permission::{PermissionLevel, PermissionMapper, PermissionScope};
use crate::provider::types::{
    non_empty, Branch, Commit, DeployKey, Organization, PullRequest, PullRequestState, Repository,
};
use crate::resource::{branch_display_id, Visibility};
use crate::transport::Session;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StashProject {
    #[serde(default)]
    pub key: String,
    pub id: Option<u64>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub public: bool,
}

impl StashProject {
    pub fn validate(&self) -> Result<(), ProviderError> {
        FieldValidator::new().require_non_empty("key", &self.key).finish()
    }

    pub fn into_organization(self, session: Session) -> Result<Organization, ProviderError> {
        self.validate()?;
        Ok(Organization {
            name: self.name.unwrap_or_else(|| self.key.clone()),
            key: self.key,
            description: non_empty(self.description),
            id: self.id,
            session,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StashLink {
    #[serde(default)]
    pub href: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StashLinks {
    #[serde(default)]
    pub clone: Vec<StashLink>,
    #[serde(default, rename = "self")]
    pub self_links: Vec<StashLink>,
}

/// Raw form of a repository.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StashRepository {
    pub id: Option<u64>,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub public: bool,
    pub project: Option<StashProject>,
    /// Returned by newer servers; otherwise filled from `branches/default`
    pub default_branch: Option<String>,
    pub state: Option<String>,
    #[serde(default)]
    pub links: StashLinks,
    #[serde(skip)]
    pub session: Session,
}

impl StashRepository {
    pub fn validate(&self) -> Result<(), ProviderError> {
        FieldValidator::new()
            .require_non_empty("slug", &self.slug)
            .require_non_empty("name", &self.name)
            .require_some("project", self.project.as_ref())
            .require_non_empty(
                "project.key",
                self.project.as_ref().map(|p| p.key.as_str()).unwrap_or("-"),
            )
            .finish()
    }

    pub fn visibility(&self) -> Visibility {
        if self.public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }

    pub fn project_key(&self) -> &str {
        self.project.as_ref().map(|p| p.key.as_str()).unwrap_or_default()
    }

    pub fn into_repository(self) -> Result<Repository, ProviderError> {
        self.validate()?;
        let mut clone_urls: Vec<(bool, String)> = self
            .links
            .clone
            .iter()
            .map(|l| (l.name.as_deref() != Some("http"), l.href.clone()))
            .collect();
        clone_urls.sort_by_key(|(not_http, _)| *not_http);

        Ok(Repository {
            organization: self.project_key().to_string(),
            visibility: self.visibility(),
            default_branch: self
                .default_branch
                .as_deref()
                .map(|b| branch_display_id(b).to_string()),
            slug: self.slug,
            name: self.name,
            description: non_empty(self.description),
            clone_urls: clone_urls.into_iter().map(|(_, url)| url).collect(),
            id: self.id,
            session: self.session,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StashBranch {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub display_id: String,
    pub latest_commit: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl StashBranch {
    pub fn into_branch(self, session: Session) -> Result<Branch, ProviderError> {
        FieldValidator::new().require_non_empty("id", &self.id).finish()?;
        let name = if self.display_id.is_empty() {
            branch_display_id(&self.id).to_string()
        } else {
            self.display_id
        };
        Ok(Branch {
            name,
            latest_commit: self.latest_commit,
            is_default: self.is_default,
            session,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StashPerson {
    #[serde(default)]
    pub name: String,
    pub email_address: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StashCommit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author: StashPerson,
    /// Milliseconds since the epoch
    pub author_timestamp: Option<i64>,
}

impl StashCommit {
    pub fn into_commit(self, session: Session) -> Result<Commit, ProviderError> {
        FieldValidator::new().require_non_empty("id", &self.id).finish()?;
        let timestamp: Option<DateTime<Utc>> = self
            .author_timestamp
            .and_then(DateTime::from_timestamp_millis);
        Ok(Commit {
            id: self.id,
            message: self.message,
            author_name: self.author.display_name.unwrap_or(self.author.name),
            author_email: self.author.email_address,
            timestamp,
            session,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StashSshKey {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Access key as returned by the SSH keys plugin.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StashAccessKey {
    #[serde(default)]
    pub key: StashSshKey,
    #[serde(default)]
    pub permission: String,
}

/// Raw form of a deploy key, with its permission already mapped.
#[derive(Debug, Clone, PartialEq)]
pub struct StashDeployKey {
    pub id: u64,
    pub label: String,
    pub text: String,
    pub permission: PermissionLevel,
    pub session: Session,
}

impl StashAccessKey {
    pub fn into_deploy_key(
        self,
        mapper: &PermissionMapper,
        session: Session,
    ) -> Result<StashDeployKey, ProviderError> {
        FieldValidator::new()
            .require_some("key.id", self.key.id.as_ref())
            .require_non_empty("key.text", &self.key.text)
            .require_non_empty("permission", &self.permission)
            .finish()?;
        let permission = mapper.to_ordinal(PermissionScope::Repository, &self.permission)?;
        Ok(StashDeployKey {
            id: self.key.id.unwrap_or_default(),
            label: self.key.label.unwrap_or_default(),
            text: self.key.text,
            permission,
            session,
        })
    }
}

impl StashDeployKey {
    pub fn read_only(&self) -> bool {
        self.permission < PermissionLevel::Write
    }

    pub fn to_deploy_key(&self) -> DeployKey {
        DeployKey {
            id: self.id,
            label: self.label.clone(),
            key: self.text.clone(),
            read_only: self.read_only(),
            session: self.session.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StashGroup {
    #[serde(default)]
    pub name: String,
}

/// One group's grant at repository or project scope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StashGroupPermission {
    #[serde(default)]
    pub group: StashGroup,
    #[serde(default)]
    pub permission: String,
}

/// Raw form of a team's access: the grant at each scope.
#[derive(Debug, Clone, PartialEq)]
pub struct StashTeamGrant {
    pub team: String,
    pub repository: Option<PermissionLevel>,
    pub project: Option<PermissionLevel>,
    pub session: Session,
}

impl StashTeamGrant {
    /// Highest of the two grants.
    pub fn effective(&self) -> Option<PermissionLevel> {
        self.repository.max(self.project)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StashProjectRef {
    pub key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StashRepositoryRef {
    pub slug: String,
    pub project: StashProjectRef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StashRef {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing)]
    pub display_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<StashRepositoryRef>,
}

impl StashRef {
    pub fn branch(&self) -> &str {
        branch_display_id(&self.id)
    }
}

/// Raw form of a pull request. `version` must be echoed on update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StashPullRequest {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub from_ref: StashRef,
    #[serde(default)]
    pub to_ref: StashRef,
    #[serde(default)]
    pub links: StashLinks,
    #[serde(skip)]
    pub session: Session,
}

impl StashPullRequest {
    pub fn validate(&self) -> Result<(), ProviderError> {
        FieldValidator::new()
            .require_non_empty("title", &self.title)
            .require_non_empty("fromRef.id", &self.from_ref.id)
            .require_non_empty("toRef.id", &self.to_ref.id)
            .finish()
    }

    pub fn to_pull_request(&self) -> PullRequest {
        PullRequest {
            id: self.id,
            version: Some(self.version),
            title: self.title.clone(),
            description: non_empty(self.description.clone()),
            source_branch: self.from_ref.branch().to_string(),
            target_branch: self.to_ref.branch().to_string(),
            state: PullRequestState::parse(&self.state),
            url: self.links.self_links.first().map(|l| l.href.clone()),
            session: self.session.clone(),
        }
    }
}
